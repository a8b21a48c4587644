//! Failures reported to the viewer's observers

use crate::engine::EngineFault;
use crate::viewport::Rotation;

/// A failed step of the document or page pipeline.
///
/// These never surface through the viewer's mutators; they are handed to
/// the matching failure callback and otherwise dropped.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("failed to load document: {source}")]
    DocumentLoad { source: EngineFault },

    #[error("failed to load page {page}: {source}")]
    PageLoad { page: u32, source: EngineFault },

    #[error("failed to render page {page} at {rotation}: {source}")]
    Render {
        page: u32,
        rotation: Rotation,
        source: EngineFault,
    },
}

impl ViewerError {
    /// Underlying engine error
    #[must_use]
    pub fn fault(&self) -> &EngineFault {
        match self {
            ViewerError::DocumentLoad { source }
            | ViewerError::PageLoad { source, .. }
            | ViewerError::Render { source, .. } => source,
        }
    }
}
