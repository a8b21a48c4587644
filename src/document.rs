//! Document loading lifecycle
//!
//! Tracks which source is current, which load request is in flight and
//! which document is active. The controller is a pure state machine;
//! the viewer performs the engine calls, cache resets and callbacks it
//! asks for.

use log::{debug, info};

use crate::engine::RequestId;
use crate::source::Source;

/// Where the document lifecycle stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Outcome of offering a new source to the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStart {
    /// Empty or unchanged source
    Ignored,
    /// A load should be issued; `superseded` is the abandoned request
    Started { superseded: Option<RequestId> },
}

/// What a load completion did to the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadCompletion {
    /// The completion belongs to an abandoned request
    Stale,
    Loaded,
    Failed,
}

/// Document lifecycle state machine
pub struct DocumentController<D> {
    state: DocumentState,
    source: Option<Source>,
    in_flight: Option<RequestId>,
    document: Option<D>,
    epoch: u64,
}

impl<D> Default for DocumentController<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> DocumentController<D> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DocumentState::Unloaded,
            source: None,
            in_flight: None,
            document: None,
            epoch: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> DocumentState {
        self.state
    }

    #[must_use]
    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn document(&self) -> Option<&D> {
        self.document.as_ref()
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// Incremented each time a new document becomes active
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Offer a new source. Empty sources and the current source are
    /// ignored; anything else moves to `Loading` under request `id`.
    pub fn begin(&mut self, source: Source, id: RequestId) -> LoadStart {
        if source.is_empty() {
            debug!("Ignoring empty document source");
            return LoadStart::Ignored;
        }

        if self.source.as_ref() == Some(&source) {
            debug!("Document source unchanged: {source}");
            return LoadStart::Ignored;
        }

        info!("Loading document {source} ({id})");
        let superseded = self.in_flight.replace(id);
        self.source = Some(source);
        self.state = DocumentState::Loading;

        LoadStart::Started { superseded }
    }

    /// True if `id` is the load currently awaited
    #[must_use]
    pub fn is_current(&self, id: RequestId) -> bool {
        self.in_flight == Some(id)
    }

    /// Apply a successful load. Also returns the document that is no
    /// longer needed: the stale one itself, or the one it replaced.
    pub fn complete(&mut self, id: RequestId, document: D) -> (LoadCompletion, Option<D>) {
        if !self.is_current(id) {
            debug!("Dropping stale document load {id}");
            return (LoadCompletion::Stale, Some(document));
        }

        self.in_flight = None;
        let replaced = self.document.replace(document);
        self.state = DocumentState::Loaded;
        self.epoch += 1;
        info!("Document loaded ({id}), epoch {}", self.epoch);

        (LoadCompletion::Loaded, replaced)
    }

    /// Apply a failed load. Any previously active document stays active.
    pub fn fail(&mut self, id: RequestId) -> LoadCompletion {
        if !self.is_current(id) {
            debug!("Dropping stale document failure {id}");
            return LoadCompletion::Stale;
        }

        self.in_flight = None;
        self.state = DocumentState::Failed;
        LoadCompletion::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_source_starts_loading() {
        let mut docs: DocumentController<u32> = DocumentController::new();
        assert_eq!(docs.state(), DocumentState::Unloaded);

        let start = docs.begin(Source::url("a.pdf"), RequestId::new(1));
        assert_eq!(start, LoadStart::Started { superseded: None });
        assert_eq!(docs.state(), DocumentState::Loading);
        assert!(docs.is_current(RequestId::new(1)));
    }

    #[test]
    fn unchanged_or_empty_source_is_ignored() {
        let mut docs: DocumentController<u32> = DocumentController::new();
        let _ = docs.begin(Source::url("a.pdf"), RequestId::new(1));

        assert_eq!(docs.begin(Source::url("a.pdf"), RequestId::new(2)), LoadStart::Ignored);
        assert_eq!(docs.begin(Source::url(""), RequestId::new(3)), LoadStart::Ignored);
        assert!(docs.is_current(RequestId::new(1)));
    }

    #[test]
    fn completion_loads_document_and_bumps_epoch() {
        let mut docs = DocumentController::new();
        let _ = docs.begin(Source::url("a.pdf"), RequestId::new(1));

        assert_eq!(docs.complete(RequestId::new(1), 7_u32), (LoadCompletion::Loaded, None));
        assert_eq!(docs.state(), DocumentState::Loaded);
        assert_eq!(docs.document(), Some(&7));
        assert_eq!(docs.epoch(), 1);
        assert_eq!(docs.in_flight(), None);
    }

    #[test]
    fn superseded_load_cannot_overwrite_newer_one() {
        let mut docs = DocumentController::new();
        let _ = docs.begin(Source::url("a.pdf"), RequestId::new(1));
        let start = docs.begin(Source::url("b.pdf"), RequestId::new(2));
        assert_eq!(
            start,
            LoadStart::Started {
                superseded: Some(RequestId::new(1))
            }
        );

        assert_eq!(docs.complete(RequestId::new(1), 1_u32), (LoadCompletion::Stale, Some(1)));
        assert_eq!(docs.document(), None);
        assert_eq!(docs.state(), DocumentState::Loading);

        assert_eq!(docs.complete(RequestId::new(2), 2_u32), (LoadCompletion::Loaded, None));
        assert_eq!(docs.document(), Some(&2));
    }

    #[test]
    fn completion_hands_back_the_replaced_document() {
        let mut docs = DocumentController::new();
        let _ = docs.begin(Source::url("a.pdf"), RequestId::new(1));
        let _ = docs.complete(RequestId::new(1), 1_u32);

        let _ = docs.begin(Source::url("b.pdf"), RequestId::new(2));
        assert_eq!(docs.complete(RequestId::new(2), 2_u32), (LoadCompletion::Loaded, Some(1)));
        assert_eq!(docs.document(), Some(&2));
    }

    #[test]
    fn failure_keeps_previous_document() {
        let mut docs = DocumentController::new();
        let _ = docs.begin(Source::url("a.pdf"), RequestId::new(1));
        let _ = docs.complete(RequestId::new(1), 1_u32);

        let _ = docs.begin(Source::url("broken.pdf"), RequestId::new(2));
        assert_eq!(docs.fail(RequestId::new(2)), LoadCompletion::Failed);
        assert_eq!(docs.state(), DocumentState::Failed);
        assert_eq!(docs.document(), Some(&1));
        assert_eq!(docs.epoch(), 1);
    }

    #[test]
    fn reloading_after_failure_is_allowed() {
        let mut docs: DocumentController<u32> = DocumentController::new();
        let _ = docs.begin(Source::url("a.pdf"), RequestId::new(1));
        let _ = docs.fail(RequestId::new(1));

        let start = docs.begin(Source::url("b.pdf"), RequestId::new(2));
        assert!(matches!(start, LoadStart::Started { .. }));
    }
}
