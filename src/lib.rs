//! Single-page PDF viewer core
//!
//! Loads a document through a pluggable [`RenderEngine`], shows one page
//! at a time on a [`SurfaceSink`], and handles navigation, rotation and
//! zoom with a cache of resolved pages and rendered surfaces.

pub mod cache;
pub mod callbacks;
pub mod document;
pub mod engine;
pub mod error;
#[cfg(feature = "mupdf")]
pub mod mupdf_engine;
pub mod navigation;
pub mod pipeline;
pub mod settings;
pub mod sink;
pub mod source;
pub mod viewer;
pub mod viewport;
pub mod worker;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::{CacheStats, SurfaceKey};
pub use callbacks::Callbacks;
pub use document::DocumentState;
pub use engine::{
    DocumentHandle, EngineFault, PageHandle, PasswordReason, PasswordResolver, RenderEngine,
    Reply, RequestId,
};
pub use error::ViewerError;
#[cfg(feature = "mupdf")]
pub use mupdf_engine::MupdfEngine;
pub use navigation::NavigationState;
pub use settings::{Settings, ViewerOptions};
pub use sink::{SurfaceSink, SvgFileSink, SvgSurface};
pub use source::{LoadConfig, Source};
pub use viewer::Viewer;
pub use viewport::{Rotation, Size, Viewport};
