//! Rendering engine boundary: requests, replies and handle traits
//!
//! The viewer never talks to a PDF library directly. It issues requests
//! to a [`RenderEngine`] and receives the outcome later as an
//! [`EngineEvent`] on its own channel, tagged with the [`RequestId`] of
//! the request it answers.

use std::fmt;

use flume::Sender;

use crate::source::{LoadConfig, Source};
use crate::viewport::{PageGeometry, Viewport};

/// Unique identifier for engine requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why the engine is asking for a password
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PasswordReason {
    NeedPassword,
    IncorrectPassword,
}

impl PasswordReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PasswordReason::NeedPassword => "NEED_PASSWORD",
            PasswordReason::IncorrectPassword => "INCORRECT_PASSWORD",
        }
    }
}

/// Engine-supplied continuation for a password-protected load.
///
/// Calling [`PasswordResolver::resolve`] retries the load with the given
/// password. Dropping it leaves the load pending.
pub struct PasswordResolver {
    retry: Box<dyn FnOnce(String) + Send>,
}

impl PasswordResolver {
    pub fn new(retry: impl FnOnce(String) + Send + 'static) -> Self {
        Self {
            retry: Box::new(retry),
        }
    }

    pub fn resolve(self, password: impl Into<String>) {
        (self.retry)(password.into());
    }
}

impl fmt::Debug for PasswordResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordResolver").finish_non_exhaustive()
    }
}

/// Errors reported by engines
#[derive(Debug, thiserror::Error)]
pub enum EngineFault {
    #[cfg(feature = "mupdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("page {page} is outside 1..={page_count}")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("unsupported source: {detail}")]
    UnsupportedSource { detail: String },

    #[error("request was cancelled")]
    Cancelled,

    #[error("{detail}")]
    Generic { detail: String },
}

impl EngineFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// A loaded document as seen by the viewer
pub trait DocumentHandle {
    fn page_count(&self) -> u32;
}

/// One page of a loaded document
pub trait PageHandle {
    /// 1-based page number
    fn number(&self) -> u32;

    fn geometry(&self) -> PageGeometry;
}

/// Result delivered for a request
pub enum Outcome<E: RenderEngine + ?Sized> {
    Document(Result<E::Document, EngineFault>),
    PasswordRequired {
        reason: PasswordReason,
        resolver: PasswordResolver,
    },
    Page(Result<E::Page, EngineFault>),
    Surface(Result<E::Surface, EngineFault>),
}

impl<E: RenderEngine + ?Sized> Outcome<E> {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Document(Ok(_)) => "document",
            Outcome::Document(Err(_)) => "document error",
            Outcome::PasswordRequired { .. } => "password required",
            Outcome::Page(Ok(_)) => "page",
            Outcome::Page(Err(_)) => "page error",
            Outcome::Surface(Ok(_)) => "surface",
            Outcome::Surface(Err(_)) => "surface error",
        }
    }
}

/// Completion posted back to the viewer
pub struct EngineEvent<E: RenderEngine + ?Sized> {
    pub id: RequestId,
    pub outcome: Outcome<E>,
}

impl<E: RenderEngine + ?Sized> fmt::Debug for EngineEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEvent")
            .field("id", &self.id)
            .field("outcome", &self.outcome.label())
            .finish()
    }
}

/// Return path for one request.
///
/// Cloneable so an engine can emit password prompts and later the final
/// result for the same load.
pub struct Reply<E: RenderEngine + ?Sized> {
    id: RequestId,
    events: Sender<EngineEvent<E>>,
}

impl<E: RenderEngine + ?Sized> Clone for Reply<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            events: self.events.clone(),
        }
    }
}

impl<E: RenderEngine + ?Sized> Reply<E> {
    pub(crate) fn new(id: RequestId, events: Sender<EngineEvent<E>>) -> Self {
        Self { id, events }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    fn send(&self, outcome: Outcome<E>) {
        // The viewer may already be gone; nothing left to notify then.
        let _ = self.events.send(EngineEvent {
            id: self.id,
            outcome,
        });
    }

    pub fn document(&self, result: Result<E::Document, EngineFault>) {
        self.send(Outcome::Document(result));
    }

    pub fn password(&self, reason: PasswordReason, resolver: PasswordResolver) {
        self.send(Outcome::PasswordRequired { reason, resolver });
    }

    pub fn page(&self, result: Result<E::Page, EngineFault>) {
        self.send(Outcome::Page(result));
    }

    pub fn surface(&self, result: Result<E::Surface, EngineFault>) {
        self.send(Outcome::Surface(result));
    }
}

/// The PDF parsing/rendering service the viewer drives.
///
/// Every request is answered exactly once through its [`Reply`] (a
/// document load may additionally emit any number of password prompts
/// first), either before the call returns or later from any thread.
pub trait RenderEngine {
    type Document: DocumentHandle + Clone;
    type Page: PageHandle + Clone;
    type Surface: Clone;

    fn load_document(&mut self, source: &Source, config: &LoadConfig, reply: Reply<Self>);

    /// Load a page by its 1-based number.
    fn load_page(&mut self, document: &Self::Document, page: u32, reply: Reply<Self>);

    fn render(&mut self, page: &Self::Page, viewport: &Viewport, reply: Reply<Self>);

    /// Best-effort request to abandon an in-flight request.
    fn cancel(&mut self, _id: RequestId) {}

    /// Release a loaded document the viewer will not use again.
    fn close_document(&mut self, _document: Self::Document) {}
}
