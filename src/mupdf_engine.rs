//! MuPDF-backed engine - the library runs on a dedicated worker thread
//!
//! MuPDF documents are not `Send`, so every document stays on the worker
//! and the viewer only ever holds plain-data handles to it.

use std::collections::HashMap;
use std::thread;

use flume::{Receiver, Sender};
use log::{debug, info, warn};
use mupdf::{Document, Matrix};

use crate::engine::{
    DocumentHandle, EngineFault, PageHandle, PasswordReason, PasswordResolver, RenderEngine,
    Reply, RequestId,
};
use crate::sink::SvgSurface;
use crate::source::{LoadConfig, Source, SourceData};
use crate::viewport::{PageGeometry, Rotation, Size, Viewport};
use crate::worker;

const DEFAULT_CONTENT_TYPE: &str = "application/pdf";
const FILE_SCHEME: &str = "file://";

/// Loaded document, identified by the request that opened it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MupdfDocument {
    slot: RequestId,
    page_count: u32,
}

impl DocumentHandle for MupdfDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MupdfPage {
    slot: RequestId,
    number: u32,
    /// Page bounds `(x0, y0, x1, y1)` with `/Rotate` already applied
    bounds: (f32, f32, f32, f32),
}

impl PageHandle for MupdfPage {
    fn number(&self) -> u32 {
        self.number
    }

    fn geometry(&self) -> PageGeometry {
        let (x0, y0, x1, y1) = self.bounds;
        PageGeometry {
            size: Size::new(f64::from(x1 - x0), f64::from(y1 - y0)),
            // MuPDF bounds are already rotated by the page's /Rotate
            rotation: Rotation::ZERO,
        }
    }
}

enum WorkerRequest {
    Open {
        id: RequestId,
        source: Source,
        config: LoadConfig,
        reply: Reply<MupdfEngine>,
    },
    Password {
        id: RequestId,
        password: String,
    },
    LoadPage {
        document: MupdfDocument,
        page: u32,
        reply: Reply<MupdfEngine>,
    },
    Render {
        page: MupdfPage,
        viewport: Viewport,
        reply: Reply<MupdfEngine>,
    },
    Cancel(RequestId),
    Close(RequestId),
    Shutdown,
}

/// [`RenderEngine`] that renders pages to SVG with MuPDF
pub struct MupdfEngine {
    requests: Sender<WorkerRequest>,
}

impl MupdfEngine {
    /// Spawn the worker thread using the process-wide worker options
    pub fn new() -> Result<Self, EngineFault> {
        let options = worker::options();
        let (request_tx, request_rx) = flume::unbounded();

        let mut builder = thread::Builder::new().name(options.thread_name.clone());
        if let Some(stack_size) = options.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let loopback = request_tx.clone();
        builder
            .spawn(move || render_worker(request_rx, loopback))
            .map_err(|e| EngineFault::generic(format!("failed to start render worker: {e}")))?;
        info!("Started render worker {:?}", options.thread_name);

        Ok(Self {
            requests: request_tx,
        })
    }

    fn submit(&self, request: WorkerRequest) {
        if self.requests.send(request).is_err() {
            warn!("Render worker has stopped; request dropped");
        }
    }
}

impl RenderEngine for MupdfEngine {
    type Document = MupdfDocument;
    type Page = MupdfPage;
    type Surface = SvgSurface;

    fn load_document(&mut self, source: &Source, config: &LoadConfig, reply: Reply<Self>) {
        self.submit(WorkerRequest::Open {
            id: reply.id(),
            source: source.clone(),
            config: config.clone(),
            reply,
        });
    }

    fn load_page(&mut self, document: &MupdfDocument, page: u32, reply: Reply<Self>) {
        self.submit(WorkerRequest::LoadPage {
            document: *document,
            page,
            reply,
        });
    }

    fn render(&mut self, page: &MupdfPage, viewport: &Viewport, reply: Reply<Self>) {
        self.submit(WorkerRequest::Render {
            page: *page,
            viewport: *viewport,
            reply,
        });
    }

    fn cancel(&mut self, id: RequestId) {
        self.submit(WorkerRequest::Cancel(id));
    }

    fn close_document(&mut self, document: MupdfDocument) {
        self.submit(WorkerRequest::Close(document.slot));
    }
}

impl Drop for MupdfEngine {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
    }
}

/// Document still waiting for the right password
struct Locked {
    document: Document,
    reply: Reply<MupdfEngine>,
}

#[derive(Default)]
struct WorkerState {
    documents: HashMap<RequestId, Document>,
    locked: HashMap<RequestId, Locked>,
}

#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
fn render_worker(requests: Receiver<WorkerRequest>, loopback: Sender<WorkerRequest>) {
    let mut state = WorkerState::default();

    for request in requests {
        match request {
            WorkerRequest::Open {
                id,
                source,
                config,
                reply,
            } => match open_document(&source, &config) {
                Ok(document) => unlock(&mut state, &loopback, id, document, config.password, reply),
                Err(e) => reply.document(Err(e)),
            },

            WorkerRequest::Password { id, password } => {
                let Some(Locked { document, reply }) = state.locked.remove(&id) else {
                    debug!("Password for unknown or cancelled load {id}");
                    continue;
                };
                unlock(&mut state, &loopback, id, document, Some(password), reply);
            }

            WorkerRequest::LoadPage {
                document,
                page,
                reply,
            } => reply.page(load_page(&state, document, page)),

            WorkerRequest::Render {
                page,
                viewport,
                reply,
            } => reply.surface(render_svg(&state, &page, &viewport)),

            WorkerRequest::Cancel(id) => {
                if let Some(Locked { reply, .. }) = state.locked.remove(&id) {
                    debug!("Abandoned password-protected load {id}");
                    reply.document(Err(EngineFault::Cancelled));
                }
            }

            WorkerRequest::Close(slot) => close_document(&mut state, slot),

            WorkerRequest::Shutdown => break,
        }
    }
    debug!("Render worker exiting");
}

fn open_document(source: &Source, config: &LoadConfig) -> Result<Document, EngineFault> {
    match &source.data {
        SourceData::Url(url) => {
            let path = match url.strip_prefix(FILE_SCHEME) {
                Some(path) => path,
                None if url.contains("://") => {
                    return Err(EngineFault::UnsupportedSource {
                        detail: format!("cannot fetch {url}"),
                    });
                }
                None => url.as_str(),
            };
            Ok(Document::open(path)?)
        }
        SourceData::Bytes(bytes) => {
            let magic = config.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
            Ok(Document::from_bytes(&bytes[..], magic)?)
        }
    }
}

/// Authenticate if needed, then publish the document or ask again
fn unlock(
    state: &mut WorkerState,
    loopback: &Sender<WorkerRequest>,
    id: RequestId,
    mut document: Document,
    password: Option<String>,
    reply: Reply<MupdfEngine>,
) {
    let needs_password = match document.needs_password() {
        Ok(needs) => needs,
        Err(e) => return reply.document(Err(e.into())),
    };

    if needs_password {
        let authenticated = match password.as_deref() {
            Some(password) => match document.authenticate(password) {
                Ok(ok) => ok,
                Err(e) => return reply.document(Err(e.into())),
            },
            None => false,
        };

        if !authenticated {
            let reason = if password.is_some() {
                PasswordReason::IncorrectPassword
            } else {
                PasswordReason::NeedPassword
            };
            let loopback = loopback.clone();
            let resolver = PasswordResolver::new(move |password| {
                let _ = loopback.send(WorkerRequest::Password { id, password });
            });
            reply.password(reason, resolver);
            state.locked.insert(id, Locked { document, reply });
            return;
        }
    }

    let page_count = match document.page_count() {
        Ok(count) => u32::try_from(count).unwrap_or(0),
        Err(e) => return reply.document(Err(e.into())),
    };

    // Stays open until the viewer closes it
    state.documents.insert(id, document);
    debug!("Opened document {id} with {page_count} pages");
    reply.document(Ok(MupdfDocument {
        slot: id,
        page_count,
    }));
}

fn close_document(state: &mut WorkerState, slot: RequestId) {
    if state.documents.remove(&slot).is_some() {
        debug!("Closed document {slot}");
    }
}

fn document<'a>(state: &'a WorkerState, slot: RequestId) -> Result<&'a Document, EngineFault> {
    state
        .documents
        .get(&slot)
        .ok_or_else(|| EngineFault::generic(format!("document {slot} is closed")))
}

fn load_page(state: &WorkerState, handle: MupdfDocument, page: u32) -> Result<MupdfPage, EngineFault> {
    if page == 0 || page > handle.page_count {
        return Err(EngineFault::PageOutOfRange {
            page,
            page_count: handle.page_count,
        });
    }

    let doc = document(state, handle.slot)?;
    let index = i32::try_from(page - 1).map_err(|_| EngineFault::generic("page index overflow"))?;
    let bounds = doc.load_page(index)?.bounds()?;

    Ok(MupdfPage {
        slot: handle.slot,
        number: page,
        bounds: (bounds.x0, bounds.y0, bounds.x1, bounds.y1),
    })
}

fn render_svg(
    state: &WorkerState,
    page: &MupdfPage,
    viewport: &Viewport,
) -> Result<SvgSurface, EngineFault> {
    let doc = document(state, page.slot)?;
    let index =
        i32::try_from(page.number - 1).map_err(|_| EngineFault::generic("page index overflow"))?;
    let loaded = doc.load_page(index)?;

    let ctm = page_transform(page.bounds, viewport.rotation, viewport.scale as f32);
    let markup = loaded.to_svg(&ctm)?;
    Ok(SvgSurface::new(markup))
}

/// Scale and rotate clockwise about the page origin, then translate the
/// rotated page back into positive coordinates.
fn page_transform(bounds: (f32, f32, f32, f32), rotation: Rotation, scale: f32) -> Matrix {
    let (x0, y0, x1, y1) = bounds;
    let s = scale;

    match rotation.quarter_turns() {
        1 => Matrix::new(0.0, s, -s, 0.0, s * y1, -s * x0),
        2 => Matrix::new(-s, 0.0, 0.0, -s, s * x1, s * y1),
        3 => Matrix::new(0.0, -s, s, 0.0, -s * y0, s * x1),
        _ => Matrix::new(s, 0.0, 0.0, s, -s * x0, -s * y0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
        (m.a * x + m.c * y + m.e, m.b * x + m.d * y + m.f)
    }

    #[test]
    fn quarter_turns_keep_page_in_positive_quadrant() {
        let bounds = (0.0, 0.0, 600.0, 800.0);

        let upright = page_transform(bounds, Rotation::ZERO, 2.0);
        assert_eq!(apply(&upright, 600.0, 800.0), (1200.0, 1600.0));

        // Top-left corner moves to the top-right under a clockwise turn
        let cw = page_transform(bounds, Rotation::new(90), 1.0);
        assert_eq!(apply(&cw, 0.0, 0.0), (800.0, 0.0));
        assert_eq!(apply(&cw, 600.0, 800.0), (0.0, 600.0));

        let flipped = page_transform(bounds, Rotation::new(180), 1.0);
        assert_eq!(apply(&flipped, 0.0, 0.0), (600.0, 800.0));

        let ccw = page_transform(bounds, Rotation::new(270), 1.0);
        assert_eq!(apply(&ccw, 0.0, 0.0), (0.0, 600.0));
        assert_eq!(apply(&ccw, 600.0, 800.0), (800.0, 0.0));
    }

    #[test]
    fn closed_documents_report_a_fault() {
        let mut state = WorkerState::default();
        close_document(&mut state, RequestId::new(3));
        assert!(state.documents.is_empty());

        let missing = document(&state, RequestId::new(3)).err().map(|e| e.to_string());
        assert_eq!(missing.as_deref(), Some("document #3 is closed"));
    }

    #[test]
    fn page_geometry_reports_rotated_bounds_upright() {
        let page = MupdfPage {
            slot: RequestId::new(1),
            number: 1,
            bounds: (0.0, 0.0, 792.0, 612.0),
        };
        let geometry = page.geometry();
        assert_eq!(geometry.size, Size::new(792.0, 612.0));
        assert_eq!(geometry.rotation, Rotation::ZERO);
    }
}
