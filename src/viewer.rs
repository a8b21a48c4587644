//! Viewer - drives document loading, the page pipeline and the caches
//!
//! The viewer is the only place where state changes turn into engine
//! requests. Mutators validate and update [`NavigationState`], then
//! execute the resulting effects; engine completions arrive on a
//! channel and are applied by [`Viewer::poll_events`] on the caller's
//! thread.

use std::time::Duration;

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use crate::cache::{CacheStats, RenderCache, SurfaceKey};
use crate::callbacks::Callbacks;
use crate::document::{DocumentController, DocumentState, LoadCompletion, LoadStart};
use crate::engine::{
    DocumentHandle, EngineEvent, EngineFault, Outcome, PageHandle, RenderEngine, Reply, RequestId,
};
use crate::error::ViewerError;
use crate::navigation::{Command, Effect, NavigationState};
use crate::pipeline::{PageRenderController, Settled, Step};
use crate::settings::ViewerOptions;
use crate::sink::SurfaceSink;
use crate::source::Source;
use crate::viewport::{self, Rotation, Viewport};

/// Single-page PDF viewer bound to an engine and a display sink
pub struct Viewer<E: RenderEngine, K: SurfaceSink<E::Surface>> {
    engine: E,
    sink: K,
    callbacks: Callbacks<E>,
    options: ViewerOptions,
    nav: NavigationState,
    documents: DocumentController<E::Document>,
    pipeline: PageRenderController<E::Page>,
    cache: RenderCache<E::Page, E::Surface>,
    next_request_id: u64,
    events_tx: Sender<EngineEvent<E>>,
    events_rx: Receiver<EngineEvent<E>>,
}

impl<E: RenderEngine, K: SurfaceSink<E::Surface>> Viewer<E, K> {
    /// Create a viewer with default options and no callbacks
    pub fn new(engine: E, sink: K) -> Self {
        let (events_tx, events_rx) = flume::unbounded();

        Self {
            engine,
            sink,
            callbacks: Callbacks::new(),
            options: ViewerOptions::default(),
            nav: NavigationState::default(),
            documents: DocumentController::new(),
            pipeline: PageRenderController::new(),
            cache: RenderCache::new(),
            next_request_id: 1,
            events_tx,
            events_rx,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ViewerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Callbacks<E>) -> Self {
        self.callbacks = callbacks;
        self
    }

    #[must_use]
    pub fn document(&self) -> Option<&E::Document> {
        self.documents.document()
    }

    #[must_use]
    pub fn document_state(&self) -> DocumentState {
        self.documents.state()
    }

    /// Handle of the page the pipeline last resolved
    #[must_use]
    pub fn current_page_handle(&self) -> Option<&E::Page> {
        self.pipeline.page()
    }

    /// Viewport of the current page under the current rotation, scale
    /// and device pixel ratio; empty while no page is resolved
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        viewport::compute(
            self.pipeline.page().map(PageHandle::geometry),
            self.nav.rotation,
            self.nav.scale,
            self.options.device_pixel_ratio,
        )
    }

    /// Scale 1.0, intrinsic rotation viewport of the current page
    #[must_use]
    pub fn default_viewport(&self) -> Viewport {
        viewport::compute_default(self.pipeline.page().map(PageHandle::geometry))
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.nav.page
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.nav.rotation
    }

    #[must_use]
    pub fn scale(&self) -> f64 {
        self.nav.scale
    }

    #[must_use]
    pub fn navigation(&self) -> NavigationState {
        self.nav
    }

    #[must_use]
    pub fn device_pixel_ratio(&self) -> f64 {
        self.options.device_pixel_ratio
    }

    /// Key of the surface currently shown by the sink
    #[must_use]
    pub fn attached(&self) -> Option<SurfaceKey> {
        self.pipeline.attached()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    #[must_use]
    pub fn cache(&self) -> &RenderCache<E::Page, E::Surface> {
        &self.cache
    }

    /// True when no document load or page step is waiting on the engine
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.documents.in_flight().is_none() && !self.pipeline.is_busy()
    }

    #[must_use]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Point the viewer at a document. Empty and unchanged sources are
    /// ignored; anything else abandons the in-flight load and starts a
    /// new one.
    pub fn set_source(&mut self, source: Option<Source>) {
        let Some(source) = source else {
            debug!("No document source given");
            return;
        };

        let id = self.next_id();
        let LoadStart::Started { superseded } = self.documents.begin(source, id) else {
            return;
        };

        if let Some(old) = superseded {
            debug!("Cancelling superseded document load {old}");
            self.engine.cancel(old);
        }
        self.cache.clear();

        let Some(source) = self.documents.source() else {
            return;
        };
        let config = self.options.load.merged(source.config.as_ref());
        self.engine
            .load_document(source, &config, Reply::new(id, self.events_tx.clone()));
    }

    pub fn rotate_clockwise(&mut self) -> bool {
        self.apply_command(Command::RotateClockwise)
    }

    pub fn rotate_counterclockwise(&mut self) -> bool {
        self.apply_command(Command::RotateCounterclockwise)
    }

    /// Store `degrees` normalized to `[0, 360)`
    pub fn set_rotation(&mut self, degrees: i32) -> bool {
        self.apply_command(Command::SetRotation(degrees))
    }

    pub fn zoom_in(&mut self) -> bool {
        self.apply_command(Command::ZoomIn)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.apply_command(Command::ZoomOut)
    }

    pub fn set_scale(&mut self, scale: f64) -> bool {
        self.apply_command(Command::SetScale(scale))
    }

    /// Scale the page so its width fills the container width
    pub fn fit_to_width(&mut self) -> bool {
        let Some((baseline, container)) = self.fit_inputs() else {
            return false;
        };

        let dimension = if swaps_fit_axis(self.nav.rotation) {
            baseline.height
        } else {
            baseline.width
        };
        self.fit(container.width, dimension)
    }

    /// Scale the page so its height fits the container height
    pub fn fit_to_container(&mut self) -> bool {
        let Some((baseline, container)) = self.fit_inputs() else {
            return false;
        };

        let dimension = if swaps_fit_axis(self.nav.rotation) {
            baseline.width
        } else {
            baseline.height
        };
        self.fit(container.height, dimension)
    }

    pub fn next_page(&mut self) -> bool {
        self.apply_command(Command::NextPage)
    }

    pub fn previous_page(&mut self) -> bool {
        self.apply_command(Command::PreviousPage)
    }

    /// Show 1-based page `page`; ignored without a document, for 0, and
    /// past the last page
    pub fn goto_page(&mut self, page: u32) -> bool {
        self.apply_command(Command::GoToPage(page))
    }

    /// Detach the displayed page and show nothing
    pub fn clear_page(&mut self) -> bool {
        self.apply_command(Command::ClearPage)
    }

    /// Change the device pixel ratio; only resizes the attached surface
    pub fn set_device_pixel_ratio(&mut self, ratio: f64) -> bool {
        if !ratio.is_finite() || ratio <= 0.0 {
            return false;
        }
        if (self.options.device_pixel_ratio - ratio).abs() <= f64::EPSILON {
            return false;
        }

        self.options.device_pixel_ratio = ratio;
        self.resize_attached();
        true
    }

    fn fit_inputs(&self) -> Option<(Viewport, viewport::Size)> {
        let page = self.pipeline.page()?;
        let container = self.sink.container_size()?;
        Some((viewport::compute_default(Some(page.geometry())), container))
    }

    fn fit(&mut self, wanted: f64, current: f64) -> bool {
        if current <= 0.0 || wanted <= 0.0 {
            return false;
        }
        self.apply_command(Command::SetScale(wanted / current))
    }

    fn apply_command(&mut self, cmd: Command) -> bool {
        let page_count = self.documents.document().map(DocumentHandle::page_count);
        let effects = self.nav.apply(cmd, page_count, &self.options.zoom);
        if effects.is_empty() {
            return false;
        }

        self.callbacks.navigation_changed(&self.nav);
        self.execute_effects(effects);
        true
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RunPipeline => self.run_pipeline(false),
                Effect::ForcePipeline => self.run_pipeline(true),
                Effect::Resize => self.resize_attached(),
            }
        }
    }

    /// Apply every completion that has arrived so far. Returns how many
    /// were handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for the next completion, then drain the
    /// rest. Returns false if nothing arrived.
    pub fn wait_for_event(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle_event(event);
                self.poll_events();
                true
            }
            Err(_) => false,
        }
    }

    fn handle_event(&mut self, event: EngineEvent<E>) {
        let EngineEvent { id, outcome } = event;

        match outcome {
            Outcome::Document(Ok(document)) => self.on_document_loaded(id, document),
            Outcome::Document(Err(fault)) => self.on_document_failed(id, fault),
            Outcome::PasswordRequired { reason, resolver } => {
                if !self.documents.is_current(id) {
                    debug!("Ignoring password request for abandoned load {id}");
                    return;
                }
                info!("Document {id} needs a password ({})", reason.as_str());
                if !self.callbacks.password_required(resolver, reason) {
                    warn!("No password handler registered; load {id} stays pending");
                }
            }
            Outcome::Page(result) => self.on_page_result(id, result),
            Outcome::Surface(result) => self.on_surface_result(id, result),
        }
    }

    fn on_document_loaded(&mut self, id: RequestId, document: E::Document) {
        let (completion, retired) = self.documents.complete(id, document);
        if let Some(retired) = retired {
            self.engine.close_document(retired);
        }
        if completion != LoadCompletion::Loaded {
            return;
        }

        if let Some(document) = self.documents.document() {
            self.callbacks.document_loaded(document);
        }

        self.cache.clear();
        self.detach();
        self.pipeline.reset();

        let initial_page = self.options.initial_page;
        self.apply_command(Command::ResetForDocument { initial_page });
    }

    fn on_document_failed(&mut self, id: RequestId, fault: EngineFault) {
        if self.documents.fail(id) != LoadCompletion::Failed {
            return;
        }

        warn!("Document load {id} failed: {fault}");
        let error = ViewerError::DocumentLoad { source: fault };
        self.callbacks.document_failed(&error);
    }

    fn run_pipeline(&mut self, force: bool) {
        let NavigationState { page, rotation, .. } = self.nav;
        if !self.pipeline.observe(page, rotation, force) {
            return;
        }

        if page == 0 {
            self.detach();
            self.pipeline.set_page(None);
            return;
        }

        let Some(document) = self.documents.document().cloned() else {
            debug!("No document loaded; nothing to render");
            return;
        };

        if let Some(handle) = self.cache.page(page) {
            debug!("Page cache hit for page {page}");
            self.on_page_resolved(page, handle);
            return;
        }

        let id = self.next_id();
        self.pipeline
            .track(id, Step::LoadPage { page }, self.documents.epoch());
        debug!("Loading page {page} ({id})");
        self.engine
            .load_page(&document, page, Reply::new(id, self.events_tx.clone()));
    }

    fn on_page_resolved(&mut self, page: u32, handle: E::Page) {
        self.pipeline.set_page(Some(handle.clone()));

        let viewport = self.viewport();
        let key = SurfaceKey::new(page, viewport.rotation);

        if let Some(surface) = self.cache.surface(&key) {
            debug!("Surface cache hit for page {page} at {}", key.rotation);
            self.attach(key, &surface, &handle);
            return;
        }

        let id = self.next_id();
        self.pipeline
            .track(id, Step::Render { key }, self.documents.epoch());
        debug!("Rendering page {page} at {} ({id})", key.rotation);
        self.engine
            .render(&handle, &viewport, Reply::new(id, self.events_tx.clone()));
    }

    /// Settle `id` and drop it if it belongs to an older document.
    fn settle(&mut self, id: RequestId) -> Option<Settled> {
        let Some(settled) = self.pipeline.settle(id) else {
            debug!("Ignoring completion for unknown request {id}");
            return None;
        };

        if settled.request.epoch != self.documents.epoch() {
            debug!("Dropping {id}: issued against a previous document");
            return None;
        }
        Some(settled)
    }

    fn on_page_result(&mut self, id: RequestId, result: Result<E::Page, EngineFault>) {
        let Some(settled) = self.settle(id) else {
            return;
        };
        let Step::LoadPage { page } = settled.request.step else {
            warn!("Request {id} answered with a page but was a render request");
            return;
        };

        match result {
            Ok(handle) => {
                self.cache.insert_page(page, handle.clone());
                if !settled.current {
                    debug!("Cached page {page} from superseded request {id}");
                    return;
                }
                self.callbacks.page_loaded(&handle);
                self.on_page_resolved(page, handle);
            }
            Err(fault) => {
                if !settled.current {
                    return;
                }
                warn!("Loading page {page} failed: {fault}");
                let error = ViewerError::PageLoad { page, source: fault };
                self.callbacks.page_failed(&error);
            }
        }
    }

    fn on_surface_result(&mut self, id: RequestId, result: Result<E::Surface, EngineFault>) {
        let Some(settled) = self.settle(id) else {
            return;
        };
        let Step::Render { key } = settled.request.step else {
            warn!("Request {id} answered with a surface but was a page request");
            return;
        };

        match result {
            Ok(surface) => {
                self.cache.insert_surface(key, surface.clone());
                if !settled.current {
                    debug!("Cached surface for page {} from superseded request {id}", key.page);
                    return;
                }
                let Some(page) = self.pipeline.page().cloned() else {
                    return;
                };
                self.attach(key, &surface, &page);
            }
            Err(fault) => {
                if !settled.current {
                    return;
                }
                warn!("Rendering page {} at {} failed: {fault}", key.page, key.rotation);
                let error = ViewerError::Render {
                    page: key.page,
                    rotation: key.rotation,
                    source: fault,
                };
                self.callbacks.render_failed(&error);
            }
        }
    }

    fn attach(&mut self, key: SurfaceKey, surface: &E::Surface, page: &E::Page) {
        self.sink.detach();
        self.sink.attach(surface, self.viewport().size());
        self.pipeline.set_attached(Some(key));
        self.callbacks.page_rendered(page);
    }

    fn detach(&mut self) {
        if self.sink.detach() {
            debug!("Cleared displayed page");
        }
        self.pipeline.set_attached(None);
    }

    fn resize_attached(&mut self) {
        if self.pipeline.attached().is_none() {
            return;
        }
        let size = self.viewport().size();
        self.sink.resize(size);
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

/// Any rotation other than upright or upside down fits against the
/// other axis, off-axis angles included
fn swaps_fit_axis(rotation: Rotation) -> bool {
    !matches!(rotation.degrees(), 0 | 180)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{MemorySink, ScriptedDocument, ScriptedEngine};

    #[test]
    fn wait_for_event_times_out_when_nothing_is_pending() {
        let (engine, _script) = ScriptedEngine::new();
        let mut viewer = Viewer::new(engine, MemorySink::new());

        assert!(viewer.is_idle());
        assert!(!viewer.wait_for_event(Duration::from_millis(1)));
    }

    #[test]
    fn wait_for_event_drains_the_whole_chain() {
        let (engine, script) = ScriptedEngine::new();
        script.add_document("doc.pdf", ScriptedDocument::new().pages(2, 100.0, 200.0));
        let mut viewer = Viewer::new(engine, MemorySink::new());

        viewer.set_source(Some(Source::url("doc.pdf")));
        assert!(!viewer.is_idle());
        assert!(viewer.wait_for_event(Duration::from_secs(1)));

        assert!(viewer.is_idle());
        assert_eq!(viewer.document_state(), DocumentState::Loaded);
        assert_eq!(viewer.attached(), Some(SurfaceKey::new(1, Rotation::ZERO)));
        assert_eq!(viewer.viewport().size(), viewport::Size::new(100.0, 200.0));
    }

    #[test]
    fn navigation_before_load_is_ignored() {
        let (engine, script) = ScriptedEngine::new();
        let mut viewer = Viewer::new(engine, MemorySink::new());

        assert!(!viewer.next_page());
        assert!(!viewer.goto_page(1));
        assert!(viewer.rotate_clockwise());
        assert_eq!(viewer.rotation().degrees(), 90);
        assert_eq!(script.calls().load_page, 0);
        assert!(viewer.viewport().is_empty());
    }
}
