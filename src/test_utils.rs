pub mod test_helpers {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use crate::engine::{
        DocumentHandle, EngineFault, PageHandle, PasswordReason, PasswordResolver, RenderEngine,
        Reply, RequestId,
    };
    use crate::sink::SurfaceSink;
    use crate::source::{LoadConfig, Source, SourceData};
    use crate::viewport::{PageGeometry, Rotation, Size, Viewport};

    /// Document handed out by [`ScriptedEngine`]
    #[derive(Clone, Debug, PartialEq)]
    pub struct FakeDocument {
        pub key: String,
        pub pages: Arc<[PageGeometry]>,
    }

    impl DocumentHandle for FakeDocument {
        fn page_count(&self) -> u32 {
            u32::try_from(self.pages.len()).unwrap_or(u32::MAX)
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct FakePage {
        pub document: String,
        pub number: u32,
        pub geometry: PageGeometry,
    }

    impl PageHandle for FakePage {
        fn number(&self) -> u32 {
            self.number
        }

        fn geometry(&self) -> PageGeometry {
            self.geometry
        }
    }

    /// Stand-in for rendered output; `serial` tells renders apart
    #[derive(Clone, Debug, PartialEq)]
    pub struct FakeSurface {
        pub document: String,
        pub page: u32,
        pub rotation: Rotation,
        pub width: f64,
        pub height: f64,
        pub serial: u64,
    }

    /// A document the scripted engine knows how to open
    #[derive(Clone, Debug, Default)]
    pub struct ScriptedDocument {
        pages: Vec<PageGeometry>,
        password: Option<String>,
        failure: Option<String>,
    }

    impl ScriptedDocument {
        pub fn new() -> Self {
            Self::default()
        }

        /// `count` upright pages of the same size
        pub fn pages(mut self, count: u32, width: f64, height: f64) -> Self {
            for _ in 0..count {
                self = self.page(width, height);
            }
            self
        }

        pub fn page(self, width: f64, height: f64) -> Self {
            self.rotated_page(width, height, 0)
        }

        /// Page carrying its own `/Rotate`
        pub fn rotated_page(mut self, width: f64, height: f64, degrees: i32) -> Self {
            self.pages.push(PageGeometry {
                size: Size::new(width, height),
                rotation: Rotation::new(degrees),
            });
            self
        }

        pub fn with_password(mut self, password: impl Into<String>) -> Self {
            self.password = Some(password.into());
            self
        }

        pub fn failing(mut self, message: impl Into<String>) -> Self {
            self.failure = Some(message.into());
            self
        }
    }

    /// How often each engine entry point was called
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CallCounts {
        pub load_document: usize,
        pub load_page: usize,
        pub render: usize,
    }

    type Completion = Box<dyn FnOnce() + Send>;

    #[derive(Default)]
    struct Script {
        documents: HashMap<String, ScriptedDocument>,
        failing_pages: HashSet<u32>,
        failing_renders: HashSet<u32>,
        deferred: bool,
        queue: VecDeque<Completion>,
        calls: CallCounts,
        cancelled: Vec<RequestId>,
        open: HashMap<String, usize>,
        closed: Vec<String>,
        configs: Vec<LoadConfig>,
        viewports: Vec<Viewport>,
        next_serial: u64,
    }

    fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
        script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `completion` now, or queue it when the script is deferred
    fn complete(script: &Arc<Mutex<Script>>, completion: impl FnOnce() + Send + 'static) {
        let mut guard = lock(script);
        if guard.deferred {
            guard.queue.push_back(Box::new(completion));
            return;
        }
        drop(guard);
        completion();
    }

    /// Lookup key for a source: the URL, or the buffer read as UTF-8
    pub fn source_key(source: &Source) -> String {
        match &source.data {
            SourceData::Url(url) => url.clone(),
            SourceData::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// In-memory engine driven by a script of known documents.
    ///
    /// Answers immediately by default. In deferred mode completions are
    /// queued until released through the [`ScriptHandle`], which lets
    /// tests reorder them.
    pub struct ScriptedEngine {
        script: Arc<Mutex<Script>>,
    }

    /// Test-side control over a [`ScriptedEngine`] after it has been
    /// moved into a viewer
    #[derive(Clone)]
    pub struct ScriptHandle {
        script: Arc<Mutex<Script>>,
    }

    impl ScriptedEngine {
        pub fn new() -> (Self, ScriptHandle) {
            let script = Arc::new(Mutex::new(Script::default()));
            (
                Self {
                    script: script.clone(),
                },
                ScriptHandle { script },
            )
        }

        fn open(
            script: Arc<Mutex<Script>>,
            key: String,
            password: Option<String>,
            retry: bool,
            reply: Reply<Self>,
        ) {
            let document = lock(&script).documents.get(&key).cloned();
            let Some(document) = document else {
                reply.document(Err(EngineFault::UnsupportedSource {
                    detail: format!("no scripted document for {key:?}"),
                }));
                return;
            };

            if let Some(message) = document.failure {
                reply.document(Err(EngineFault::generic(message)));
                return;
            }

            if let Some(required) = &document.password {
                if password.as_deref() != Some(required.as_str()) {
                    let reason = if retry || password.is_some() {
                        PasswordReason::IncorrectPassword
                    } else {
                        PasswordReason::NeedPassword
                    };
                    let next = reply.clone();
                    let resolver = PasswordResolver::new(move |password| {
                        let again = script.clone();
                        complete(&script, move || {
                            Self::open(again, key, Some(password), true, next);
                        });
                    });
                    reply.password(reason, resolver);
                    return;
                }
            }

            *lock(&script).open.entry(key.clone()).or_default() += 1;
            reply.document(Ok(FakeDocument {
                key,
                pages: document.pages.into(),
            }));
        }
    }

    impl RenderEngine for ScriptedEngine {
        type Document = FakeDocument;
        type Page = FakePage;
        type Surface = FakeSurface;

        fn load_document(&mut self, source: &Source, config: &LoadConfig, reply: Reply<Self>) {
            {
                let mut script = lock(&self.script);
                script.calls.load_document += 1;
                script.configs.push(config.clone());
            }

            let script = self.script.clone();
            let key = source_key(source);
            let password = config.password.clone();
            complete(&self.script, move || {
                Self::open(script, key, password, false, reply);
            });
        }

        fn load_page(&mut self, document: &FakeDocument, page: u32, reply: Reply<Self>) {
            let failing = {
                let mut script = lock(&self.script);
                script.calls.load_page += 1;
                script.failing_pages.contains(&page)
            };

            let document = document.clone();
            let script = self.script.clone();
            complete(&self.script, move || {
                let is_open = lock(&script).open.get(&document.key).copied().unwrap_or(0) > 0;
                let page_count = document.page_count();
                let geometry = page
                    .checked_sub(1)
                    .and_then(|index| document.pages.get(index as usize));

                let result = match geometry {
                    _ if !is_open => Err(EngineFault::generic(format!(
                        "document {} is closed",
                        document.key
                    ))),
                    _ if failing => Err(EngineFault::generic(format!("page {page} is damaged"))),
                    Some(geometry) => Ok(FakePage {
                        document: document.key.clone(),
                        number: page,
                        geometry: *geometry,
                    }),
                    None => Err(EngineFault::PageOutOfRange { page, page_count }),
                };
                reply.page(result);
            });
        }

        fn render(&mut self, page: &FakePage, viewport: &Viewport, reply: Reply<Self>) {
            let (failing, serial) = {
                let mut script = lock(&self.script);
                script.calls.render += 1;
                script.viewports.push(*viewport);
                script.next_serial += 1;
                (script.failing_renders.contains(&page.number), script.next_serial)
            };

            let surface = FakeSurface {
                document: page.document.clone(),
                page: page.number,
                rotation: viewport.rotation,
                width: viewport.width,
                height: viewport.height,
                serial,
            };
            complete(&self.script, move || {
                if failing {
                    reply.surface(Err(EngineFault::generic(format!(
                        "render of page {} failed",
                        surface.page
                    ))));
                } else {
                    reply.surface(Ok(surface));
                }
            });
        }

        fn cancel(&mut self, id: RequestId) {
            lock(&self.script).cancelled.push(id);
        }

        fn close_document(&mut self, document: FakeDocument) {
            let mut script = lock(&self.script);
            if let Some(count) = script.open.get_mut(&document.key) {
                *count = count.saturating_sub(1);
            }
            script.closed.push(document.key);
        }
    }

    impl ScriptHandle {
        pub fn add_document(&self, key: impl Into<String>, document: ScriptedDocument) {
            lock(&self.script).documents.insert(key.into(), document);
        }

        pub fn fail_page(&self, page: u32) {
            lock(&self.script).failing_pages.insert(page);
        }

        pub fn fail_render(&self, page: u32) {
            lock(&self.script).failing_renders.insert(page);
        }

        /// Queue completions instead of answering immediately
        pub fn set_deferred(&self, deferred: bool) {
            lock(&self.script).deferred = deferred;
        }

        pub fn pending(&self) -> usize {
            lock(&self.script).queue.len()
        }

        /// Run the oldest queued completion
        pub fn release_next(&self) -> bool {
            let completion = lock(&self.script).queue.pop_front();
            completion.map(|run| run()).is_some()
        }

        /// Run the newest queued completion
        pub fn release_latest(&self) -> bool {
            let completion = lock(&self.script).queue.pop_back();
            completion.map(|run| run()).is_some()
        }

        /// Run queued completions, including any queued while running,
        /// until none are left
        pub fn release_all(&self) -> usize {
            let mut released = 0;
            while self.release_next() {
                released += 1;
            }
            released
        }

        pub fn calls(&self) -> CallCounts {
            lock(&self.script).calls
        }

        pub fn cancelled(&self) -> Vec<RequestId> {
            lock(&self.script).cancelled.clone()
        }

        /// Keys of documents the viewer closed, in call order
        pub fn closed(&self) -> Vec<String> {
            lock(&self.script).closed.clone()
        }

        /// Configuration passed to each `load_document`, in call order
        pub fn configs(&self) -> Vec<LoadConfig> {
            lock(&self.script).configs.clone()
        }

        pub fn last_viewport(&self) -> Option<Viewport> {
            lock(&self.script).viewports.last().copied()
        }
    }

    /// Sink that keeps the attached surface in memory
    #[derive(Debug)]
    pub struct MemorySink<S> {
        pub current: Option<S>,
        pub size: Option<Size>,
        pub container: Option<Size>,
        pub attaches: usize,
        pub detaches: usize,
        pub resizes: usize,
    }

    impl<S> Default for MemorySink<S> {
        fn default() -> Self {
            Self {
                current: None,
                size: None,
                container: None,
                attaches: 0,
                detaches: 0,
                resizes: 0,
            }
        }
    }

    impl<S> MemorySink<S> {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_container(mut self, width: f64, height: f64) -> Self {
            self.container = Some(Size::new(width, height));
            self
        }
    }

    impl<S: Clone> SurfaceSink<S> for MemorySink<S> {
        fn attach(&mut self, surface: &S, size: Size) {
            self.current = Some(surface.clone());
            self.size = Some(size);
            self.attaches += 1;
        }

        fn detach(&mut self) -> bool {
            self.size = None;
            if self.current.take().is_none() {
                return false;
            }
            self.detaches += 1;
            true
        }

        fn resize(&mut self, size: Size) {
            if self.current.is_some() {
                self.size = Some(size);
                self.resizes += 1;
            }
        }

        fn container_size(&self) -> Option<Size> {
            self.container
        }
    }
}
