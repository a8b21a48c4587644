//! Lifecycle observers
//!
//! Every callback is optional and fire-and-forget. A missing callback
//! means the corresponding event, including failures, is dropped.

use crate::engine::{PasswordReason, PasswordResolver, RenderEngine};
use crate::error::ViewerError;
use crate::navigation::NavigationState;

type Handler<T> = Option<Box<dyn FnMut(&T)>>;

/// Observer set for one viewer
pub struct Callbacks<E: RenderEngine> {
    document_load_success: Handler<E::Document>,
    document_load_fail: Handler<ViewerError>,
    page_load_success: Handler<E::Page>,
    page_load_fail: Handler<ViewerError>,
    page_render_success: Handler<E::Page>,
    page_render_fail: Handler<ViewerError>,
    password: Option<Box<dyn FnMut(PasswordResolver, PasswordReason)>>,
    navigation_change: Handler<NavigationState>,
}

impl<E: RenderEngine> Default for Callbacks<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RenderEngine> Callbacks<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            document_load_success: None,
            document_load_fail: None,
            page_load_success: None,
            page_load_fail: None,
            page_render_success: None,
            page_render_fail: None,
            password: None,
            navigation_change: None,
        }
    }

    #[must_use]
    pub fn on_document_load_success(mut self, f: impl FnMut(&E::Document) + 'static) -> Self {
        self.document_load_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_document_load_fail(mut self, f: impl FnMut(&ViewerError) + 'static) -> Self {
        self.document_load_fail = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_load_success(mut self, f: impl FnMut(&E::Page) + 'static) -> Self {
        self.page_load_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_load_fail(mut self, f: impl FnMut(&ViewerError) + 'static) -> Self {
        self.page_load_fail = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_render_success(mut self, f: impl FnMut(&E::Page) + 'static) -> Self {
        self.page_render_success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_page_render_fail(mut self, f: impl FnMut(&ViewerError) + 'static) -> Self {
        self.page_render_fail = Some(Box::new(f));
        self
    }

    /// Handler asked to supply a password; it must call
    /// [`PasswordResolver::resolve`] for the load to continue.
    #[must_use]
    pub fn on_password(mut self, f: impl FnMut(PasswordResolver, PasswordReason) + 'static) -> Self {
        self.password = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_navigation_change(mut self, f: impl FnMut(&NavigationState) + 'static) -> Self {
        self.navigation_change = Some(Box::new(f));
        self
    }

    pub(crate) fn document_loaded(&mut self, document: &E::Document) {
        fire(&mut self.document_load_success, document);
    }

    pub(crate) fn document_failed(&mut self, error: &ViewerError) {
        fire(&mut self.document_load_fail, error);
    }

    pub(crate) fn page_loaded(&mut self, page: &E::Page) {
        fire(&mut self.page_load_success, page);
    }

    pub(crate) fn page_failed(&mut self, error: &ViewerError) {
        fire(&mut self.page_load_fail, error);
    }

    pub(crate) fn page_rendered(&mut self, page: &E::Page) {
        fire(&mut self.page_render_success, page);
    }

    pub(crate) fn render_failed(&mut self, error: &ViewerError) {
        fire(&mut self.page_render_fail, error);
    }

    pub(crate) fn navigation_changed(&mut self, state: &NavigationState) {
        fire(&mut self.navigation_change, state);
    }

    /// Returns false if nobody is listening; the resolver is dropped then.
    pub(crate) fn password_required(
        &mut self,
        resolver: PasswordResolver,
        reason: PasswordReason,
    ) -> bool {
        match self.password.as_mut() {
            Some(handler) => {
                handler(resolver, reason);
                true
            }
            None => false,
        }
    }
}

fn fire<T: ?Sized>(handler: &mut Option<Box<dyn FnMut(&T)>>, value: &T) {
    if let Some(handler) = handler.as_mut() {
        handler(value);
    }
}
