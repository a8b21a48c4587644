//! Page render pipeline bookkeeping
//!
//! The pipeline runs whenever `(page, rotation)` changes: resolve the
//! page handle, compute the viewport, resolve the rendered surface and
//! attach it. Each run gets a new generation; requests issued by older
//! generations may still complete, but their results are never attached.

use std::collections::HashMap;

use log::debug;

use crate::cache::SurfaceKey;
use crate::engine::RequestId;
use crate::viewport::Rotation;

/// Asynchronous step a request belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    LoadPage { page: u32 },
    Render { key: SurfaceKey },
}

/// Outstanding page or render request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InFlight {
    pub step: Step,
    /// Pipeline generation that issued the request
    pub generation: u64,
    /// Document epoch the request was issued against
    pub epoch: u64,
}

/// A completed request, classified
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settled {
    pub request: InFlight,
    /// True if the result may be applied and the chain continued
    pub current: bool,
}

/// State of the page pipeline between engine completions
pub struct PageRenderController<P> {
    generation: u64,
    last_inputs: Option<(u32, Rotation)>,
    awaiting: Option<RequestId>,
    in_flight: HashMap<RequestId, InFlight>,
    page: Option<P>,
    attached: Option<SurfaceKey>,
}

impl<P> Default for PageRenderController<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PageRenderController<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: 0,
            last_inputs: None,
            awaiting: None,
            in_flight: HashMap::new(),
            page: None,
            attached: None,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record the current inputs. Returns true (and starts a new
    /// generation) if they differ from the last run or `force` is set.
    pub fn observe(&mut self, page: u32, rotation: Rotation, force: bool) -> bool {
        let inputs = (page, rotation);
        if !force && self.last_inputs == Some(inputs) {
            return false;
        }

        self.last_inputs = Some(inputs);
        self.generation += 1;
        if let Some(id) = self.awaiting.take() {
            debug!("Pipeline generation {} supersedes {id}", self.generation);
        }
        true
    }

    /// Remember a request issued by the current generation.
    pub fn track(&mut self, id: RequestId, step: Step, epoch: u64) {
        self.in_flight.insert(
            id,
            InFlight {
                step,
                generation: self.generation,
                epoch,
            },
        );
        self.awaiting = Some(id);
    }

    /// Forget a completed request and report whether it is still wanted.
    /// Returns `None` for ids this pipeline never issued.
    pub fn settle(&mut self, id: RequestId) -> Option<Settled> {
        let request = self.in_flight.remove(&id)?;
        let current = self.awaiting == Some(id) && request.generation == self.generation;
        if current {
            self.awaiting = None;
        }
        Some(Settled { request, current })
    }

    /// True while the current generation waits on the engine
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.awaiting.is_some()
    }

    #[must_use]
    pub fn page(&self) -> Option<&P> {
        self.page.as_ref()
    }

    pub fn set_page(&mut self, page: Option<P>) {
        self.page = page;
    }

    #[must_use]
    pub fn attached(&self) -> Option<SurfaceKey> {
        self.attached
    }

    pub fn set_attached(&mut self, key: Option<SurfaceKey>) {
        self.attached = key;
    }

    /// Forget everything tied to the previous document.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.last_inputs = None;
        self.awaiting = None;
        self.page = None;
        self.attached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_detects_value_changes_only() {
        let mut pipeline: PageRenderController<()> = PageRenderController::new();

        assert!(pipeline.observe(1, Rotation::ZERO, false));
        assert!(!pipeline.observe(1, Rotation::ZERO, false));
        assert!(!pipeline.observe(1, Rotation::new(360), false));
        assert!(pipeline.observe(1, Rotation::new(90), false));
        assert!(pipeline.observe(2, Rotation::new(90), false));
        assert_eq!(pipeline.generation(), 3);
    }

    #[test]
    fn force_reruns_with_identical_inputs() {
        let mut pipeline: PageRenderController<()> = PageRenderController::new();
        assert!(pipeline.observe(1, Rotation::ZERO, false));
        assert!(pipeline.observe(1, Rotation::ZERO, true));
    }

    #[test]
    fn newer_generation_makes_older_results_stale() {
        let mut pipeline: PageRenderController<()> = PageRenderController::new();

        let _ = pipeline.observe(1, Rotation::ZERO, false);
        pipeline.track(RequestId::new(10), Step::LoadPage { page: 1 }, 1);

        let _ = pipeline.observe(2, Rotation::ZERO, false);
        pipeline.track(RequestId::new(11), Step::LoadPage { page: 2 }, 1);

        let old = pipeline.settle(RequestId::new(10)).expect("tracked");
        assert!(!old.current);
        assert_eq!(old.request.step, Step::LoadPage { page: 1 });

        let new = pipeline.settle(RequestId::new(11)).expect("tracked");
        assert!(new.current);
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn unknown_ids_are_not_settled() {
        let mut pipeline: PageRenderController<()> = PageRenderController::new();
        assert!(pipeline.settle(RequestId::new(99)).is_none());
    }

    #[test]
    fn reset_forgets_inputs_and_page() {
        let mut pipeline = PageRenderController::new();
        let _ = pipeline.observe(1, Rotation::ZERO, false);
        pipeline.set_page(Some("page"));
        pipeline.set_attached(Some(SurfaceKey::new(1, Rotation::ZERO)));
        pipeline.track(RequestId::new(5), Step::LoadPage { page: 1 }, 1);

        pipeline.reset();

        assert!(pipeline.page().is_none());
        assert!(pipeline.attached().is_none());
        assert!(!pipeline.is_busy());
        assert!(pipeline.observe(1, Rotation::ZERO, false));

        let settled = pipeline.settle(RequestId::new(5)).expect("still tracked");
        assert!(!settled.current);
    }
}
