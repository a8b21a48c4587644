//! Two-level render cache: page handles and rendered surfaces
//!
//! Both levels live for the lifetime of one document and are only ever
//! emptied together, when a new document load starts or completes.
//! Lookups are exact-match; there is no eviction.

use lru::LruCache;

use crate::viewport::Rotation;

/// Cache key for rendered surfaces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceKey {
    /// 1-based page number
    pub page: u32,
    /// Effective rotation the surface was rendered at
    pub rotation: Rotation,
}

impl SurfaceKey {
    #[must_use]
    pub const fn new(page: u32, rotation: Rotation) -> Self {
        Self { page, rotation }
    }
}

/// Hit/miss counters for both cache levels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub page_hits: u64,
    pub page_misses: u64,
    pub surface_hits: u64,
    pub surface_misses: u64,
}

/// Page-object cache keyed by page number and surface cache keyed by
/// `(page, effective rotation)`
pub struct RenderCache<P, S> {
    pages: LruCache<u32, P>,
    surfaces: LruCache<SurfaceKey, S>,
    stats: CacheStats,
}

impl<P: Clone, S: Clone> Default for RenderCache<P, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone, S: Clone> RenderCache<P, S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: LruCache::unbounded(),
            surfaces: LruCache::unbounded(),
            stats: CacheStats::default(),
        }
    }

    /// Look up a page handle, counting the hit or miss
    pub fn page(&mut self, page: u32) -> Option<P> {
        let found = self.pages.get(&page).cloned();
        if found.is_some() {
            self.stats.page_hits += 1;
        } else {
            self.stats.page_misses += 1;
        }
        found
    }

    pub fn insert_page(&mut self, page: u32, handle: P) {
        self.pages.put(page, handle);
    }

    /// Look up a rendered surface, counting the hit or miss
    pub fn surface(&mut self, key: &SurfaceKey) -> Option<S> {
        let found = self.surfaces.get(key).cloned();
        if found.is_some() {
            self.stats.surface_hits += 1;
        } else {
            self.stats.surface_misses += 1;
        }
        found
    }

    pub fn insert_surface(&mut self, key: SurfaceKey, surface: S) {
        self.surfaces.put(key, surface);
    }

    #[must_use]
    pub fn contains_page(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn contains_surface(&self, key: &SurfaceKey) -> bool {
        self.surfaces.contains(key)
    }

    /// Drop every page handle and surface. Counters are kept.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.surfaces.clear();
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.surfaces.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
