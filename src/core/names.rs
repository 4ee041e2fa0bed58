//! Name Interning
//!
//! Element and attribute names repeat heavily in real documents. The
//! cache hands out one shared `Arc<str>` per distinct name, bounded by
//! an LRU so pathological inputs cannot grow it without limit.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Bounded cache of interned names
pub struct NameCache {
    /// None when caching is disabled (capacity 0)
    cache: Option<LruCache<Box<[u8]>, Arc<str>>>,
}

impl NameCache {
    pub fn new(capacity: usize) -> Self {
        NameCache {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Intern a name that is already known to be valid UTF-8
    pub fn intern(&mut self, name: &str) -> Arc<str> {
        let Some(cache) = self.cache.as_mut() else {
            return Arc::from(name);
        };
        if let Some(hit) = cache.get(name.as_bytes()) {
            return Arc::clone(hit);
        }
        let interned: Arc<str> = Arc::from(name);
        cache.put(name.as_bytes().into(), Arc::clone(&interned));
        interned
    }

    /// Intern raw name bytes. Returns None for invalid UTF-8.
    pub fn intern_bytes(&mut self, name: &[u8]) -> Option<Arc<str>> {
        if let Some(hit) = self.cache.as_mut().and_then(|c| c.get(name)) {
            return Some(Arc::clone(hit));
        }
        let text = std::str::from_utf8(name).ok()?;
        Some(self.intern(text))
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for NameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameCache")
            .field("len", &self.len())
            .field("capacity", &self.cache.as_ref().map_or(0, |c| c.cap().get()))
            .finish()
    }
}
