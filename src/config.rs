//! Reader Configuration

use crate::core::entities::EntityDeclaration;
use std::fmt;
use std::sync::Arc;

/// Buffer size for reading chunks
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Smallest buffer the scanner works with (longest fixed lookahead is `<![CDATA[`)
pub const MIN_BUFFER_SIZE: usize = 64;

/// Default number of distinct names kept in the name cache
pub const DEFAULT_NAME_CACHE_CAPACITY: usize = 512;

/// Callback used to fetch replacement text of external parsed entities
/// in expanding mode. Returning `None` leaves the reference unexpanded.
pub type EntityResolver = Arc<dyn Fn(&EntityDeclaration) -> Option<String> + Send + Sync>;

/// Configuration for the stream reader.
#[derive(Clone)]
pub struct ReaderConfig {
    /// Resolve prefixes to namespace URIs. When off, names are kept
    /// verbatim (`a:b` becomes local name `a:b`) and `xmlns` attributes
    /// are ordinary attributes.
    pub namespace_aware: bool,
    /// Replace references to declared entities with their text. When
    /// off, such references are reported as `EntityReference` events.
    pub expand_entities: bool,
    /// Initial input buffer capacity in bytes
    pub buffer_size: usize,
    /// Maximum number of interned names (0 disables the cache)
    pub name_cache_capacity: usize,
    /// Resolver for external parsed entities
    pub entity_resolver: Option<EntityResolver>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            namespace_aware: true,
            expand_entities: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            name_cache_capacity: DEFAULT_NAME_CACHE_CAPACITY,
            entity_resolver: None,
        }
    }
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace_aware(mut self, enabled: bool) -> Self {
        self.namespace_aware = enabled;
        self
    }

    pub fn expand_entities(mut self, enabled: bool) -> Self {
        self.expand_entities = enabled;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(MIN_BUFFER_SIZE);
        self
    }

    pub fn name_cache_capacity(mut self, capacity: usize) -> Self {
        self.name_cache_capacity = capacity;
        self
    }

    pub fn entity_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&EntityDeclaration) -> Option<String> + Send + Sync + 'static,
    {
        self.entity_resolver = Some(Arc::new(resolver));
        self
    }
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("namespace_aware", &self.namespace_aware)
            .field("expand_entities", &self.expand_entities)
            .field("buffer_size", &self.buffer_size)
            .field("name_cache_capacity", &self.name_cache_capacity)
            .field("entity_resolver", &self.entity_resolver.is_some())
            .finish()
    }
}
