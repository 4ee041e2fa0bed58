//! ResourceArc Wrappers
//!
//! Persistent cursor trees for the NIF surface. Each resource owns one
//! `CursorTree` (and with it the reader and input buffer); Elixir holds
//! cursor handles as `{index, generation}` tuples into that tree.

use crate::config::ReaderConfig;
use crate::cursor::{CursorId, CursorTree};
use crate::reader::buffered::SliceSource;
use crate::reader::stream::StreamReader;
use rustler::ResourceArc;
use std::sync::Mutex;

/// Wrapper for CursorTree that can be stored in a ResourceArc
pub struct CursorTreeResource {
    pub inner: Mutex<CursorTree>,
}

impl CursorTreeResource {
    pub fn new(input: Vec<u8>, config: ReaderConfig) -> Self {
        let reader = StreamReader::new(Box::new(SliceSource::new(input)), config);
        CursorTreeResource {
            inner: Mutex::new(CursorTree::new(reader)),
        }
    }

    /// Run `f` with exclusive access to the tree.
    ///
    /// # Errors
    ///
    /// Returns `"mutex_poisoned"` if a previous call panicked while
    /// holding the tree.
    pub fn with_tree<F, R>(&self, f: F) -> Result<R, &'static str>
    where
        F: FnOnce(&mut CursorTree) -> R,
    {
        let mut guard = self.inner.lock().map_err(|_| "mutex_poisoned")?;
        Ok(f(&mut guard))
    }
}

#[rustler::resource_impl]
impl rustler::Resource for CursorTreeResource {}

/// Type alias for the ResourceArc
pub type CursorTreeRef = ResourceArc<CursorTreeResource>;

/// Cursor handle as seen from Elixir
pub type RawCursor = (u32, u32);

pub fn cursor_id((index, generation): RawCursor) -> CursorId {
    CursorId::from_raw(index, generation)
}
