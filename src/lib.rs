//! RustyStax - Streaming pull XML parsing with cursors
//!
//! Layers:
//! - `reader::stream::StreamReader`: event-at-a-time pull reader
//! - `cursor::CursorTree`: nested and flattening cursors over one reader,
//!   with per-cursor filters and optional element tracking
//! - `nif` (feature): Erlang NIF surface over a cursor tree
//!
//! ```
//! use rustystax::{cursor::CursorTree, EventKind};
//!
//! let mut tree = CursorTree::new(rustystax::open_str("<a><b/>text</a>"));
//! let root = tree.root_element_cursor().unwrap();
//! assert_eq!(tree.advance(root).unwrap(), Some(EventKind::StartElement));
//! assert_eq!(tree.local_name(root).unwrap(), "a");
//! ```

pub mod config;
pub mod core;
pub mod cursor;
pub mod error;
pub mod reader;

#[cfg(feature = "nif")]
mod nif;
#[cfg(feature = "nif")]
mod resource;
#[cfg(feature = "nif")]
mod term;

pub use config::{EntityResolver, ReaderConfig};
pub use cursor::{CursorId, CursorState, CursorTree, Filter, TrackedElement, Tracking, TraversalMode};
pub use error::{Result, XmlError};
pub use reader::buffered::{ByteSource, ReadSource, SliceSource};
pub use reader::events::{EventKind, Location, QName};
pub use reader::stream::StreamReader;

use std::io::Read;

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Constructors
// ============================================================================

/// Reader over a string with the default configuration
pub fn open_str(input: &str) -> StreamReader {
    open_str_with(input, ReaderConfig::default())
}

pub fn open_str_with(input: &str, config: ReaderConfig) -> StreamReader {
    open_bytes_with(input.as_bytes().to_vec(), config)
}

/// Reader over an owned byte buffer (UTF-8, optional BOM)
pub fn open_bytes(input: impl Into<Vec<u8>>) -> StreamReader {
    open_bytes_with(input, ReaderConfig::default())
}

pub fn open_bytes_with(input: impl Into<Vec<u8>>, config: ReaderConfig) -> StreamReader {
    open_source_with(SliceSource::new(input), config)
}

/// Reader pulling from any `std::io::Read`, refilled in
/// `ReaderConfig::buffer_size` chunks
pub fn open_reader<R: Read + Send + 'static>(reader: R) -> StreamReader {
    open_reader_with(reader, ReaderConfig::default())
}

pub fn open_reader_with<R: Read + Send + 'static>(reader: R, config: ReaderConfig) -> StreamReader {
    open_source_with(ReadSource::new(reader), config)
}

/// Reader over a custom byte source
pub fn open_source<S: ByteSource + Send + 'static>(source: S) -> StreamReader {
    open_source_with(source, ReaderConfig::default())
}

pub fn open_source_with<S: ByteSource + Send + 'static>(source: S, config: ReaderConfig) -> StreamReader {
    StreamReader::new(Box::new(source), config)
}
