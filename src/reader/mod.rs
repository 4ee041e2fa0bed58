//! XML Reader Module
//!
//! - Buffered: byte sources feeding the tokenizer
//! - Events: event kinds, names and locations
//! - Stream: pull reader producing one event per `next()`

pub mod buffered;
pub mod events;
pub mod stream;
