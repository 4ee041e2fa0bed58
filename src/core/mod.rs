//! Core XML parsing primitives
//!
//! This module contains the fundamental building blocks for XML parsing:
//! - Scanner: refillable input buffer with memchr delimiter detection
//! - Tokenizer: State machine for XML token extraction
//! - Entities: character/entity reference decoding and the entity registry
//! - DTD: entity declarations from the DOCTYPE internal subset
//! - Attributes: per-tag attribute collection and hashed lookup
//! - Namespace: prefix scope stack
//! - Names: LRU name interning

pub mod attributes;
pub mod dtd;
pub mod entities;
pub mod names;
pub mod namespace;
pub mod scanner;
pub mod tokenizer;
