//! Elixir Term Conversion Utilities
//!
//! Converts cursor events, names and attributes to Elixir terms.

use crate::core::attributes::AttributeRef;
use crate::cursor::Filter;
use crate::error::XmlError;
use crate::reader::events::{EventKind, Location};
use rustler::{Atom, Encoder, Env, NewBinary, Term};

// Pre-defined atoms for efficiency - created once at compile time
rustler::atoms! {
    ok,
    error,
    start_element,
    end_element,
    characters,
    cdata,
    comment,
    processing_instruction,
    entity_reference,
    start_document,
    end_document,
    space,
    dtd,
    // filters
    all,
    elements,
    text,
    mixed,
    non_whitespace,
    // error kinds
    malformed,
    duplicate_attribute,
    undeclared_prefix,
    permanent_binding,
    io,
    structural,
    aborted,
    invalid_cursor_state,
    not_resolved,
    not_text_positioned,
}

pub fn event_kind_atom(kind: EventKind) -> Atom {
    match kind {
        EventKind::StartElement => start_element(),
        EventKind::EndElement => end_element(),
        EventKind::Characters => characters(),
        EventKind::CData => cdata(),
        EventKind::Comment => comment(),
        EventKind::ProcessingInstruction => processing_instruction(),
        EventKind::EntityReference => entity_reference(),
        EventKind::StartDocument => start_document(),
        EventKind::EndDocument => end_document(),
        EventKind::Space => space(),
        EventKind::Dtd => dtd(),
    }
}

/// Map a filter atom (`:all`, `:elements`, `:text`, `:mixed`,
/// `:non_whitespace`) to a cursor filter
pub fn filter_from_atom(atom: Atom) -> Result<Option<Filter>, &'static str> {
    if atom == all() {
        Ok(None)
    } else if atom == elements() {
        Ok(Some(Filter::elements()))
    } else if atom == text() {
        Ok(Some(Filter::text()))
    } else if atom == mixed() {
        Ok(Some(Filter::mixed()))
    } else if atom == non_whitespace() {
        Ok(Some(Filter::non_whitespace()))
    } else {
        Err("unknown_filter")
    }
}

fn error_kind(err: &XmlError) -> Atom {
    match err {
        XmlError::Malformed { .. } => malformed(),
        XmlError::DuplicateAttribute { .. } => duplicate_attribute(),
        XmlError::UndeclaredPrefix { .. } => undeclared_prefix(),
        XmlError::PermanentBinding { .. } => permanent_binding(),
        XmlError::IoAnomaly(_) | XmlError::Io(_) => io(),
        XmlError::Structural(_) => structural(),
        XmlError::Aborted => aborted(),
        XmlError::InvalidCursorState(_) => invalid_cursor_state(),
        XmlError::NotResolved => not_resolved(),
        XmlError::NotTextPositioned(_) => not_text_positioned(),
    }
}

/// `{:error, {kind, message}}`
pub fn error_to_term<'a>(env: Env<'a>, err: &XmlError) -> Term<'a> {
    (error(), (error_kind(err), err.to_string())).encode(env)
}

/// `{line, column, offset}`
pub fn location_to_term<'a>(env: Env<'a>, location: Location) -> Term<'a> {
    (location.line, location.column, location.offset).encode(env)
}

/// `{local_name, namespace_uri | nil, value}`
pub fn attribute_to_term<'a>(env: Env<'a>, attr: &AttributeRef<'_>) -> Term<'a> {
    let namespace = match attr.name.namespace_uri() {
        Some(uri) => str_to_binary(env, uri),
        None => rustler::types::atom::nil().encode(env),
    };
    (
        str_to_binary(env, attr.name.local_name()),
        namespace,
        str_to_binary(env, attr.value),
    )
        .encode(env)
}

/// Binary for `Some`, nil for `None`
pub fn optional_str<'a>(env: Env<'a>, s: Option<&str>) -> Term<'a> {
    match s {
        Some(s) => str_to_binary(env, s),
        None => rustler::types::atom::nil().encode(env),
    }
}

/// Convert a string to a binary term (more efficient than .encode())
#[inline]
pub fn str_to_binary<'a>(env: Env<'a>, s: &str) -> Term<'a> {
    let bytes = s.as_bytes();
    let mut binary = NewBinary::new(env, bytes.len());
    binary.as_mut_slice().copy_from_slice(bytes);
    binary.into()
}
