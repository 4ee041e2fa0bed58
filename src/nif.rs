//! NIF Surface
//!
//! Elixir bindings over the cursor engine. A document is opened into a
//! `CursorTreeRef`; cursors are `{index, generation}` tuples into it.
//! Fallible calls return `{:ok, value}` or `{:error, {kind, message}}`.

use crate::config::ReaderConfig;
use crate::cursor::CursorTree;
use crate::error::Result;
use crate::resource::{cursor_id, CursorTreeRef, CursorTreeResource, RawCursor};
use crate::term::{self, str_to_binary};
use rustler::{Atom, Binary, Encoder, Env, NifResult, ResourceArc, Term};

fn reply<'a>(env: Env<'a>, result: Result<Term<'a>>) -> Term<'a> {
    match result {
        Ok(value) => (term::ok(), value).encode(env),
        Err(e) => term::error_to_term(env, &e),
    }
}

fn with_tree<'a, F>(env: Env<'a>, tree: &CursorTreeRef, f: F) -> NifResult<Term<'a>>
where
    F: FnOnce(&mut CursorTree) -> Result<Term<'a>>,
{
    tree.with_tree(|t| reply(env, f(t)))
        .map_err(|msg| rustler::Error::Term(Box::new(msg)))
}

// ============================================================================
// Opening documents
// ============================================================================

/// Open a document with the default configuration
#[rustler::nif]
fn open(input: Binary) -> CursorTreeRef {
    ResourceArc::new(CursorTreeResource::new(
        input.as_slice().to_vec(),
        ReaderConfig::default(),
    ))
}

/// Open a document with explicit namespace and entity handling
#[rustler::nif]
fn open_with(input: Binary, namespace_aware: bool, expand_entities: bool) -> CursorTreeRef {
    let config = ReaderConfig::new()
        .namespace_aware(namespace_aware)
        .expand_entities(expand_entities);
    ResourceArc::new(CursorTreeResource::new(input.as_slice().to_vec(), config))
}

// ============================================================================
// Cursor creation
// ============================================================================

/// Create the root cursor; `flattening` selects the traversal mode
#[rustler::nif]
fn root_cursor<'a>(env: Env<'a>, tree: CursorTreeRef, flattening: bool, filter: Atom) -> NifResult<Term<'a>> {
    let filter = term::filter_from_atom(filter).map_err(|msg| rustler::Error::Term(Box::new(msg)))?;
    with_tree(env, &tree, |t| {
        let id = if flattening {
            t.root_flattening_cursor(filter)?
        } else {
            t.root_cursor(filter)?
        };
        Ok(id.to_raw().encode(env))
    })
}

#[rustler::nif]
fn child_cursor<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor, filter: Atom) -> NifResult<Term<'a>> {
    let filter = term::filter_from_atom(filter).map_err(|msg| rustler::Error::Term(Box::new(msg)))?;
    with_tree(env, &tree, |t| {
        let id = t.child_cursor(cursor_id(cursor), filter)?;
        Ok(id.to_raw().encode(env))
    })
}

#[rustler::nif]
fn descendant_cursor<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor, filter: Atom) -> NifResult<Term<'a>> {
    let filter = term::filter_from_atom(filter).map_err(|msg| rustler::Error::Term(Box::new(msg)))?;
    with_tree(env, &tree, |t| {
        let id = t.descendant_cursor(cursor_id(cursor), filter)?;
        Ok(id.to_raw().encode(env))
    })
}

// ============================================================================
// Traversal
// ============================================================================

/// Advance a cursor; `{:ok, nil}` once its scope is exhausted
#[rustler::nif]
fn advance<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        Ok(match t.advance(cursor_id(cursor))? {
            Some(kind) => term::event_kind_atom(kind).encode(env),
            None => rustler::types::atom::nil().encode(env),
        })
    })
}

#[rustler::nif]
fn skip<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        t.skip_subtree(cursor_id(cursor))?;
        Ok(term::ok().encode(env))
    })
}

#[rustler::nif]
fn collect_text<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor, include_whitespace: bool) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        let text = t.collect_descendant_text(cursor_id(cursor), include_whitespace)?;
        Ok(str_to_binary(env, &text))
    })
}

// ============================================================================
// Current event
// ============================================================================

#[rustler::nif]
fn current_text<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| Ok(str_to_binary(env, t.current_text(cursor_id(cursor))?)))
}

#[rustler::nif]
fn local_name<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| Ok(str_to_binary(env, t.local_name(cursor_id(cursor))?)))
}

#[rustler::nif]
fn namespace_uri<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        Ok(term::optional_str(env, t.namespace_uri(cursor_id(cursor))?))
    })
}

/// Attributes of the current start element as `[{local, ns | nil, value}]`
#[rustler::nif]
fn attributes<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        let id = cursor_id(cursor);
        let count = t.attribute_count(id)?;
        let mut list = Term::list_new_empty(env);
        for index in (0..count).rev() {
            if let Some(attr) = t.attribute(id, index)? {
                list = list.list_prepend(term::attribute_to_term(env, &attr));
            }
        }
        Ok(list)
    })
}

#[rustler::nif]
fn attribute_value<'a>(
    env: Env<'a>,
    tree: CursorTreeRef,
    cursor: RawCursor,
    namespace: Option<&str>,
    local: &str,
) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        let value = t.attribute_value_by_name(cursor_id(cursor), namespace, local)?;
        Ok(term::optional_str(env, value))
    })
}

#[rustler::nif]
fn depth<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| Ok(t.depth(cursor_id(cursor))?.encode(env)))
}

/// `{line, column, offset}` of the current event
#[rustler::nif]
fn location<'a>(env: Env<'a>, tree: CursorTreeRef, cursor: RawCursor) -> NifResult<Term<'a>> {
    with_tree(env, &tree, |t| {
        Ok(term::location_to_term(env, t.location(cursor_id(cursor))?))
    })
}

rustler::init!("Elixir.RustyStax.Native");
