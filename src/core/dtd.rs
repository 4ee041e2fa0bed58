//! DOCTYPE Internal Subset Scanning
//!
//! Only general entity declarations are collected; element, attribute
//! list and notation declarations are recognized and stepped over, as
//! are comments, PIs and parameter entity declarations.

use super::entities::{decode_char_ref, EntityDeclaration, EntityRegistry};
use super::scanner::{is_name_char, is_whitespace};
use std::collections::{HashMap, HashSet};

/// Scan `subset` and declare every general entity into `registry`.
/// Returns the number of newly declared entities.
pub fn parse_internal_subset(subset: &str, registry: &mut EntityRegistry) -> Result<usize, String> {
    let bytes = subset.as_bytes();
    let mut pos = 0;
    let mut declared = 0;
    let mut references: HashMap<String, Vec<String>> = HashMap::new();

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if is_whitespace(rest[0]) {
            pos += 1;
        } else if rest.starts_with(b"<!--") {
            pos += find(rest, b"-->").ok_or("unterminated comment in DOCTYPE")? + 3;
        } else if rest.starts_with(b"<?") {
            pos += find(rest, b"?>").ok_or("unterminated processing instruction in DOCTYPE")? + 2;
        } else if rest.starts_with(b"<!ENTITY") {
            let len = declaration_len(rest)?;
            if let Some(decl) = parse_entity_decl(&rest[8..len - 1])? {
                let name = decl.name.to_string();
                let refs = decl
                    .replacement
                    .as_deref()
                    .map(|v| extract_entity_references(v.as_bytes()))
                    .unwrap_or_default();
                if registry.declare(decl) {
                    declared += 1;
                    references.insert(name, refs);
                }
            }
            pos += len;
        } else if rest.starts_with(b"<!") {
            pos += declaration_len(rest)?;
        } else if rest[0] == b'%' {
            // Parameter entity reference at declaration level
            pos += rest.iter().position(|&b| b == b';').ok_or("unterminated parameter entity reference")? + 1;
        } else {
            return Err(format!("unexpected character '{}' in DOCTYPE internal subset", rest[0] as char));
        }
    }

    check_entity_recursion(&references)?;
    log::trace!(target: "rustystax::dtd", "declared {} general entities", declared);
    Ok(declared)
}

/// Length of a `<!...>` markup declaration, honoring quoted literals
fn declaration_len(input: &[u8]) -> Result<usize, String> {
    let mut quote = None;
    for (i, &b) in input.iter().enumerate().skip(2) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Ok(i + 1),
            None => {}
        }
    }
    Err("unterminated markup declaration in DOCTYPE".to_string())
}

/// Parse the body of `<!ENTITY ...>`. Returns None for parameter entities.
fn parse_entity_decl(body: &[u8]) -> Result<Option<EntityDeclaration>, String> {
    let mut p = Cursor { input: body, pos: 0 };
    if p.skip_ws() == 0 {
        return Err("missing whitespace after <!ENTITY".to_string());
    }

    let parameter = p.peek() == Some(b'%');
    if parameter {
        p.pos += 1;
        p.skip_ws();
    }

    let name = p.name().ok_or("missing entity name")?;
    if p.skip_ws() == 0 {
        return Err(format!("missing whitespace after entity name '{}'", name));
    }

    let decl = match p.peek() {
        Some(b'"') | Some(b'\'') => {
            let literal = p.quoted()?;
            EntityDeclaration::internal(&name, expand_char_refs(literal)?)
        }
        _ => {
            let (public_id, system_id) = p.external_id()?;
            let mut decl = EntityDeclaration::external(&name, system_id, public_id);
            let had_ws = p.skip_ws() > 0;
            if p.rest().starts_with(b"NDATA") {
                if parameter {
                    return Err("parameter entity cannot be unparsed".to_string());
                }
                if !had_ws {
                    return Err("missing whitespace before NDATA".to_string());
                }
                p.pos += 5;
                p.skip_ws();
                decl.notation = Some(p.name().ok_or("missing notation name after NDATA")?);
            }
            decl
        }
    };

    p.skip_ws();
    if p.pos != body.len() {
        return Err(format!("unexpected content in declaration of entity '{}'", name));
    }
    Ok(if parameter { None } else { Some(decl) })
}

/// Character references in entity literals are replaced at declaration
/// time; general entity references are kept for expansion on use.
fn expand_char_refs(literal: &[u8]) -> Result<String, String> {
    let mut out = Vec::with_capacity(literal.len());
    let mut pos = 0;
    while pos < literal.len() {
        if literal[pos..].starts_with(b"&#") {
            let semi = literal[pos..]
                .iter()
                .position(|&b| b == b';')
                .ok_or("unterminated character reference in entity value")?;
            let c = decode_char_ref(&literal[pos + 2..pos + semi])
                .ok_or("invalid character reference in entity value")?;
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            pos += semi + 1;
        } else {
            out.push(literal[pos]);
            pos += 1;
        }
    }
    String::from_utf8(out).map_err(|_| "invalid UTF-8 in entity value".to_string())
}

/// Parse entity value and extract entity references
pub fn extract_entity_references(value: &[u8]) -> Vec<String> {
    let mut refs = Vec::new();
    let mut pos = 0;

    while pos < value.len() {
        if value[pos] == b'&' && pos + 1 < value.len() && value[pos + 1] != b'#' {
            // Entity reference (not character reference)
            pos += 1;
            let start = pos;
            while pos < value.len() && value[pos] != b';' {
                pos += 1;
            }
            if pos < value.len() {
                refs.push(String::from_utf8_lossy(&value[start..pos]).into_owned());
            }
        }
        pos += 1;
    }

    refs
}

/// Check for circular entity references
fn check_entity_recursion(references: &HashMap<String, Vec<String>>) -> Result<(), String> {
    for name in references.keys() {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = references[name].iter().map(String::as_str).collect();

        while let Some(current) = stack.pop() {
            if current == name.as_str() {
                return Err(format!("entity '{}' references itself (directly or indirectly)", name));
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(refs) = references.get(current) {
                stack.extend(refs.iter().map(String::as_str));
            }
        }
    }
    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, needle)
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn name(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.input[start..self.pos]).ok().map(str::to_string)
    }

    fn quoted(&mut self) -> Result<&'a [u8], String> {
        let q = self.peek().filter(|&b| b == b'"' || b == b'\'').ok_or("expected quoted literal")?;
        let body = &self.input[self.pos + 1..];
        let len = body.iter().position(|&b| b == q).ok_or("unterminated literal")?;
        self.pos += len + 2;
        Ok(&body[..len])
    }

    fn quoted_string(&mut self) -> Result<String, String> {
        let raw = self.quoted()?;
        String::from_utf8(raw.to_vec()).map_err(|_| "invalid UTF-8 in literal".to_string())
    }

    /// `SYSTEM "sys"` or `PUBLIC "pub" "sys"`
    fn external_id(&mut self) -> Result<(Option<String>, String), String> {
        if self.rest().starts_with(b"SYSTEM") {
            self.pos += 6;
            self.skip_ws();
            Ok((None, self.quoted_string()?))
        } else if self.rest().starts_with(b"PUBLIC") {
            self.pos += 6;
            self.skip_ws();
            let public_id = self.quoted_string()?;
            if self.skip_ws() == 0 {
                return Err("missing whitespace between public and system identifier".to_string());
            }
            Ok((Some(public_id), self.quoted_string()?))
        } else {
            Err("expected entity value or external identifier".to_string())
        }
    }
}
