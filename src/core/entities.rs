//! XML Entity Decoding and Declaration Lookup
//!
//! Handles:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - Numeric character references: &#123; &#x7B;
//! - XML 1.0 Char validation for decoded text
//! - The registry of declared general entities consulted mid-scan

use std::collections::HashMap;
use std::sync::Arc;

/// Replacement text of the five predefined entities
pub fn predefined_entity(name: &[u8]) -> Option<&'static str> {
    match name {
        b"lt" => Some("<"),
        b"gt" => Some(">"),
        b"amp" => Some("&"),
        b"quot" => Some("\""),
        b"apos" => Some("'"),
        _ => None,
    }
}

/// Decode the body of a character reference (the part between `&#` and `;`)
///
/// Returns None for malformed digits or code points outside the XML
/// 1.0 Char production.
pub fn decode_char_ref(body: &[u8]) -> Option<char> {
    if body.is_empty() {
        return None;
    }

    let codepoint = if body[0] == b'x' {
        // Hexadecimal: &#xHHHH;
        let hex = std::str::from_utf8(&body[1..]).ok()?;
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(hex, 16).ok()?
    } else {
        // Decimal: &#DDDD;
        if !body.iter().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let dec = std::str::from_utf8(body).ok()?;
        dec.parse::<u32>().ok()?
    };

    if !is_valid_xml_char(codepoint) {
        return None;
    }
    char::from_u32(codepoint)
}

/// Check if a code point is a valid XML 1.0 Char
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint,
        0x9 | 0xA | 0xD |
        0x20..=0xD7FF |
        0xE000..=0xFFFD |
        0x10000..=0x10FFFF
    )
}

/// Validate UTF-8 content for invalid XML characters
/// Returns Err if content contains characters not allowed in XML 1.0
pub fn validate_xml_content(content: &[u8]) -> Result<(), &'static str> {
    // ASCII fast path
    if content.iter().all(|&b| (0x20..0x7F).contains(&b) || matches!(b, 0x09 | 0x0A | 0x0D)) {
        return Ok(());
    }

    let text = std::str::from_utf8(content).map_err(|_| "Invalid UTF-8 encoding")?;
    for c in text.chars() {
        if !is_valid_xml_char(c as u32) {
            return Err(if (c as u32) < 0x20 {
                "Invalid XML character: control character not allowed"
            } else {
                "Invalid XML character"
            });
        }
    }
    Ok(())
}

// =============================================================================
// Entity Declarations
// =============================================================================

/// A general entity declared in the DTD (or registered by the application)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDeclaration {
    pub name: Arc<str>,
    /// Replacement text for internal entities
    pub replacement: Option<String>,
    pub system_id: Option<String>,
    pub public_id: Option<String>,
    /// Notation name for unparsed entities (NDATA)
    pub notation: Option<String>,
}

impl EntityDeclaration {
    /// Internal entity with literal replacement text
    pub fn internal(name: &str, replacement: impl Into<String>) -> Self {
        EntityDeclaration {
            name: Arc::from(name),
            replacement: Some(replacement.into()),
            system_id: None,
            public_id: None,
            notation: None,
        }
    }

    /// External entity identified by a system id
    pub fn external(name: &str, system_id: impl Into<String>, public_id: Option<String>) -> Self {
        EntityDeclaration {
            name: Arc::from(name),
            replacement: None,
            system_id: Some(system_id.into()),
            public_id,
            notation: None,
        }
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.replacement.is_none()
    }

    /// Unparsed entities (NDATA) may not be referenced from content
    #[inline]
    pub fn is_parsed(&self) -> bool {
        self.notation.is_none()
    }
}

/// Registry mapping entity names to their declarations
#[derive(Debug, Default, Clone)]
pub struct EntityRegistry {
    entities: HashMap<Arc<str>, Arc<EntityDeclaration>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration. First declaration wins, as in XML 1.0; returns
    /// false if the name was already declared.
    pub fn declare(&mut self, decl: EntityDeclaration) -> bool {
        if self.entities.contains_key(&decl.name) {
            log::debug!(target: "rustystax::entities", "ignoring redeclaration of entity '{}'", decl.name);
            return false;
        }
        self.entities.insert(decl.name.clone(), Arc::new(decl));
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<EntityDeclaration>> {
        self.entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDeclaration>> {
        self.entities.values()
    }
}
