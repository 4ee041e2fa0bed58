//! End-to-end traversal properties over the public API

use rustystax::core::attributes::AttributeCollector;
use rustystax::core::namespace::NamespaceContext;
use rustystax::{open_reader_with, open_str, CursorId, CursorTree, EventKind, Filter, ReaderConfig, StreamReader, XmlError};
use std::io::{self, Read};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Ev {
    Start(String, Vec<(String, String)>),
    End(String),
    Text(String),
    Comment(String),
    Pi(String, String),
}

/// Every event the reader produces between StartDocument and EndDocument
fn read_all(mut reader: StreamReader) -> Result<Vec<Ev>, XmlError> {
    let mut out = Vec::new();
    loop {
        let ev = match reader.next()? {
            EventKind::EndDocument => return Ok(out),
            EventKind::StartElement => {
                let attrs = reader
                    .attributes()?
                    .iter()?
                    .map(|a| (a.name.local_name().to_string(), a.value.to_string()))
                    .collect();
                Ev::Start(reader.local_name().unwrap_or_default().to_string(), attrs)
            }
            EventKind::EndElement => Ev::End(reader.local_name().unwrap_or_default().to_string()),
            EventKind::Characters | EventKind::CData | EventKind::Space => Ev::Text(reader.text()?.to_string()),
            EventKind::Comment => Ev::Comment(reader.text()?.to_string()),
            EventKind::ProcessingInstruction => Ev::Pi(
                reader.pi_target().unwrap_or_default().to_string(),
                reader.pi_data().unwrap_or_default().to_string(),
            ),
            _ => continue,
        };
        out.push(ev);
    }
}

/// Adjacent text events merged, as a re-tokenized document would see them
fn merge_text(events: Vec<Ev>) -> Vec<Ev> {
    let mut out: Vec<Ev> = Vec::new();
    for ev in events {
        match (out.last_mut(), ev) {
            (Some(Ev::Text(prev)), Ev::Text(next)) => prev.push_str(&next),
            (_, ev) => out.push(ev),
        }
    }
    out
}

fn escape(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn serialize(events: &[Ev]) -> String {
    let mut out = String::new();
    for ev in events {
        match ev {
            Ev::Start(name, attrs) => {
                out.push('<');
                out.push_str(name);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    escape(v, &mut out);
                    out.push('"');
                }
                out.push('>');
            }
            Ev::End(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            Ev::Text(text) => escape(text, &mut out),
            Ev::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Ev::Pi(target, data) => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
        }
    }
    out
}

/// Depth-first walk opening a nested child cursor on every element
fn walk(tree: &mut CursorTree, id: CursorId, out: &mut Vec<Ev>, scopes: &mut usize) {
    while let Some(kind) = tree.advance(id).unwrap() {
        match kind {
            EventKind::StartElement => {
                let name = tree.local_name(id).unwrap().to_string();
                out.push(Ev::Start(name.clone(), Vec::new()));
                let child = tree.child_cursor(id, None).unwrap();
                walk(tree, child, out, scopes);
                assert!(tree.is_closed(child));
                *scopes += 1;
                out.push(Ev::End(name));
            }
            EventKind::EndElement => panic!("nested cursor surfaced an end tag"),
            EventKind::Characters | EventKind::CData | EventKind::Space => {
                out.push(Ev::Text(tree.current_text(id).unwrap().to_string()))
            }
            _ => {}
        }
    }
}

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- catalog -->
<catalog xmlns:x="urn:x" updated="2024">
  <book id="b1" x:lang="en">
    <title>Rust &amp; XML</title>
    <price cur="EUR">12.50</price>
  </book>
  <?index book=b1?>
  <book id="b2"><title><![CDATA[<raw>]]></title><empty/></book>
  text &lt;tail&gt;
</catalog>
"#;

#[test]
fn nested_walk_reconstructs_document_order() {
    let expected: Vec<Ev> = read_all(open_str(DOCUMENT))
        .unwrap()
        .into_iter()
        .filter_map(|ev| match ev {
            Ev::Start(name, _) => Some(Ev::Start(name, Vec::new())),
            Ev::End(_) | Ev::Text(_) => Some(ev),
            _ => None,
        })
        .collect();

    let mut tree = CursorTree::new(open_str(DOCUMENT));
    let root = tree.root_cursor(None).unwrap();
    let mut seen = Vec::new();
    let mut scopes = 0;
    walk(&mut tree, root, &mut seen, &mut scopes);

    assert_eq!(seen, expected);
    let starts = seen.iter().filter(|e| matches!(e, Ev::Start(..))).count();
    let ends = seen.iter().filter(|e| matches!(e, Ev::End(..))).count();
    assert_eq!(starts, ends);
    assert_eq!(scopes, starts);
    // Only the closed root is left
    assert_eq!(tree.live_cursors(), 1);
}

#[test]
fn reserialized_document_reads_back_identically() {
    let first = merge_text(read_all(open_str(DOCUMENT)).unwrap());
    let xml = serialize(&first);
    let second = merge_text(read_all(open_str(&xml)).unwrap());
    assert_eq!(first, second);
}

#[test]
fn element_cursor_scenario() {
    let input = r#"<root><a x="1" y="2"/>text<b/></root>"#;

    let mut tree = CursorTree::new(open_str(input));
    let root = tree.root_element_cursor().unwrap();
    assert_eq!(tree.advance(root).unwrap(), Some(EventKind::StartElement));
    let kids = tree.child_element_cursor(root).unwrap();
    assert_eq!(tree.advance(kids).unwrap(), Some(EventKind::StartElement));
    assert_eq!(tree.local_name(kids).unwrap(), "a");
    assert_eq!(tree.attribute_value_by_name(kids, None, "x").unwrap(), Some("1"));
    assert_eq!(tree.attribute_value_by_name(kids, None, "y").unwrap(), Some("2"));
    assert_eq!(tree.advance(kids).unwrap(), Some(EventKind::StartElement));
    assert_eq!(tree.local_name(kids).unwrap(), "b");
    assert_eq!(tree.advance(kids).unwrap(), None);

    let mut tree = CursorTree::new(open_str(input));
    let root = tree.root_element_cursor().unwrap();
    tree.advance(root).unwrap();
    let inner = tree.child_cursor(root, None).unwrap();
    tree.advance(inner).unwrap();
    // The nested child still holds the reader
    let below = tree.descendant_cursor(root, Some(Filter::elements()));
    assert!(below.unwrap_err().is_misuse());
    tree.skip_subtree(inner).unwrap();
    assert_eq!(tree.advance(root).unwrap(), None);

    let mut tree = CursorTree::new(open_str(input));
    let root = tree.root_element_cursor().unwrap();
    tree.advance(root).unwrap();
    let flat = tree.descendant_element_cursor(root).unwrap();
    let mut names = Vec::new();
    while let Some(kind) = tree.advance(flat).unwrap() {
        names.push((kind, tree.local_name(flat).unwrap().to_string()));
    }
    assert_eq!(
        names,
        vec![
            (EventKind::StartElement, "a".to_string()),
            (EventKind::EndElement, "a".to_string()),
            (EventKind::StartElement, "b".to_string()),
            (EventKind::EndElement, "b".to_string()),
        ]
    );
}

#[test]
fn duplicate_attribute_is_rejected() {
    let mut reader = open_str(r#"<e a="1" a="2"/>"#);
    assert!(matches!(reader.next(), Err(XmlError::DuplicateAttribute { .. })));
    assert!(matches!(reader.next(), Err(XmlError::Aborted)));

    let mut collector = AttributeCollector::new();
    collector.begin_element();
    collector.add_raw(None, Arc::from("a")).push_str("1");
    collector.add_raw(None, Arc::from("a")).push_str("2");
    let err = collector.resolve(&NamespaceContext::new()).unwrap_err();
    assert!(matches!(err, XmlError::DuplicateAttribute { .. }));
    assert!(!err.is_misuse());
}

#[test]
fn namespace_scope_ends_with_element() {
    let mut reader = open_str(r#"<p:e xmlns:p="urn:x"><p:c/></p:e>"#);
    assert_eq!(reader.next().unwrap(), EventKind::StartElement);
    assert_eq!(reader.next().unwrap(), EventKind::StartElement);
    assert_eq!(reader.local_name(), Some("c"));
    assert_eq!(reader.namespace_uri(), Some("urn:x"));
    assert_eq!(reader.namespace_context().resolve_prefix("p").map(|u| &**u), Some("urn:x"));

    assert_eq!(reader.next().unwrap(), EventKind::EndElement);
    assert_eq!(reader.next().unwrap(), EventKind::EndElement);
    assert_eq!(reader.next().unwrap(), EventKind::EndDocument);
    assert!(reader.namespace_context().resolve_prefix("p").is_none());
}

#[test]
fn closed_cursor_keeps_reporting_end() {
    let mut tree = CursorTree::new(open_str("<r><a/></r>"));
    let root = tree.root_element_cursor().unwrap();
    tree.advance(root).unwrap();
    let kids = tree.child_element_cursor(root).unwrap();
    while tree.advance(kids).unwrap().is_some() {}
    for _ in 0..5 {
        assert_eq!(tree.advance(kids).unwrap(), None);
        assert!(tree.is_closed(kids));
    }
    assert_eq!(tree.advance(root).unwrap(), None);
    assert_eq!(tree.advance(root).unwrap(), None);
}

#[test]
fn skipping_children_matches_plain_traversal() {
    let plain: Vec<String> = {
        let mut tree = CursorTree::new(open_str(DOCUMENT));
        let root = tree.root_element_cursor().unwrap();
        tree.advance(root).unwrap();
        let kids = tree.child_cursor(root, Some(Filter::non_whitespace())).unwrap();
        let mut out = Vec::new();
        while let Some(kind) = tree.advance(kids).unwrap() {
            out.push(format!("{:?}", kind));
        }
        out
    };

    let mut tree = CursorTree::new(open_str(DOCUMENT));
    let root = tree.root_element_cursor().unwrap();
    tree.advance(root).unwrap();
    let kids = tree.child_cursor(root, Some(Filter::non_whitespace())).unwrap();
    let mut skipped = Vec::new();
    while let Some(kind) = tree.advance(kids).unwrap() {
        skipped.push(format!("{:?}", kind));
        if kind == EventKind::StartElement {
            let child = tree.child_cursor(kids, None).unwrap();
            tree.skip_subtree(child).unwrap();
        }
    }
    assert_eq!(skipped, plain);
}

/// Hands out one byte per read
struct Trickle<'a>(&'a [u8]);

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match (self.0.split_first(), buf.first_mut()) {
            (Some((&b, rest)), Some(slot)) => {
                *slot = b;
                self.0 = rest;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[test]
fn reader_source_matches_in_memory_source() {
    static INPUT: &str = DOCUMENT;
    let config = ReaderConfig::new().buffer_size(64);
    let trickled = read_all(open_reader_with(Trickle(INPUT.as_bytes()), config)).unwrap();
    let in_memory = read_all(open_str(INPUT)).unwrap();
    assert_eq!(trickled, in_memory);
}

#[test]
fn malformed_input_fails_fast() {
    let mut tree = CursorTree::new(open_str("<r><a></b></r>"));
    let root = tree.root_flattening_cursor(None).unwrap();
    assert_eq!(tree.advance(root).unwrap(), Some(EventKind::StartElement));
    assert_eq!(tree.advance(root).unwrap(), Some(EventKind::StartElement));
    let err = tree.advance(root).unwrap_err();
    assert!(matches!(err, XmlError::Malformed { .. }));
    assert!(!err.is_misuse());
    assert!(matches!(tree.advance(root), Err(XmlError::Aborted)));
}

#[test]
fn mixed_cursor_over_byte_input() {
    let mut input = vec![0xEF, 0xBB, 0xBF];
    input.extend_from_slice(b"<p>one <!-- skip --><b>two</b><?pi?> three</p>");
    let mut tree = CursorTree::new(rustystax::open_bytes(input));
    let root = tree.root_element_cursor().unwrap();
    tree.advance(root).unwrap();
    let mixed = tree.child_mixed_cursor(root).unwrap();
    let mut kinds = Vec::new();
    while let Some(kind) = tree.advance(mixed).unwrap() {
        kinds.push(kind);
    }
    assert_eq!(
        kinds,
        vec![EventKind::Characters, EventKind::StartElement, EventKind::Characters]
    );
    assert_eq!(tree.advance(root).unwrap(), None);
    let reader = tree.into_reader();
    assert_eq!(reader.event_kind(), EventKind::EndDocument);
}
