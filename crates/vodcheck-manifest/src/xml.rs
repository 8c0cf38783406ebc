//! Minimal element tree built from quick-xml events.
//!
//! The XML manifests are small and their semantics depend on ancestry
//! (template inheritance, period boundaries), so they are read into a tree
//! once and walked afterwards.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ManifestError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    /// Local name, namespace prefix stripped.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Concatenated text and CDATA content.
    pub text: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants with the given name, depth-first in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut out = Vec::new();
        collect_named(self, name, &mut out);
        out
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

fn collect_named<'a>(element: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in &element.children {
        if child.name == name {
            out.push(child);
        }
        collect_named(child, name, out);
    }
}

fn start_element(url: &str, e: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ManifestError::xml(url, err))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ManifestError::xml(url, err))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Default::default()
    })
}

/// Parse a document and return its root element. `url` is only used in errors.
pub(crate) fn parse_document(url: &str, xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(start_element(url, &e)?),
            Ok(Event::Empty(e)) => {
                let element = start_element(url, &e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = root.or(Some(element)),
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ManifestError::xml(url, "unbalanced end tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = root.or(Some(element)),
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let text = t.unescape().map_err(|err| ManifestError::xml(url, err))?;
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ManifestError::xml(url, err)),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ManifestError::xml(url, "unexpected end of document"));
    }
    root.ok_or_else(|| ManifestError::xml(url, "document has no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_with_namespaces_and_text() {
        let doc = r#"<?xml version="1.0"?>
            <f4m:manifest xmlns:f4m="http://ns.adobe.com/f4m/1.0">
              <bootstrapInfo id="b0" profile="named"> AAAA </bootstrapInfo>
              <media url="v1-" bitrate="800" bootstrapInfoId="b0"/>
            </f4m:manifest>"#;
        let root = parse_document("http://h/m.f4m", doc).unwrap();
        assert_eq!(root.name, "manifest");
        assert_eq!(root.child("bootstrapInfo").unwrap().trimmed_text(), "AAAA");
        let media = root.child("media").unwrap();
        assert_eq!(media.attr("bitrate"), Some("800"));
        assert_eq!(media.attr("url"), Some("v1-"));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = "<a><b id='1'><b id='2'/></b><c><b id='3'/></c></a>";
        let root = parse_document("u", doc).unwrap();
        let ids: Vec<_> = root
            .descendants_named("b")
            .iter()
            .filter_map(|e| e.attr("id"))
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            parse_document("http://h/x.mpd", "<MPD><Period></MPD>"),
            Err(ManifestError::Xml { .. })
        ));
        assert!(parse_document("u", "").is_err());
    }
}
