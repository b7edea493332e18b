//! A small owned XML element tree built on `quick-xml`.
//!
//! Legacy Bugzilla `ctype=xml` pages and SOAP envelopes are small, so we
//! read them into a tree once and then look fields up by local name,
//! ignoring namespace prefixes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("unbalanced end tag </{0}>")]
    Unbalanced(String),
    #[error("document has no root element")]
    Empty,
}

/// One element: its local name, attributes, direct text, and children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenation of the element's own text and CDATA nodes (not its
    /// children's).
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlNode, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(node_from_start(&e)),
                Event::Empty(e) => {
                    let node = node_from_start(&e);
                    attach(&mut stack, &mut root, node);
                }
                Event::End(e) => {
                    let node = stack.pop().ok_or_else(|| {
                        XmlError::Unbalanced(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
                    })?;
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        match t.unescape() {
                            Ok(s) => top.text.push_str(&s),
                            Err(_) => top.text.push_str(&String::from_utf8_lossy(&t)),
                        }
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or(XmlError::Empty)
    }

    /// First direct child with this local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First element with this local name anywhere below this one, in
    /// document order.
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Follow a path of direct children, e.g. `["project", "name"]`.
    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the element carries any text of its own.
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

fn node_from_start(e: &BytesStart<'_>) -> XmlNode {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let attributes = e
        .attributes()
        .flatten()
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            (key, value)
        })
        .collect();
    XmlNode {
        name,
        attributes,
        ..Default::default()
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE bugzilla SYSTEM "bugzilla.dtd">
<bugzilla version="5.0">
  <bug>
    <short_desc>Crash &amp; burn</short_desc>
    <assigned_to name="Jane Doe">jane@example.org</assigned_to>
    <empty/>
  </bug>
</bugzilla>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.name, "bugzilla");
        assert_eq!(root.attr("version"), Some("5.0"));

        let bug = root.child("bug").unwrap();
        assert_eq!(bug.child("short_desc").unwrap().text(), "Crash & burn");
        let assignee = bug.child("assigned_to").unwrap();
        assert_eq!(assignee.attr("name"), Some("Jane Doe"));
        assert_eq!(assignee.text(), "jane@example.org");
        assert!(!bug.child("empty").unwrap().has_text());
    }

    #[test]
    fn namespace_prefixes_are_dropped() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
<soap:Body><ns1:resp xmlns:ns1="urn:x"><return><project><name>core</name></project></return></ns1:resp></soap:Body>
</soap:Envelope>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.name, "Envelope");
        let ret = root.descendant("return").unwrap();
        assert_eq!(ret.path(&["project", "name"]).unwrap().text(), "core");
    }

    #[test]
    fn cdata_is_kept_as_text() {
        let root = XmlNode::parse("<a><![CDATA[x < y]]></a>").unwrap();
        assert_eq!(root.text(), "x < y");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(XmlNode::parse("").is_err());
        assert!(XmlNode::parse("not xml at all").is_err());
    }
}
