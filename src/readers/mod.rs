//! # Specification Readers
//!
//! The four input specifications are hierarchical XML documents. A small DOM
//! ([`SpecNode`]) is built with `quick-xml` and shared by the per-kind
//! readers:
//!
//! - [`gti`]: protocols, strategies, places, enumerations;
//! - [`analysis`]: analysis groups with modules, analyses and operations;
//! - [`api`]: API groups with calls, arguments and mapping sections;
//! - [`layout`]: levels, connections, placements, merges.
//!
//! Documents are classified by their root element name so the driver can
//! accept API and analysis specifications in any order on the command line.

pub mod analysis;
pub mod api;
pub mod gti;
pub mod layout;

use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{Result, WeaverError};

/// The kind of a specification document, determined by its root element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecKind {
    Layout,
    Gti,
    Api,
    Analysis,
}

impl SpecKind {
    pub fn from_root_name(name: &str) -> Option<SpecKind> {
        match name {
            "layout-specification" => Some(SpecKind::Layout),
            "gti-specification" => Some(SpecKind::Gti),
            "api-specification" => Some(SpecKind::Api),
            "analysis-specification" => Some(SpecKind::Analysis),
            _ => None,
        }
    }
}

/// One node of a parsed specification document
#[derive(Debug, Clone, Default)]
pub struct SpecNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<SpecNode>,
    pub text: String,
}

impl SpecNode {
    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute that must be present
    pub fn required_attr(&self, name: &str, file: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            WeaverError::parse(
                file,
                format!("element <{}> misses attribute '{}'", self.name, name),
            )
        })
    }

    /// Boolean attribute; absent means false
    pub fn bool_attr(&self, name: &str) -> bool {
        matches!(self.attr(name), Some("yes") | Some("true") | Some("1"))
    }

    /// First child element of a given name
    pub fn child(&self, name: &str) -> Option<&SpecNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements of a given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SpecNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of a child element, trimmed; empty if absent
    pub fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.text.trim().to_string()).unwrap_or_default()
    }
}

/// Parse a document into its root node.
pub fn parse_document(input: &str, file: &str) -> Result<SpecNode> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<SpecNode> = Vec::new();
    let mut root: Option<SpecNode> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let node = node_from_start(&e, file)?;
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = node_from_start(&e, file)?;
                attach(&mut stack, &mut root, node, file)?;
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| {
                    WeaverError::parse(file, "unbalanced end tag".to_string())
                })?;
                attach(&mut stack, &mut root, node, file)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| WeaverError::parse(file, err.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(WeaverError::parse(file, err.to_string())),
        }
        buf.clear();
    }

    root.ok_or_else(|| WeaverError::parse(file, "document has no root element".to_string()))
}

fn node_from_start(
    e: &quick_xml::events::BytesStart<'_>,
    file: &str,
) -> Result<SpecNode> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| WeaverError::parse(file, err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| WeaverError::parse(file, err.to_string()))?
            .to_string();
        attributes.push((key, value));
    }
    Ok(SpecNode {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut Vec<SpecNode>,
    root: &mut Option<SpecNode>,
    node: SpecNode,
    file: &str,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_some() {
                return Err(WeaverError::parse(
                    file,
                    "document has more than one root element".to_string(),
                ));
            }
            *root = Some(node);
        }
    }
    Ok(())
}

/// Read and parse a specification file
pub fn parse_file(path: &Path) -> Result<SpecNode> {
    let label = path.display().to_string();
    let input = fs::read_to_string(path)
        .map_err(|err| WeaverError::parse(&label, err.to_string()))?;
    parse_document(&input, &label)
}

/// Determine the kind of a specification file from its root element
pub fn sniff_kind(path: &Path) -> Result<SpecKind> {
    let root = parse_file(path)?;
    SpecKind::from_root_name(&root.name).ok_or_else(|| {
        WeaverError::parse(
            path.display().to_string(),
            format!("unknown specification root <{}>", root.name),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_elements_and_attributes() {
        let root = parse_document(
            r#"<a x="1"><b y="2">text</b><b y="3"/></a>"#,
            "test",
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.children_named("b").count(), 2);
        assert_eq!(root.child("b").unwrap().text, "text");
    }

    #[test]
    fn unbalanced_document_is_a_parse_error() {
        assert!(parse_document("<a><b></a>", "test").is_err());
    }

    #[test]
    fn root_names_classify_documents() {
        assert_eq!(
            SpecKind::from_root_name("api-specification"),
            Some(SpecKind::Api)
        );
        assert_eq!(SpecKind::from_root_name("unknown"), None);
    }
}
