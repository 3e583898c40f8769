//! A small owned HTML tree.
//!
//! `scraper` (html5ever) does the parsing; the result is copied into plain
//! enums so the structural rewrites can move nodes around freely and the
//! output can be serialized deterministically.

use scraper::{ElementRef, Html, Node as DomNode};

use crate::error::RenderError;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is written out without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    /// Concatenated text of every descendant, like the DOM's `textContent`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Heading level for `h1`..`h6`.
    pub fn heading_level(&self) -> Option<u8> {
        match self.name.as_str() {
            "h1" => Some(1),
            "h2" => Some(2),
            "h3" => Some(3),
            "h4" => Some(4),
            "h5" => Some(5),
            "h6" => Some(6),
            _ => None,
        }
    }
}

impl Node {
    pub fn element(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(Element::new(name, children))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn heading_level(&self) -> Option<u8> {
        self.as_element().and_then(Element::heading_level)
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
            Node::Comment(_) => {}
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================
/// Parse an HTML body fragment into top-level nodes.
pub fn parse_fragment(html: &str) -> Result<Vec<Node>, RenderError> {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    if root.value().name() != "html" {
        return Err(RenderError::Structure(format!(
            "unexpected fragment root <{}>",
            root.value().name()
        )));
    }

    Ok(convert_children(root))
}

fn convert_children(element: ElementRef<'_>) -> Vec<Node> {
    let mut children = Vec::new();

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let value = child_element.value();
            // html5ever keeps attributes in a hash map; sort for stable output.
            let mut attrs: Vec<(String, String)> = value
                .attrs()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
            attrs.sort();

            children.push(Node::Element(Element {
                name: value.name().to_string(),
                attrs,
                children: convert_children(child_element),
            }));
            continue;
        }

        match child.value() {
            DomNode::Text(text) => children.push(Node::Text(String::from(&**text))),
            DomNode::Comment(comment) => children.push(Node::Comment(String::from(&**comment))),
            _ => {}
        }
    }

    children
}

// =============================================================================
// SERIALIZATION
// =============================================================================
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, false, &mut out);
    }
    out
}

fn write_node(node: &Node, raw_text: bool, out: &mut String) {
    match node {
        Node::Text(text) if raw_text => out.push_str(text),
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Element(element) => {
            out.push('<');
            out.push_str(&element.name);
            for (key, value) in &element.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&element.name.as_str()) {
                return;
            }

            let raw = RAW_TEXT_ELEMENTS.contains(&element.name.as_str());
            for child in &element.children {
                write_node(child, raw, out);
            }

            out.push_str("</");
            out.push_str(&element.name);
            out.push('>');
        }
    }
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
