//! Structural clean-up of the converted report body.
//!
//! Model output is only loosely Markdown. These passes work on the owned
//! [`Node`] tree and know nothing about Markdown:
//!
//! - [`reconstruct_lists`]: paragraphs that are really bullet or numbered
//!   lists become `ul`/`ol`
//! - [`wrap_sections`]: each heading and the content it governs go into a
//!   `section`, nested by heading level
//! - [`assign_heading_ids`] / [`outline`]: anchors for the page navigation

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::tree::{Element, Node};

static BULLET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-•]\s").expect("valid bullet regex"));
static ORDINAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+\.\s").expect("valid ordinal regex"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-•]|\d+\.)\s+").expect("valid marker regex"));

// =============================================================================
// LIST RECONSTRUCTION
// =============================================================================
/// Replace list-like paragraphs with real lists, anywhere in the tree.
///
/// A paragraph qualifies when any of its text lines starts with a bullet
/// (`-`, `•`) or an ordinal (`1.`). The list is `ul` when the first marked
/// line is a bullet, `ol` otherwise. Only marked lines become items; other
/// lines of the paragraph are dropped, and inline markup is flattened to
/// text.
pub fn reconstruct_lists(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(element) if element.name == "p" => paragraph_to_list(element),
            Node::Element(mut element) => {
                element.children = reconstruct_lists(element.children);
                Node::Element(element)
            }
            other => other,
        })
        .collect()
}

fn paragraph_to_list(paragraph: Element) -> Node {
    let text = paragraph.text();
    let marked: Vec<&str> = text
        .trim()
        .split('\n')
        .filter(|line| BULLET_LINE.is_match(line) || ORDINAL_LINE.is_match(line))
        .collect();

    let Some(first) = marked.first() else {
        return Node::Element(paragraph);
    };

    let list_name = if BULLET_LINE.is_match(first) { "ul" } else { "ol" };
    let items = marked
        .iter()
        .map(|line| {
            let item = LIST_MARKER.replace(line, "");
            Node::element("li", vec![Node::text(item.trim())])
        })
        .collect();

    Node::element(list_name, items)
}

// =============================================================================
// SECTION WRAPPING
// =============================================================================
/// Wrap every heading and its content in a `section`.
///
/// A section runs from its heading up to (not including) the next sibling
/// heading of the same or a shallower level. Deeper headings inside that
/// range become nested sections. Content before the first heading is left
/// as is. Non-heading elements are processed recursively, so headings
/// inside e.g. a `blockquote` get sections within it.
pub fn wrap_sections(nodes: Vec<Node>) -> Vec<Node> {
    let mut wrapped = Vec::new();
    let mut iter = nodes.into_iter().peekable();

    while let Some(node) = iter.next() {
        let Some(level) = node.heading_level() else {
            wrapped.push(descend(node));
            continue;
        };

        let mut body = Vec::new();
        while let Some(next) = iter.next_if(|n| !closes_section(n, level)) {
            body.push(next);
        }

        let mut children = vec![node];
        children.extend(wrap_sections(body));
        wrapped.push(Node::element("section", children));
    }

    wrapped
}

fn closes_section(node: &Node, level: u8) -> bool {
    node.heading_level().is_some_and(|next| next <= level)
}

fn descend(node: Node) -> Node {
    match node {
        Node::Element(mut element) => {
            element.children = wrap_sections(element.children);
            Node::Element(element)
        }
        other => other,
    }
}

// =============================================================================
// HEADING ANCHORS
// =============================================================================
/// Give every heading without an `id` a slug of its text. Repeated slugs get
/// `-1`, `-2`, ... suffixes in document order.
pub fn assign_heading_ids(nodes: &mut [Node]) {
    let mut seen = HashMap::new();
    assign_ids(nodes, &mut seen);
}

fn assign_ids(nodes: &mut [Node], seen: &mut HashMap<String, usize>) {
    for node in nodes {
        let Node::Element(element) = node else {
            continue;
        };

        if element.heading_level().is_some() && element.attr("id").is_none() {
            let base = slugify(&element.text());
            let count = seen.entry(base.clone()).or_insert(0);
            let id = match *count {
                0 => base,
                n => format!("{base}-{n}"),
            };
            *count += 1;
            element.set_attr("id", id);
        }

        assign_ids(&mut element.children, seen);
    }
}

fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug.to_string()
    }
}

/// One navigation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub level: u8,
    pub id: String,
    pub title: String,
}

/// Headings up to `max_level` that have an `id`, in document order.
pub fn outline(nodes: &[Node], max_level: u8) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    collect_outline(nodes, max_level, &mut entries);
    entries
}

fn collect_outline(nodes: &[Node], max_level: u8, entries: &mut Vec<OutlineEntry>) {
    for element in nodes.iter().filter_map(Node::as_element) {
        match (element.heading_level(), element.attr("id")) {
            (Some(level), Some(id)) if level <= max_level => entries.push(OutlineEntry {
                level,
                id: id.to_string(),
                title: element.text().trim().to_string(),
            }),
            _ => collect_outline(&element.children, max_level, entries),
        }
    }
}
