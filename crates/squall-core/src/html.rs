//! HTML values produced by `text/html` routes
//!
//! A handler returns either a pre-rendered string or a node tree. Trees are
//! turned into strings by the server's [`Renderer`], which defaults to
//! [`render_to_string`].

use std::fmt::Write;
use std::sync::Arc;

/// Renders a node tree to markup
pub type Renderer = Arc<dyn Fn(&Node) -> String + Send + Sync>;

/// Default renderer
pub fn default_renderer() -> Renderer {
    Arc::new(render_to_string)
}

/// Elements that never have children or a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// HTML value
#[derive(Debug, Clone, PartialEq)]
pub enum Html {
    /// Already rendered markup, sent as is
    Raw(String),
    /// Tree rendered by the server's renderer
    Node(Node),
}

impl From<String> for Html {
    fn from(s: String) -> Self {
        Html::Raw(s)
    }
}

impl From<&str> for Html {
    fn from(s: &str) -> Self {
        Html::Raw(s.to_string())
    }
}

impl From<Node> for Html {
    fn from(node: Node) -> Self {
        Html::Node(node)
    }
}

/// Markup tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
    Text(String),
}

impl Node {
    pub fn element(tag: impl Into<String>) -> Self {
        Node::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    /// Add an attribute; no-op on text nodes
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Node::Element { ref mut attrs, .. } = self {
            attrs.push((name.into(), value.into()));
        }
        self
    }

    /// Append a child; no-op on text nodes
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        if let Node::Element {
            ref mut children, ..
        } = self
        {
            children.push(node.into());
        }
        self
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s)
    }
}

/// Render a tree to markup, escaping text and attribute values
pub fn render_to_string(node: &Node) -> String {
    let mut out = String::new();
    render_into(node, &mut out);
    out
}

fn render_into(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => escape_into(text, out),
        Node::Element {
            tag,
            attrs,
            children,
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                let _ = write!(out, " {}=\"", name);
                escape_into(value, out);
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in children {
                render_into(child, out);
            }
            let _ = write!(out, "</{}>", tag);
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
