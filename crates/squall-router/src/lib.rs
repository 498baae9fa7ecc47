//! squall-router: Zero-dependency path-pattern trie
//!
//! Maps mount patterns to numeric ids. Methods are not part of the key:
//! a mount owns every method, and method/media selection happens later
//! against the mounted route set.
//!
//! ## Path Syntax
//! - `[name]` or `:name` - Named slot (captures one segment)
//! - `[...name]`, `*name` or `*` - Catch-all (captures one or more segments)
//! - `[[...name]]` - Optional catch-all (captures zero or more segments)
//!
//! ## Priority
//! 1. Exact static match (highest)
//! 2. Slot match
//! 3. Catch-all match (lowest)
//!
//! ## Example
//! ```
//! use squall_router::Router;
//!
//! let mut router = Router::new();
//! router.insert("/users", 0);
//! router.insert("/users/[id]", 1);
//! router.insert("/files/[...path]", 2);
//!
//! let m = router.find("/users/123").unwrap();
//! assert_eq!(m.id, 1);
//! assert_eq!(m.slots, vec![("id".to_string(), "123".to_string())]);
//! ```

use std::collections::HashMap;

/// Lookup result
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Id registered with the matched pattern
    pub id: u32,
    /// Captured slots as (name, value) pairs, in pattern order
    pub slots: Vec<(String, String)>,
}

impl Match {
    /// Slots as a map for convenient access
    pub fn slots_map(&self) -> HashMap<String, String> {
        self.slots.iter().cloned().collect()
    }

    /// Value of a single slot
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One parsed pattern segment
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Static(&'a str),
    Slot(&'a str),
    CatchAll { name: &'a str, optional: bool },
}

fn parse_segment(segment: &str) -> Segment<'_> {
    if let Some(inner) = segment
        .strip_prefix("[[...")
        .and_then(|s| s.strip_suffix("]]"))
    {
        return Segment::CatchAll {
            name: inner,
            optional: true,
        };
    }
    if let Some(inner) = segment.strip_prefix("[...").and_then(|s| s.strip_suffix(']')) {
        return Segment::CatchAll {
            name: inner,
            optional: false,
        };
    }
    if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return Segment::Slot(inner);
    }
    if let Some(name) = segment.strip_prefix(':') {
        return Segment::Slot(name);
    }
    if let Some(name) = segment.strip_prefix('*') {
        let name = if name.is_empty() { "*" } else { name };
        return Segment::CatchAll {
            name,
            optional: false,
        };
    }
    Segment::Static(segment)
}

#[derive(Debug, Default)]
struct Node {
    /// Static children (key = path segment)
    children: HashMap<String, Node>,
    /// Slot child ([id])
    slot_child: Option<Box<SlotNode>>,
    /// Catch-all child ([...rest])
    catch_all: Option<CatchAllNode>,
    /// Id if this is a terminal node
    id: Option<u32>,
}

#[derive(Debug)]
struct SlotNode {
    name: String,
    node: Node,
}

#[derive(Debug)]
struct CatchAllNode {
    name: String,
    optional: bool,
    id: u32,
}

/// Path-pattern trie
#[derive(Debug, Default)]
pub struct Router {
    root: Node,
    len: usize,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pattern
    ///
    /// Re-inserting an existing pattern replaces its id. Two slots at the
    /// same depth share one node; the first name registered wins.
    pub fn insert(&mut self, pattern: &str, id: u32) {
        let segments = split(pattern);
        if Self::insert_node(&mut self.root, &segments, id) {
            self.len += 1;
        }
    }

    fn insert_node(node: &mut Node, segments: &[&str], id: u32) -> bool {
        let Some((&segment, rest)) = segments.split_first() else {
            return node.id.replace(id).is_none();
        };

        match parse_segment(segment) {
            Segment::Static(s) => {
                let child = node.children.entry(s.to_string()).or_default();
                Self::insert_node(child, rest, id)
            }
            Segment::Slot(name) => {
                let slot = node.slot_child.get_or_insert_with(|| {
                    Box::new(SlotNode {
                        name: name.to_string(),
                        node: Node::default(),
                    })
                });
                Self::insert_node(&mut slot.node, rest, id)
            }
            Segment::CatchAll { name, optional } => {
                // Anything after a catch-all is unreachable
                node.catch_all
                    .replace(CatchAllNode {
                        name: name.to_string(),
                        optional,
                        id,
                    })
                    .is_none()
            }
        }
    }

    /// Find the pattern matching a request path
    ///
    /// The path must not carry a query string.
    pub fn find(&self, path: &str) -> Option<Match> {
        let segments = split(path);
        let mut slots = Vec::new();
        Self::find_node(&self.root, &segments, &mut slots)
    }

    fn find_node(
        node: &Node,
        segments: &[&str],
        slots: &mut Vec<(String, String)>,
    ) -> Option<Match> {
        let Some((&segment, rest)) = segments.split_first() else {
            if let Some(id) = node.id {
                return Some(Match {
                    id,
                    slots: slots.clone(),
                });
            }
            // An optional catch-all also matches its own prefix
            return node.catch_all.as_ref().filter(|c| c.optional).map(|c| {
                let mut slots = slots.clone();
                slots.push((c.name.clone(), String::new()));
                Match { id: c.id, slots }
            });
        };

        // Priority 1: exact static match
        if let Some(child) = node.children.get(segment) {
            if let Some(m) = Self::find_node(child, rest, slots) {
                return Some(m);
            }
        }

        // Priority 2: slot match
        if let Some(ref slot) = node.slot_child {
            slots.push((slot.name.clone(), segment.to_string()));
            if let Some(m) = Self::find_node(&slot.node, rest, slots) {
                return Some(m);
            }
            slots.pop();
        }

        // Priority 3: catch-all takes the rest of the path
        node.catch_all.as_ref().map(|c| {
            let mut slots = slots.clone();
            slots.push((c.name.clone(), segments.join("/")));
            Match { id: c.id, slots }
        })
    }

    /// Number of distinct patterns
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
