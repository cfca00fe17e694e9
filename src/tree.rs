//! The annotation tree consumed and produced by the prosody stage.
//!
//! The tree is an arena: every node lives in one `Vec` and is addressed by a
//! stable [`NodeId`]. Detaching a node unlinks it from its parent but never
//! reuses its slot, so ids held in per-utterance side tables stay valid for
//! the whole call.
//!
//! # JSON layout
//!
//! ```json
//! {
//!   "kind": "document",
//!   "children": [
//!     { "kind": "sentence", "children": [
//!       { "kind": "phrase", "children": [
//!         { "kind": "token", "attrs": { "accent": "H*" }, "children": [
//!           { "kind": "syllable", "attrs": { "stress": "1", "tone": "H*" }, "children": [
//!             { "kind": "segment", "attrs": { "p": "t" } },
//!             { "kind": "segment", "attrs": { "p": "a" } }
//!           ]}
//!         ]},
//!         { "kind": "boundary", "attrs": { "breakindex": "4" } }
//!       ]}
//!     ]}
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Stable index of a node inside an [`AnnotationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element kinds of the annotation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Voice,
    Sentence,
    Phrase,
    /// Modifier scope carrying relative prosodic settings.
    Prosody,
    Token,
    Syllable,
    /// A phone; the leaf that receives `d`, `end` and `f0`.
    #[serde(alias = "ph", alias = "phone")]
    Segment,
    Boundary,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    attrs: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Ordered forest rooted at a single document node.
#[derive(Debug, Clone)]
pub struct AnnotationTree {
    nodes: Vec<Node>,
}

impl Default for AnnotationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationTree {
    /// Create a tree holding only an empty document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                attrs: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Append a new, attribute-less child of `kind` under `parent`.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.alloc(kind, Some(parent));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append a new child and set the given attributes on it.
    pub fn append_with(&mut self, parent: NodeId, kind: NodeKind, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.append(parent, kind);
        for (key, value) in attrs {
            self.set_attr(id, key, *value);
        }
        id
    }

    /// Insert a new node of `kind` as the preceding sibling of `anchor`.
    ///
    /// Returns `None` when `anchor` is detached or is the document node.
    pub fn insert_before(&mut self, anchor: NodeId, kind: NodeKind) -> Option<NodeId> {
        let parent = self.parent(anchor)?;
        let pos = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == anchor)?;
        let id = self.alloc(kind, Some(parent));
        self.nodes[parent.0].children.insert(pos, id);
        Some(id)
    }

    /// Unlink `id` (and with it its whole subtree) from the tree.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Whether `id` is still reachable from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root()
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.nodes[id.0].attrs.get(key).map(String::as_str)
    }

    pub fn has_attr(&self, id: NodeId, key: &str) -> bool {
        self.nodes[id.0].attrs.contains_key(key)
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        self.nodes[id.0].attrs.insert(key.to_string(), value.into());
    }

    pub fn remove_attr(&mut self, id: NodeId, key: &str) -> Option<String> {
        self.nodes[id.0].attrs.remove(key)
    }

    /// Read an integer attribute, substituting `default` when it is absent.
    ///
    /// A present but malformed value is logged and also replaced by `default`.
    pub fn int_attr_or(&self, id: NodeId, key: &str, default: i32) -> i32 {
        match self.attr(id, key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("Unexpected {key} value `{raw}', using {default}");
                default
            }),
        }
    }

    /// All descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Descendants of `id` whose kind is one of `kinds`, in document order.
    pub fn descendants_of(&self, id: NodeId, kinds: &[NodeKind]) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| kinds.contains(&self.kind(n)))
            .collect()
    }

    /// Closest strict ancestor of `id` with the given kind.
    pub fn ancestor(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.kind(node) == kind {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn first_of(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.descendants(id).into_iter().find(|&n| self.kind(n) == kind)
    }

    pub fn last_of(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.descendants(id).into_iter().rev().find(|&n| self.kind(n) == kind)
    }

    /// Siblings of `id` before it, nearest first.
    pub fn preceding_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id).unwrap_or(0);
        siblings[..pos].iter().rev().copied().collect()
    }

    /// Siblings of `id` after it, nearest first.
    pub fn following_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let siblings = self.children(parent);
        match siblings.iter().position(|&c| c == id) {
            Some(pos) => siblings[pos + 1..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Parse the `f0` attribute of a segment into `(timing%, Hz)` pairs.
    pub fn f0_targets(&self, segment: NodeId) -> Vec<(i32, i32)> {
        let Some(raw) = self.attr(segment, "f0") else {
            return Vec::new();
        };
        raw.split_whitespace()
            .filter_map(|pair| {
                let inner = pair.strip_prefix('(')?.strip_suffix(')')?;
                let (timing, hz) = inner.split_once(',')?;
                Some((timing.trim().parse().ok()?, hz.trim().parse().ok()?))
            })
            .collect()
    }

    /// Parse a tree from its nested JSON representation.
    ///
    /// A top-level node that is not a document is wrapped in one.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let repr: NodeRepr = serde_json::from_str(json)?;
        let mut tree = Self::new();
        if repr.kind == NodeKind::Document {
            let root = tree.root();
            tree.nodes[root.0].attrs = repr.attrs;
            for child in repr.children {
                tree.graft(root, child);
            }
        } else {
            let root = tree.root();
            tree.graft(root, repr);
        }
        Ok(tree)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_repr(self.root()))
    }

    /// Read a tree from a JSON file.
    pub fn read_json(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&content)?)
    }

    /// Write the tree as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(Node {
            kind,
            attrs: BTreeMap::new(),
            parent,
            children: Vec::new(),
        });
        NodeId(self.nodes.len() - 1)
    }

    fn graft(&mut self, parent: NodeId, repr: NodeRepr) {
        let id = self.append(parent, repr.kind);
        self.nodes[id.0].attrs = repr.attrs;
        for child in repr.children {
            self.graft(id, child);
        }
    }

    fn to_repr(&self, id: NodeId) -> NodeRepr {
        NodeRepr {
            kind: self.kind(id),
            attrs: self.nodes[id.0].attrs.clone(),
            children: self.children(id).iter().map(|&c| self.to_repr(c)).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRepr {
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeRepr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_keeps_sibling_order() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let a = tree.append(root, NodeKind::Token);
        let b = tree.append(root, NodeKind::Token);
        let boundary = tree.insert_before(b, NodeKind::Boundary).unwrap();
        assert_eq!(tree.children(root), &[a, boundary, b]);
    }

    #[test]
    fn detached_nodes_drop_out_of_traversals() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let phrase = tree.append(root, NodeKind::Phrase);
        let token = tree.append(phrase, NodeKind::Token);
        let boundary = tree.append(phrase, NodeKind::Boundary);
        tree.detach(boundary);
        assert_eq!(tree.descendants(root), vec![phrase, token]);
        assert!(!tree.is_attached(boundary));
        assert!(tree.is_attached(token));
    }

    #[test]
    fn ancestor_lookup_is_strict() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let outer = tree.append(root, NodeKind::Prosody);
        let inner = tree.append(outer, NodeKind::Prosody);
        assert_eq!(tree.ancestor(inner, NodeKind::Prosody), Some(outer));
        assert_eq!(tree.ancestor(outer, NodeKind::Prosody), None);
        assert!(tree.is_ancestor(root, inner));
        assert!(!tree.is_ancestor(inner, inner));
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let json = r#"{
            "kind": "document",
            "children": [
                { "kind": "phrase", "children": [
                    { "kind": "ph", "attrs": { "p": "a", "f0": "(0,120) (100,110)" } },
                    { "kind": "boundary", "attrs": { "breakindex": "4" } }
                ]}
            ]
        }"#;
        let tree = AnnotationTree::from_json_str(json).unwrap();
        let segment = tree.first_of(tree.root(), NodeKind::Segment).unwrap();
        assert_eq!(tree.attr(segment, "p"), Some("a"));
        assert_eq!(tree.f0_targets(segment), vec![(0, 120), (100, 110)]);

        let again = AnnotationTree::from_json_str(&tree.to_json_string().unwrap()).unwrap();
        assert_eq!(again.descendants(again.root()).len(), 3);
    }

    #[test]
    fn non_document_root_is_wrapped() {
        let tree = AnnotationTree::from_json_str(r#"{ "kind": "sentence" }"#).unwrap();
        let children = tree.children(tree.root());
        assert_eq!(children.len(), 1);
        assert_eq!(tree.kind(children[0]), NodeKind::Sentence);
    }

    #[test]
    fn malformed_int_attr_falls_back() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let b = tree.append_with(root, NodeKind::Boundary, &[("breakindex", "x")]);
        assert_eq!(tree.int_attr_or(b, "breakindex", 3), 3);
        assert_eq!(tree.int_attr_or(b, "duration", 0), 0);
    }
}
