/// Tree model produced by the parser and walked by the reader.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::template::Template;

/// Identity of a node within its tree. Gates receive it to key per-node state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Named block, addressed only through go-tos. The document root is a
    /// scope with an empty name when content precedes the first header.
    Scope { name: String },
    /// A line of text. Owns children only when gated.
    Line(Template),
    /// One option of a choice set; children play when it is chosen.
    Choice(Template),
    /// Call into another scope. `destination` is filled by the resolution pass.
    GoTo {
        target: String,
        destination: Option<NodeId>,
    },
    Return,
    Comment(Template),
    /// Separates two adjacent runs of choices.
    CloseChoice,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Zero-based source line the node came from.
    pub line: usize,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_scope(&self) -> bool {
        matches!(self.kind, NodeKind::Scope { .. })
    }

    /// Whether lines indented beneath this node may become its children.
    pub fn can_own_children(&self) -> bool {
        match &self.kind {
            NodeKind::Scope { .. } | NodeKind::Choice(_) => true,
            NodeKind::Line(template) => template.has_gate(),
            _ => false,
        }
    }

    /// The template carried by lines, choices and comments.
    pub fn template(&self) -> Option<&Template> {
        match &self.kind {
            NodeKind::Line(t) | NodeKind::Choice(t) | NodeKind::Comment(t) => Some(t),
            _ => None,
        }
    }
}

/// An immutable parsed document.
///
/// Nodes live in an arena indexed by [`NodeId`]. Every scope other than the
/// root is reached only through go-to destinations.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    scopes: FxHashMap<String, NodeId>,
}

impl Tree {
    pub(crate) fn from_parts(nodes: Vec<Node>, root: NodeId, scopes: FxHashMap<String, NodeId>) -> Self {
        Self { nodes, root, scopes }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Look up a named scope.
    pub fn scope(&self, name: &str) -> Option<NodeId> {
        self.scopes.get(name).copied()
    }

    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }
}
