//! Pure comparison of two canvas documents.
//!
//! Matching is by element id. Nodes are compared on the tracked fields
//! `text, color, x, y, width, height`; only changed fields are reported,
//! as `{before, after}` pairs. Edges have no modified set: an edge present
//! in both documents but differing on identity fields is reported as the
//! old edge removed and the new edge added.

use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::canvas::{CanvasDocument, Edge, Node};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldChange {
    pub before: Value,
    pub after: Value,
}

/// A node present in both documents with at least one tracked field changed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModifiedNode {
    pub id: String,
    pub fields: BTreeMap<String, FieldChange>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NodeDiff {
    pub added: Vec<Node>,
    pub removed: Vec<Node>,
    pub modified: Vec<ModifiedNode>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EdgeDiff {
    pub added: Vec<Edge>,
    pub removed: Vec<Edge>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CanvasDiff {
    pub nodes: NodeDiff,
    pub edges: EdgeDiff,
}

impl CanvasDiff {
    pub fn is_empty(&self) -> bool {
        self.nodes.added.is_empty()
            && self.nodes.removed.is_empty()
            && self.nodes.modified.is_empty()
            && self.edges.added.is_empty()
            && self.edges.removed.is_empty()
    }
}

/// Compare two documents. Deterministic: output order follows document
/// order (`b` for additions, `a` otherwise), and `diff(x, x)` is always
/// the all-empty result.
pub fn diff(a: &CanvasDocument, b: &CanvasDocument) -> CanvasDiff {
    CanvasDiff {
        nodes: diff_nodes(a, b),
        edges: diff_edges(a, b),
    }
}

fn diff_nodes(a: &CanvasDocument, b: &CanvasDocument) -> NodeDiff {
    let mut result = NodeDiff::default();

    for node in &b.nodes {
        if a.node(&node.id).is_none() {
            result.added.push(node.clone());
        }
    }

    for node in &a.nodes {
        match b.node(&node.id) {
            None => result.removed.push(node.clone()),
            Some(after) => {
                let fields = changed_fields(node, after);
                if !fields.is_empty() {
                    result.modified.push(ModifiedNode {
                        id: node.id.clone(),
                        fields,
                    });
                }
            }
        }
    }

    result
}

/// Tracked-field comparison for one node pair.
fn changed_fields(before: &Node, after: &Node) -> BTreeMap<String, FieldChange> {
    let mut fields = BTreeMap::new();

    let mut track = |name: &str, b: Value, a: Value| {
        if b != a {
            fields.insert(name.to_string(), FieldChange { before: b, after: a });
        }
    };

    track("text", json!(before.text), json!(after.text));
    track("color", json!(before.color), json!(after.color));
    track("x", json!(before.x), json!(after.x));
    track("y", json!(before.y), json!(after.y));
    track("width", json!(before.width), json!(after.width));
    track("height", json!(before.height), json!(after.height));

    fields
}

fn edge_identity_differs(a: &Edge, b: &Edge) -> bool {
    a.from_node != b.from_node
        || a.to_node != b.to_node
        || a.from_side != b.from_side
        || a.to_side != b.to_side
        || a.label != b.label
}

fn diff_edges(a: &CanvasDocument, b: &CanvasDocument) -> EdgeDiff {
    let mut result = EdgeDiff::default();

    for edge in &b.edges {
        match a.edge(&edge.id) {
            None => result.added.push(edge.clone()),
            Some(old) if edge_identity_differs(old, edge) => result.added.push(edge.clone()),
            Some(_) => {}
        }
    }

    for edge in &a.edges {
        match b.edge(&edge.id) {
            None => result.removed.push(edge.clone()),
            Some(new) if edge_identity_differs(edge, new) => result.removed.push(edge.clone()),
            Some(_) => {}
        }
    }

    result
}
