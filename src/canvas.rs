//! Canvas document model
//!
//! A canvas is a JSON document holding a graph of nodes and edges:
//! `{"nodes": [...], "edges": [...]}`. Unknown fields on nodes and edges
//! are preserved through read/write cycles so this service never strips
//! data written by other tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A full canvas document. This is the unit of storage, snapshotting
/// and rollback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// One node on the canvas. `x/y/width/height` are the layout box;
/// exactly one of `text`/`file`/`url` is normally set depending on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Fields this service does not interpret but must not lose.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    #[serde(rename = "fromNode")]
    pub from_node: String,
    #[serde(rename = "toNode")]
    pub to_node: String,
    #[serde(rename = "fromSide", skip_serializing_if = "Option::is_none")]
    pub from_side: Option<String>,
    #[serde(rename = "toSide", skip_serializing_if = "Option::is_none")]
    pub to_side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CanvasDocument {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Remove a node by id. Returns true if a node was removed.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        self.nodes.len() != before
    }

    /// Remove an edge by id. Returns true if an edge was removed.
    pub fn remove_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        self.edges.len() != before
    }

    /// Insert a node, replacing any existing node with the same id.
    pub fn upsert_node(&mut self, node: Node) {
        match self.nodes.iter().position(|n| n.id == node.id) {
            Some(i) => self.nodes[i] = node,
            None => self.nodes.push(node),
        }
    }

    /// Insert an edge, replacing any existing edge with the same id.
    pub fn upsert_edge(&mut self, edge: Edge) {
        match self.edges.iter().position(|e| e.id == edge.id) {
            Some(i) => self.edges[i] = edge,
            None => self.edges.push(edge),
        }
    }
}

impl Node {
    /// Minimal text node, used widely in tests.
    pub fn text_node(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            node_type: "text".to_string(),
            text: Some(text.to_string()),
            file: None,
            url: None,
            x: 0.0,
            y: 0.0,
            width: 250.0,
            height: 60.0,
            color: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Edge {
    pub fn connecting(id: &str, from: &str, to: &str) -> Self {
        Self {
            id: id.to_string(),
            from_node: from.to_string(),
            to_node: to.to_string(),
            from_side: None,
            to_side: None,
            label: None,
            color: None,
            extra: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_document_deserializes_from_empty_object() {
        let doc: CanvasDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.nodes.is_empty());
        assert!(doc.edges.is_empty());
    }

    #[test]
    fn test_edge_uses_camel_case_wire_names() {
        let edge = Edge::connecting("e1", "a", "b");
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["fromNode"], "a");
        assert_eq!(value["toNode"], "b");
        assert!(value.get("from_node").is_none());
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let raw = json!({
            "nodes": [{
                "id": "n1", "type": "text", "text": "hi",
                "x": 0, "y": 0, "width": 100, "height": 50,
                "customField": {"nested": true}
            }],
            "edges": []
        });
        let doc: CanvasDocument = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["nodes"][0]["customField"]["nested"], true);
    }

    #[test]
    fn test_upsert_node_replaces_by_id() {
        let mut doc = CanvasDocument::default();
        doc.upsert_node(Node::text_node("n1", "old"));
        doc.upsert_node(Node::text_node("n1", "new"));
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.node("n1").unwrap().text.as_deref(), Some("new"));
    }

    #[test]
    fn test_remove_missing_node_is_false() {
        let mut doc = CanvasDocument::default();
        assert!(!doc.remove_node("nope"));
    }
}
