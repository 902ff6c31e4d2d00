//! Rollback orchestration.
//!
//! Resolves a rollback target against the operation log or the snapshot
//! index, takes a CHECKPOINT safety snapshot before any destructive write,
//! computes the new document (reverse application for OPERATION targets,
//! whole-document replace for SNAPSHOT/TIMEPOINT), and writes it through
//! the atomic document store. If a step fails after the checkpoint was
//! taken, the canvas is synchronously restored from that checkpoint and
//! the error text states whether the restoration succeeded, so the
//! returned `success` flag always matches on-disk state.
//!
//! `rollback()` is not atomic across its steps: callers must serialize
//! invocations per canvas path so no concurrent write lands between the
//! checkpoint and the final write. Auto-capture ticks are safe to overlap
//! because every document write is atomic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::canvas::CanvasDocument;
use crate::document_store::DocumentStore;
use crate::errors::AppError;
use crate::operation_log::{Operation, OperationKind, OperationLog};
use crate::snapshot_store::{CreateSnapshot, Snapshot, SnapshotStore, SnapshotType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackType {
    Operation,
    Snapshot,
    Timepoint,
}

/// Status of the external knowledge-graph reconciliation. The engine only
/// reports it; the reconciliation itself belongs to an external
/// collaborator and is never blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphSyncStatus {
    Synced,
    Pending,
    Skipped,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackRequest {
    pub canvas_path: String,
    pub rollback_type: RollbackType,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub target_time: Option<DateTime<Utc>>,
    /// Defaults from server configuration when omitted.
    #[serde(default)]
    pub create_backup: Option<bool>,
    #[serde(default)]
    pub preserve_graph: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub success: bool,
    pub rollback_type: RollbackType,
    pub canvas_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_snapshot_id: Option<String>,
    pub graph_sync_status: GraphSyncStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Default rollback options, taken from server configuration.
#[derive(Debug, Clone, Copy)]
pub struct RollbackDefaults {
    pub create_backup: bool,
    pub preserve_graph: bool,
}

impl Default for RollbackDefaults {
    fn default() -> Self {
        Self {
            create_backup: true,
            preserve_graph: false,
        }
    }
}

enum ResolvedTarget {
    Operation(Operation),
    Snapshot(Snapshot),
}

pub struct RollbackEngine {
    documents: Arc<DocumentStore>,
    operations: Arc<OperationLog>,
    snapshots: Arc<SnapshotStore>,
    defaults: RollbackDefaults,
}

impl RollbackEngine {
    pub fn new(
        documents: Arc<DocumentStore>,
        operations: Arc<OperationLog>,
        snapshots: Arc<SnapshotStore>,
        defaults: RollbackDefaults,
    ) -> Self {
        Self {
            documents,
            operations,
            snapshots,
            defaults,
        }
    }

    /// Perform a rollback. Engine-level failures are reported in the
    /// returned result rather than as errors, so the HTTP surface can
    /// always answer with a body carrying a trustworthy `success` flag.
    pub fn rollback(&self, request: RollbackRequest) -> RollbackResult {
        let mut result = RollbackResult {
            success: false,
            rollback_type: request.rollback_type,
            canvas_path: request.canvas_path.clone(),
            backup_snapshot_id: None,
            restored_operation_id: None,
            restored_snapshot_id: None,
            graph_sync_status: GraphSyncStatus::Skipped,
            message: String::new(),
            error: None,
        };

        // Step 1: resolve the target, read-only.
        let target = match self.resolve_target(&request) {
            Ok(target) => target,
            Err(e) => {
                warn!(canvas = %request.canvas_path, error = %e, "Rollback target resolution failed");
                result.message = if e.is_not_found() {
                    "Rollback target not found".to_string()
                } else {
                    "Rollback target could not be resolved".to_string()
                };
                result.error = Some(e.message());
                return result;
            }
        };

        // Step 2: safety checkpoint, before any destructive write.
        let create_backup = request.create_backup.unwrap_or(self.defaults.create_backup);
        if create_backup {
            match self.snapshots.create(
                &request.canvas_path,
                SnapshotType::Checkpoint,
                CreateSnapshot {
                    description: Some("pre-rollback backup".to_string()),
                    created_by: Some("system:rollback".to_string()),
                    ..Default::default()
                },
            ) {
                Ok(checkpoint) => result.backup_snapshot_id = Some(checkpoint.info.id),
                Err(e) => {
                    error!(canvas = %request.canvas_path, error = %e, "Pre-rollback checkpoint failed");
                    result.message = "Rollback aborted: safety checkpoint failed".to_string();
                    result.error = Some(AppError::BackupFailure(e.message()).message());
                    return result;
                }
            }
        }

        // Steps 3-4: compute the new document and write it. Any failure
        // past this point must leave the canvas in a known state.
        match self.compute_and_write(&request, &target) {
            Ok(()) => {}
            Err(e) => {
                result.error = Some(self.recover_from_backup(
                    &request.canvas_path,
                    result.backup_snapshot_id.as_deref(),
                    e,
                ));
                result.message = "Rollback failed".to_string();
                return result;
            }
        }

        // Step 5: graph reconciliation is delegated entirely to an
        // external collaborator.
        let preserve_graph = request
            .preserve_graph
            .unwrap_or(self.defaults.preserve_graph);
        result.graph_sync_status = if preserve_graph {
            GraphSyncStatus::Skipped
        } else {
            GraphSyncStatus::Pending
        };

        match &target {
            ResolvedTarget::Operation(op) => {
                result.restored_operation_id = Some(op.id.clone());
                result.message = format!("Reversed operation {}", op.id);
            }
            ResolvedTarget::Snapshot(snapshot) => {
                result.restored_snapshot_id = Some(snapshot.info.id.clone());
                result.message = format!("Restored snapshot {}", snapshot.info.id);
            }
        }
        result.success = true;
        info!(
            canvas = %request.canvas_path,
            kind = ?request.rollback_type,
            backup = ?result.backup_snapshot_id,
            "Rollback completed"
        );
        result
    }

    fn resolve_target(&self, request: &RollbackRequest) -> crate::errors::Result<ResolvedTarget> {
        match request.rollback_type {
            RollbackType::Operation => {
                let operation = match &request.target_id {
                    Some(id) => self
                        .operations
                        .get(id)?
                        .filter(|op| op.canvas_path == request.canvas_path)
                        .ok_or_else(|| AppError::OperationNotFound(id.clone()))?,
                    None => self
                        .operations
                        .history(&request.canvas_path, 1, 0)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            AppError::OperationNotFound(format!(
                                "(latest for {})",
                                request.canvas_path
                            ))
                        })?,
                };
                Ok(ResolvedTarget::Operation(operation))
            }
            RollbackType::Snapshot => {
                let snapshot = match &request.target_id {
                    Some(id) => self
                        .snapshots
                        .get(&request.canvas_path, id)?
                        .ok_or_else(|| AppError::SnapshotNotFound(id.clone()))?,
                    None => self
                        .snapshots
                        .get_latest(&request.canvas_path)?
                        .ok_or_else(|| {
                            AppError::SnapshotNotFound(format!(
                                "(latest for {})",
                                request.canvas_path
                            ))
                        })?,
                };
                Ok(ResolvedTarget::Snapshot(snapshot))
            }
            RollbackType::Timepoint => {
                // Validated before storage is touched.
                let target_time = request.target_time.ok_or(AppError::MissingTargetTime)?;
                let entry = self
                    .snapshots
                    .find_at_or_before(&request.canvas_path, target_time)?
                    .ok_or_else(|| {
                        AppError::NoSnapshotBeforeTime(format!("at or before {target_time}"))
                    })?;
                let snapshot = self
                    .snapshots
                    .get(&request.canvas_path, &entry.id)?
                    .ok_or_else(|| AppError::SnapshotNotFound(entry.id.clone()))?;
                Ok(ResolvedTarget::Snapshot(snapshot))
            }
        }
    }

    fn compute_and_write(
        &self,
        request: &RollbackRequest,
        target: &ResolvedTarget,
    ) -> crate::errors::Result<()> {
        let new_document = match target {
            ResolvedTarget::Operation(operation) => {
                let current = self.documents.read(&request.canvas_path)?;
                apply_reverse(current, operation)
            }
            ResolvedTarget::Snapshot(snapshot) => snapshot.canvas_data.clone(),
        };
        self.documents.write(&request.canvas_path, &new_document)
    }

    /// Synchronous post-backup recovery. Returns the error text for the
    /// result, stating whether the restoration succeeded.
    fn recover_from_backup(
        &self,
        canvas_path: &str,
        backup_snapshot_id: Option<&str>,
        cause: AppError,
    ) -> String {
        let Some(backup_id) = backup_snapshot_id else {
            return format!("{} (no safety checkpoint was taken)", cause.message());
        };

        let restore = self
            .snapshots
            .get(canvas_path, backup_id)
            .and_then(|snapshot| {
                snapshot.ok_or_else(|| AppError::SnapshotNotFound(backup_id.to_string()))
            })
            .and_then(|snapshot| self.documents.write(canvas_path, &snapshot.canvas_data));

        match restore {
            Ok(()) => {
                warn!(
                    canvas = canvas_path,
                    backup = backup_id,
                    "Rollback failed; canvas restored from pre-rollback checkpoint"
                );
                format!(
                    "{}; canvas was restored from backup snapshot {backup_id}",
                    cause.message()
                )
            }
            Err(restore_err) => {
                error!(
                    canvas = canvas_path,
                    backup = backup_id,
                    error = %restore_err,
                    "Rollback failed and backup restoration also failed"
                );
                format!(
                    "{}; restoring from backup snapshot {backup_id} also failed: {}",
                    cause.message(),
                    restore_err.message()
                )
            }
        }
    }
}

/// Compute the document that undoes `operation` against `current`.
pub fn apply_reverse(mut current: CanvasDocument, operation: &Operation) -> CanvasDocument {
    match &operation.kind {
        OperationKind::NodeAdd { node_ids, .. } => {
            for id in node_ids {
                current.remove_node(id);
            }
            current
        }
        OperationKind::NodeDelete { before } => {
            for node in before {
                current.upsert_node(node.clone());
            }
            current
        }
        OperationKind::NodeModify { before, .. } => {
            for node in before {
                current.upsert_node(node.clone());
            }
            current
        }
        OperationKind::NodeColorChange {
            node_ids, before, ..
        } => {
            for id in node_ids {
                if let Some(node) = current.node_mut(id) {
                    node.color = before.get(id).cloned().flatten();
                }
            }
            current
        }
        OperationKind::EdgeAdd { edge_ids, .. } => {
            for id in edge_ids {
                current.remove_edge(id);
            }
            current
        }
        OperationKind::EdgeDelete { before } => {
            for edge in before {
                current.upsert_edge(edge.clone());
            }
            current
        }
        OperationKind::BatchOperation { before, .. } => before.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Edge, Node};
    use std::collections::BTreeMap;

    fn op(kind: OperationKind) -> Operation {
        Operation::new("board.canvas", "tester", kind)
    }

    #[test]
    fn test_reverse_node_add_deletes_nodes() {
        let doc = CanvasDocument {
            nodes: vec![Node::text_node("n1", "a"), Node::text_node("n2", "b")],
            edges: vec![],
        };
        let reversed = apply_reverse(
            doc,
            &op(OperationKind::NodeAdd {
                node_ids: vec!["n2".to_string()],
                after: vec![],
            }),
        );
        assert_eq!(reversed.nodes.len(), 1);
        assert!(reversed.node("n2").is_none());
    }

    #[test]
    fn test_reverse_node_delete_reinserts() {
        let doc = CanvasDocument::default();
        let reversed = apply_reverse(
            doc,
            &op(OperationKind::NodeDelete {
                before: vec![Node::text_node("n1", "restored")],
            }),
        );
        assert_eq!(reversed.node("n1").unwrap().text.as_deref(), Some("restored"));
    }

    #[test]
    fn test_reverse_color_change_restores_prior_color() {
        let mut node = Node::text_node("n1", "t");
        node.color = Some("2".to_string());
        let doc = CanvasDocument {
            nodes: vec![node],
            edges: vec![],
        };

        let mut before = BTreeMap::new();
        before.insert("n1".to_string(), Some("1".to_string()));
        let reversed = apply_reverse(
            doc,
            &op(OperationKind::NodeColorChange {
                node_ids: vec!["n1".to_string()],
                before,
                after: BTreeMap::new(),
            }),
        );
        assert_eq!(reversed.node("n1").unwrap().color.as_deref(), Some("1"));
    }

    #[test]
    fn test_reverse_color_change_can_clear_color() {
        let mut node = Node::text_node("n1", "t");
        node.color = Some("4".to_string());
        let doc = CanvasDocument {
            nodes: vec![node],
            edges: vec![],
        };

        let mut before = BTreeMap::new();
        before.insert("n1".to_string(), None);
        let reversed = apply_reverse(
            doc,
            &op(OperationKind::NodeColorChange {
                node_ids: vec!["n1".to_string()],
                before,
                after: BTreeMap::new(),
            }),
        );
        assert!(reversed.node("n1").unwrap().color.is_none());
    }

    #[test]
    fn test_reverse_edge_operations() {
        let doc = CanvasDocument {
            nodes: vec![],
            edges: vec![Edge::connecting("e1", "a", "b")],
        };
        let reversed = apply_reverse(
            doc,
            &op(OperationKind::EdgeAdd {
                edge_ids: vec!["e1".to_string()],
                after: vec![],
            }),
        );
        assert!(reversed.edges.is_empty());

        let restored = apply_reverse(
            reversed,
            &op(OperationKind::EdgeDelete {
                before: vec![Edge::connecting("e1", "a", "b")],
            }),
        );
        assert_eq!(restored.edges.len(), 1);
    }

    #[test]
    fn test_reverse_batch_replaces_whole_document() {
        let original = CanvasDocument {
            nodes: vec![Node::text_node("n1", "original")],
            edges: vec![],
        };
        let mutated = CanvasDocument {
            nodes: vec![Node::text_node("n9", "mutated")],
            edges: vec![],
        };
        let reversed = apply_reverse(
            mutated,
            &op(OperationKind::BatchOperation {
                before: original.clone(),
                after: None,
            }),
        );
        assert_eq!(reversed, original);
    }
}
