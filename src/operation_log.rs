//! Append-only, bounded operation log.
//!
//! One JSON log file per canvas under `<storage_root>/operations/`. Every
//! `record` persists the log atomically before returning, so a crash
//! immediately afterwards cannot lose the operation. Per-canvas logs are
//! cached in memory for repeated reads; the file on disk is authoritative.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::canvas::{CanvasDocument, Edge, Node};
use crate::document_store::atomic_write;
use crate::errors::{AppError, Result};
use crate::validation::{canvas_slug, validate_canvas_path};

/// Operation payload, one shape per operation type.
///
/// The tag/content pair serializes as the wire-level `type` + `data`
/// fields, and makes reverse application an exhaustive match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    NodeAdd {
        node_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        after: Vec<Node>,
    },
    NodeDelete {
        before: Vec<Node>,
    },
    NodeModify {
        before: Vec<Node>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        after: Vec<Node>,
    },
    NodeColorChange {
        node_ids: Vec<String>,
        /// Prior color per node id; `None` means the node had no color set.
        before: BTreeMap<String, Option<String>>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        after: BTreeMap<String, Option<String>>,
    },
    EdgeAdd {
        edge_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        after: Vec<Edge>,
    },
    EdgeDelete {
        before: Vec<Edge>,
    },
    BatchOperation {
        before: CanvasDocument,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<CanvasDocument>,
    },
}

impl OperationKind {
    /// Wire name of this operation type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NodeAdd { .. } => "NODE_ADD",
            Self::NodeDelete { .. } => "NODE_DELETE",
            Self::NodeModify { .. } => "NODE_MODIFY",
            Self::NodeColorChange { .. } => "NODE_COLOR_CHANGE",
            Self::EdgeAdd { .. } => "EDGE_ADD",
            Self::EdgeDelete { .. } => "EDGE_DELETE",
            Self::BatchOperation { .. } => "BATCH_OPERATION",
        }
    }
}

/// Producer-supplied context attached to an operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// One recorded mutation of a canvas, immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub id: String,
    #[serde(flatten)]
    pub kind: OperationKind,
    pub canvas_path: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    #[serde(default)]
    pub metadata: OperationMetadata,
}

impl Operation {
    /// New operation stamped with the current time and a fresh id.
    pub fn new(canvas_path: &str, user_id: &str, kind: OperationKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            canvas_path: canvas_path.to_string(),
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            metadata: OperationMetadata::default(),
        }
    }
}

type CanvasLog = Arc<RwLock<Vec<Operation>>>;

/// Append-only record of mutations, namespaced per canvas and bounded by
/// `max_history_per_canvas`.
pub struct OperationLog {
    operations_dir: PathBuf,
    max_history_per_canvas: usize,
    cache: DashMap<String, CanvasLog>,
}

impl OperationLog {
    pub fn new(storage_root: &Path, max_history_per_canvas: usize) -> Result<Self> {
        let operations_dir = storage_root.join("operations");
        fs::create_dir_all(&operations_dir)?;
        Ok(Self {
            operations_dir,
            max_history_per_canvas,
            cache: DashMap::new(),
        })
    }

    fn log_file(&self, canvas_path: &str) -> PathBuf {
        self.operations_dir
            .join(canvas_slug(canvas_path))
            .join("log.json")
    }

    fn load_canvas(&self, canvas_path: &str) -> Result<CanvasLog> {
        if let Some(log) = self.cache.get(canvas_path) {
            return Ok(log.clone());
        }

        let file = self.log_file(canvas_path);
        let operations: Vec<Operation> = if file.exists() {
            let raw = fs::read_to_string(&file)?;
            serde_json::from_str(&raw).map_err(|e| AppError::CanvasDecode {
                path: canvas_path.to_string(),
                reason: format!("operation log: {e}"),
            })?
        } else {
            Vec::new()
        };

        let log = Arc::new(RwLock::new(operations));
        self.cache.insert(canvas_path.to_string(), log.clone());
        Ok(log)
    }

    fn persist(&self, canvas_path: &str, operations: &[Operation]) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(operations)?;
        atomic_write(&self.log_file(canvas_path), &serialized)
    }

    /// Append an operation. The log entry is on disk before this returns.
    ///
    /// Duplicate ids are rejected; once the per-canvas count exceeds the
    /// configured maximum the oldest entries are evicted.
    pub fn record(&self, operation: Operation) -> Result<()> {
        validate_canvas_path(&operation.canvas_path)?;
        let log = self.load_canvas(&operation.canvas_path)?;
        let mut entries = log.write();

        if entries.iter().any(|op| op.id == operation.id) {
            return Err(AppError::DuplicateOperation(operation.id));
        }

        let canvas_path = operation.canvas_path.clone();
        let operation_id = operation.id.clone();
        entries.push(operation);
        if entries.len() > self.max_history_per_canvas {
            let excess = entries.len() - self.max_history_per_canvas;
            entries.drain(..excess);
        }

        self.persist(&canvas_path, &entries[..])?;
        debug!(
            canvas = %canvas_path,
            operation = %operation_id,
            retained = entries.len(),
            "Operation recorded"
        );
        Ok(())
    }

    /// Look up an operation by id across all canvases.
    ///
    /// Ids are globally unique UUIDs; cached canvases are searched first,
    /// then any logs not yet loaded from disk.
    pub fn get(&self, operation_id: &str) -> Result<Option<Operation>> {
        for entry in self.cache.iter() {
            if let Some(op) = entry
                .value()
                .read()
                .iter()
                .find(|op| op.id == operation_id)
            {
                return Ok(Some(op.clone()));
            }
        }

        for dir in fs::read_dir(&self.operations_dir)?.filter_map(|e| e.ok()) {
            let file = dir.path().join("log.json");
            if !file.exists() {
                continue;
            }
            let raw = fs::read_to_string(&file)?;
            let operations: Vec<Operation> = match serde_json::from_str(&raw) {
                Ok(ops) => ops,
                Err(e) => {
                    return Err(AppError::CanvasDecode {
                        path: dir.path().display().to_string(),
                        reason: format!("operation log: {e}"),
                    });
                }
            };
            if let Some(op) = operations.into_iter().find(|op| op.id == operation_id) {
                return Ok(Some(op));
            }
        }

        Ok(None)
    }

    /// Paginated history for a canvas, newest first.
    pub fn history(
        &self,
        canvas_path: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Operation>> {
        validate_canvas_path(canvas_path)?;
        let log = self.load_canvas(canvas_path)?;
        let entries = log.read();
        Ok(entries
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Number of retained operations for a canvas.
    pub fn count(&self, canvas_path: &str) -> Result<usize> {
        validate_canvas_path(canvas_path)?;
        let log = self.load_canvas(canvas_path)?;
        let len = log.read().len();
        Ok(len)
    }

    /// Drop all cached per-canvas logs, forcing reload from disk.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
