//! Shared application state.
//!
//! One explicitly constructed manager owns the four recovery components;
//! nothing is process-global. Handlers receive it as `Arc<RecoveryManager>`.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::ServerConfig;
use crate::document_store::DocumentStore;
use crate::errors::Result;
use crate::operation_log::OperationLog;
use crate::rollback::{RollbackDefaults, RollbackEngine};
use crate::snapshot_store::SnapshotStore;

/// Owns the document store, operation log, snapshot store and rollback
/// engine for one storage root.
pub struct RecoveryManager {
    pub config: ServerConfig,
    pub documents: Arc<DocumentStore>,
    pub operations: Arc<OperationLog>,
    pub snapshots: Arc<SnapshotStore>,
    pub rollback: RollbackEngine,
}

impl RecoveryManager {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let documents = Arc::new(DocumentStore::new(&config.storage_root)?);
        let operations = Arc::new(OperationLog::new(
            &config.storage_root,
            config.max_history_per_canvas,
        )?);
        let snapshots = Arc::new(SnapshotStore::new(
            &config.storage_root,
            documents.clone(),
            config.max_snapshots,
            Duration::from_secs(config.auto_interval_secs),
        )?);
        let rollback = RollbackEngine::new(
            documents.clone(),
            operations.clone(),
            snapshots.clone(),
            RollbackDefaults {
                create_backup: config.create_backup_default,
                preserve_graph: config.preserve_graph_default,
            },
        );

        info!(storage_root = ?config.storage_root, "Recovery manager initialized");
        Ok(Self {
            config,
            documents,
            operations,
            snapshots,
            rollback,
        })
    }

    /// Join all auto-capture tasks. Called during graceful shutdown.
    pub async fn shutdown(&self) {
        let stopped = self.snapshots.stop_all().await;
        info!(stopped_tasks = stopped, "Auto-capture tasks joined");
    }
}
