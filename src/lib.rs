//! canvas-rewind library
//!
//! Versioned state for JSON canvas documents: an append-only operation
//! log, a compressed and indexed snapshot store with retention and
//! periodic auto-capture, a diff engine, and a rollback engine with a
//! backup-before-destructive-write guarantee.
//!
//! # Caller obligations
//! `RollbackEngine::rollback` is not atomic across its checkpoint and
//! write steps; serialize rollback invocations per canvas path. See the
//! module docs on [`rollback`].

pub mod canvas;
pub mod config;
pub mod diff;
pub mod document_store;
pub mod errors;
pub mod handlers;
pub mod operation_log;
pub mod rollback;
pub mod snapshot_store;
pub mod validation;

// Re-export dependencies so tests use the same versions.
pub use chrono;
pub use serde_json;

pub use canvas::{CanvasDocument, Edge, Node};
pub use document_store::DocumentStore;
pub use handlers::RecoveryManager;
pub use operation_log::{Operation, OperationKind, OperationLog, OperationMetadata};
pub use rollback::{
    GraphSyncStatus, RollbackDefaults, RollbackEngine, RollbackRequest, RollbackResult,
    RollbackType,
};
pub use snapshot_store::{
    CreateSnapshot, Snapshot, SnapshotIndexEntry, SnapshotMetadata, SnapshotStore, SnapshotType,
};
