//! Compressed, indexed snapshot store with retention and auto-capture.
//!
//! Per canvas, snapshot payloads are lz4-compressed blobs and metadata
//! lives in a separate `index.json`, so listing cost scales with the index
//! and never with total payload bytes. Retention pruning runs after every
//! create. Auto-capture is a cancellable periodic task per canvas, joined
//! on stop so no snapshot can fire after `stop_auto` returns.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, Entry};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::canvas::CanvasDocument;
use crate::document_store::{DocumentStore, atomic_write};
use crate::errors::{AppError, Result};
use crate::validation::{canvas_slug, validate_canvas_path};

/// Upper bound for a decompressed snapshot payload (64 MB). A blob
/// claiming to inflate past this is treated as corrupt.
const MAX_DECOMPRESSED_SNAPSHOT: i32 = 64 * 1024 * 1024;

/// Identity recorded on snapshots taken by the periodic task.
const AUTO_CAPTURE_IDENTITY: &str = "system:auto-capture";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotType {
    Manual,
    Auto,
    Checkpoint,
}

/// Descriptive metadata stored alongside every snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Size of the uncompressed canvas payload in bytes.
    pub size_bytes: u64,
}

/// Lightweight per-snapshot record kept in the index, separate from the
/// compressed payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotIndexEntry {
    pub id: String,
    pub canvas_path: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub snapshot_type: SnapshotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation_id: Option<String>,
    pub metadata: SnapshotMetadata,
}

/// A full snapshot: index entry plus the self-contained document copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(flatten)]
    pub info: SnapshotIndexEntry,
    pub canvas_data: CanvasDocument,
}

/// Caller-supplied fields for [`SnapshotStore::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateSnapshot {
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub tags: Vec<String>,
    pub last_operation_id: Option<String>,
}

struct AutoCaptureTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

type IndexCache = Arc<RwLock<Vec<SnapshotIndexEntry>>>;

/// Compressed full-document snapshots per canvas with a separate metadata
/// index, retention pruning and periodic auto-capture.
pub struct SnapshotStore {
    snapshots_dir: PathBuf,
    documents: Arc<DocumentStore>,
    max_snapshots: usize,
    auto_interval: Duration,
    index_cache: DashMap<String, IndexCache>,
    auto_tasks: DashMap<String, AutoCaptureTask>,
}

impl SnapshotStore {
    pub fn new(
        storage_root: &Path,
        documents: Arc<DocumentStore>,
        max_snapshots: usize,
        auto_interval: Duration,
    ) -> Result<Self> {
        let snapshots_dir = storage_root.join("snapshots");
        fs::create_dir_all(&snapshots_dir)?;
        Ok(Self {
            snapshots_dir,
            documents,
            max_snapshots,
            auto_interval,
            index_cache: DashMap::new(),
            auto_tasks: DashMap::new(),
        })
    }

    fn canvas_dir(&self, canvas_path: &str) -> PathBuf {
        self.snapshots_dir.join(canvas_slug(canvas_path))
    }

    fn index_file(&self, canvas_path: &str) -> PathBuf {
        self.canvas_dir(canvas_path).join("index.json")
    }

    fn blob_file(&self, canvas_path: &str, snapshot_id: &str) -> PathBuf {
        self.canvas_dir(canvas_path)
            .join(format!("{snapshot_id}.json.lz4"))
    }

    fn load_index(&self, canvas_path: &str) -> Result<IndexCache> {
        if let Some(index) = self.index_cache.get(canvas_path) {
            return Ok(index.clone());
        }

        let file = self.index_file(canvas_path);
        let entries: Vec<SnapshotIndexEntry> = if file.exists() {
            let raw = fs::read_to_string(&file)?;
            serde_json::from_str(&raw).map_err(|e| AppError::CanvasDecode {
                path: canvas_path.to_string(),
                reason: format!("snapshot index: {e}"),
            })?
        } else {
            Vec::new()
        };

        let index = Arc::new(RwLock::new(entries));
        self.index_cache.insert(canvas_path.to_string(), index.clone());
        Ok(index)
    }

    fn persist_index(&self, canvas_path: &str, entries: &[SnapshotIndexEntry]) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(entries)?;
        atomic_write(&self.index_file(canvas_path), &serialized)
    }

    /// Capture a snapshot of the current document.
    ///
    /// An absent canvas yields an empty document rather than an error, so
    /// checkpoints can be taken pre-emptively. `created_by` defaults to the
    /// system identity for AUTO snapshots.
    pub fn create(
        &self,
        canvas_path: &str,
        snapshot_type: SnapshotType,
        options: CreateSnapshot,
    ) -> Result<Snapshot> {
        validate_canvas_path(canvas_path)?;
        let canvas_data = self.documents.read(canvas_path)?;

        let payload = serde_json::to_vec(&canvas_data)?;
        let created_by = options.created_by.unwrap_or_else(|| {
            if snapshot_type == SnapshotType::Auto {
                AUTO_CAPTURE_IDENTITY.to_string()
            } else {
                "user".to_string()
            }
        });

        let snapshot = Snapshot {
            info: SnapshotIndexEntry {
                id: uuid::Uuid::new_v4().to_string(),
                canvas_path: canvas_path.to_string(),
                timestamp: Utc::now(),
                snapshot_type,
                last_operation_id: options.last_operation_id,
                metadata: SnapshotMetadata {
                    description: options.description,
                    created_by,
                    tags: options.tags,
                    size_bytes: payload.len() as u64,
                },
            },
            canvas_data,
        };

        let serialized = serde_json::to_vec(&snapshot)?;
        let compressed = lz4::block::compress(&serialized, None, false)
            .map_err(|e| AppError::CompressionError(e.to_string()))?;
        atomic_write(&self.blob_file(canvas_path, &snapshot.info.id), &compressed)?;

        let index = self.load_index(canvas_path)?;
        {
            let mut entries = index.write();
            entries.push(snapshot.info.clone());
            self.prune_locked(canvas_path, &mut entries);
            self.persist_index(canvas_path, &entries[..])?;
        }

        debug!(
            canvas = canvas_path,
            snapshot = %snapshot.info.id,
            kind = ?snapshot_type,
            payload_bytes = snapshot.info.metadata.size_bytes,
            compressed_bytes = compressed.len(),
            "Snapshot created"
        );
        Ok(snapshot)
    }

    /// Delete oldest entries beyond `max_snapshots`. No type is exempt.
    fn prune_locked(&self, canvas_path: &str, entries: &mut Vec<SnapshotIndexEntry>) {
        while entries.len() > self.max_snapshots {
            let oldest = entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.timestamp)
                .map(|(i, _)| i);
            let Some(idx) = oldest else { break };
            let evicted = entries.remove(idx);
            let blob = self.blob_file(canvas_path, &evicted.id);
            if let Err(e) = fs::remove_file(&blob) {
                warn!(snapshot = %evicted.id, error = %e, "Failed to remove pruned snapshot blob");
            }
            debug!(
                canvas = canvas_path,
                snapshot = %evicted.id,
                "Snapshot pruned by retention"
            );
        }
    }

    /// Paginated snapshot metadata, newest first, served from the index
    /// only. Payloads are never touched.
    pub fn list(
        &self,
        canvas_path: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SnapshotIndexEntry>> {
        validate_canvas_path(canvas_path)?;
        let index = self.load_index(canvas_path)?;
        let entries = index.read();
        let mut sorted: Vec<SnapshotIndexEntry> = entries.clone();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(sorted.into_iter().skip(offset).take(limit).collect())
    }

    pub fn count(&self, canvas_path: &str) -> Result<usize> {
        validate_canvas_path(canvas_path)?;
        let index = self.load_index(canvas_path)?;
        let len = index.read().len();
        Ok(len)
    }

    /// Metadata for one snapshot, from the index only.
    pub fn get_entry(&self, canvas_path: &str, snapshot_id: &str) -> Result<Option<SnapshotIndexEntry>> {
        validate_canvas_path(canvas_path)?;
        let index = self.load_index(canvas_path)?;
        let entries = index.read();
        Ok(entries.iter().find(|e| e.id == snapshot_id).cloned())
    }

    /// Load and decompress one snapshot payload on demand.
    pub fn get(&self, canvas_path: &str, snapshot_id: &str) -> Result<Option<Snapshot>> {
        validate_canvas_path(canvas_path)?;
        if self.get_entry(canvas_path, snapshot_id)?.is_none() {
            return Ok(None);
        }

        let blob_path = self.blob_file(canvas_path, snapshot_id);
        if !blob_path.exists() {
            return Ok(None);
        }
        let compressed = fs::read(&blob_path)?;
        let serialized = lz4::block::decompress(&compressed, Some(MAX_DECOMPRESSED_SNAPSHOT))
            .map_err(|e| AppError::CompressionError(e.to_string()))?;
        let snapshot = serde_json::from_slice(&serialized).map_err(|e| AppError::CanvasDecode {
            path: canvas_path.to_string(),
            reason: format!("snapshot {snapshot_id}: {e}"),
        })?;
        Ok(Some(snapshot))
    }

    /// Most recent snapshot for a canvas, if any.
    pub fn get_latest(&self, canvas_path: &str) -> Result<Option<Snapshot>> {
        let latest = self
            .list(canvas_path, 1, 0)?
            .into_iter()
            .next();
        match latest {
            Some(entry) => self.get(canvas_path, &entry.id),
            None => Ok(None),
        }
    }

    /// Index entry with the greatest timestamp at or before `target_time`.
    pub fn find_at_or_before(
        &self,
        canvas_path: &str,
        target_time: DateTime<Utc>,
    ) -> Result<Option<SnapshotIndexEntry>> {
        validate_canvas_path(canvas_path)?;
        let index = self.load_index(canvas_path)?;
        let entries = index.read();
        Ok(entries
            .iter()
            .filter(|e| e.timestamp <= target_time)
            .max_by_key(|e| e.timestamp)
            .cloned())
    }

    /// Remove one snapshot (index entry and blob). Returns whether an
    /// entry existed.
    pub fn delete(&self, canvas_path: &str, snapshot_id: &str) -> Result<bool> {
        validate_canvas_path(canvas_path)?;
        let index = self.load_index(canvas_path)?;
        let mut entries = index.write();
        let before = entries.len();
        entries.retain(|e| e.id != snapshot_id);
        if entries.len() == before {
            return Ok(false);
        }
        self.persist_index(canvas_path, &entries[..])?;

        let blob = self.blob_file(canvas_path, snapshot_id);
        if blob.exists() {
            fs::remove_file(&blob)?;
        }
        Ok(true)
    }

    /// Drop all cached indexes, forcing reload from disk.
    pub fn clear_cache(&self) {
        self.index_cache.clear();
    }

    // ── auto-capture ──

    /// Start the periodic AUTO snapshot task for a canvas. Starting an
    /// already-running canvas is a no-op.
    pub fn start_auto(self: &Arc<Self>, canvas_path: &str) -> Result<()> {
        validate_canvas_path(canvas_path)?;
        // The entry guard makes check-then-spawn atomic, so concurrent
        // starts for one canvas cannot both spawn a task.
        let Entry::Vacant(slot) = self.auto_tasks.entry(canvas_path.to_string()) else {
            return Ok(());
        };

        let (stop, mut stopped) = watch::channel(false);
        let store = Arc::clone(self);
        let canvas = canvas_path.to_string();
        let interval = self.auto_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // auto-capture should wait a full interval first.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.create(&canvas, SnapshotType::Auto, CreateSnapshot::default()) {
                            Ok(snapshot) => debug!(
                                canvas = %canvas,
                                snapshot = %snapshot.info.id,
                                "Auto snapshot captured"
                            ),
                            Err(e) => warn!(canvas = %canvas, error = %e, "Auto snapshot failed"),
                        }
                    }
                    changed = stopped.changed() => {
                        // Either an explicit stop or the store dropping the
                        // sender ends the task.
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        slot.insert(AutoCaptureTask { stop, handle });
        info!(canvas = canvas_path, interval_secs = interval.as_secs(), "Auto-capture started");
        Ok(())
    }

    /// Stop the auto-capture task for a canvas and wait for it to finish.
    /// After this returns no further AUTO snapshot can fire. Stopping a
    /// canvas that was never started is a no-op.
    pub async fn stop_auto(&self, canvas_path: &str) {
        let Some((_, task)) = self.auto_tasks.remove(canvas_path) else {
            return;
        };
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            warn!(canvas = canvas_path, error = %e, "Auto-capture task join failed");
        }
        info!(canvas = canvas_path, "Auto-capture stopped");
    }

    /// Cancel every active auto-capture task. Used at shutdown.
    pub async fn stop_all(&self) -> usize {
        let canvases: Vec<String> = self.auto_tasks.iter().map(|e| e.key().clone()).collect();
        let count = canvases.len();
        for canvas in canvases {
            self.stop_auto(&canvas).await;
        }
        count
    }

    /// Canvases with an active auto-capture task.
    pub fn active_auto_captures(&self) -> Vec<String> {
        self.auto_tasks.iter().map(|e| e.key().clone()).collect()
    }
}
