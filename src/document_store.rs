//! Atomic read/write of canvas documents.
//!
//! One JSON document per logical canvas path under
//! `<storage_root>/canvases/`. Reads of an absent canvas return an empty
//! document so checkpoints can be taken pre-emptively; writes go through a
//! temp-file-then-rename so a crash mid-write never yields a truncated
//! file. After every overwrite the prior content is kept as a timestamped
//! local backup, pruned to the most recent [`LOCAL_BACKUP_KEEP`] copies.
//! These backups are a disaster-recovery path independent of the snapshot
//! store.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::canvas::CanvasDocument;
use crate::errors::{AppError, Result};
use crate::validation::{canvas_slug, validate_canvas_path};

/// Rotating local backups retained per canvas.
pub const LOCAL_BACKUP_KEEP: usize = 3;

/// Atomic read/write of one JSON document per logical canvas path.
pub struct DocumentStore {
    canvases_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(storage_root: &Path) -> Result<Self> {
        let canvases_dir = storage_root.join("canvases");
        fs::create_dir_all(&canvases_dir)?;
        Ok(Self { canvases_dir })
    }

    /// Filesystem location of a canvas document.
    pub fn canvas_file(&self, canvas_path: &str) -> Result<PathBuf> {
        validate_canvas_path(canvas_path)?;
        Ok(self.canvases_dir.join(canvas_slug(canvas_path)))
    }

    /// Read a canvas document.
    ///
    /// A missing file reads as an empty `{nodes: [], edges: []}` document;
    /// malformed content fails with a decode error and is never repaired.
    pub fn read(&self, canvas_path: &str) -> Result<CanvasDocument> {
        let file = self.canvas_file(canvas_path)?;
        if !file.exists() {
            return Ok(CanvasDocument::default());
        }

        let raw = fs::read_to_string(&file)?;
        serde_json::from_str(&raw).map_err(|e| AppError::CanvasDecode {
            path: canvas_path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Write a canvas document atomically, retaining a rotating backup of
    /// the prior content.
    pub fn write(&self, canvas_path: &str, document: &CanvasDocument) -> Result<()> {
        let file = self.canvas_file(canvas_path)?;
        let serialized = serde_json::to_vec_pretty(document)?;

        // Save the prior content before it is replaced.
        if file.exists() {
            let backup = file.with_file_name(format!(
                "{}.backup.{}",
                file.file_name().unwrap_or_default().to_string_lossy(),
                Utc::now().timestamp_millis()
            ));
            if let Err(e) = fs::copy(&file, &backup) {
                // The atomic write below still protects the live document.
                warn!(canvas = canvas_path, error = %e, "Failed to write local backup");
            } else {
                self.prune_backups(&file);
            }
        }

        atomic_write(&file, &serialized)?;
        debug!(
            canvas = canvas_path,
            bytes = serialized.len(),
            "Canvas written"
        );
        Ok(())
    }

    /// List existing local backup files for a canvas, newest first.
    pub fn local_backups(&self, canvas_path: &str) -> Result<Vec<PathBuf>> {
        let file = self.canvas_file(canvas_path)?;
        Ok(Self::backup_files(&file))
    }

    fn backup_files(file: &Path) -> Vec<PathBuf> {
        let Some(parent) = file.parent() else {
            return Vec::new();
        };
        let prefix = format!(
            "{}.backup.",
            file.file_name().unwrap_or_default().to_string_lossy()
        );
        let mut backups: Vec<PathBuf> = fs::read_dir(parent)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();
        // Millisecond suffix sorts lexicographically within the same epoch width.
        backups.sort();
        backups.reverse();
        backups
    }

    fn prune_backups(&self, file: &Path) {
        for stale in Self::backup_files(file).into_iter().skip(LOCAL_BACKUP_KEEP) {
            if let Err(e) = fs::remove_file(&stale) {
                warn!(path = ?stale, error = %e, "Failed to prune local backup");
            }
        }
    }
}

/// Write bytes via temp-file-then-rename so readers never observe a
/// partially written file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::StorageError(format!("no parent directory for {path:?}")))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension(format!(
        "tmp.{}",
        uuid::Uuid::new_v4().simple()
    ));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
