//! Canvas path validation and filesystem namespacing.
//!
//! Every logical canvas path is validated before any store touches the
//! filesystem, and mapped to a flat directory slug so each canvas owns an
//! independent namespace for its log and snapshots.

use crate::errors::{AppError, Result};

/// Maximum accepted length for a logical canvas path.
pub const MAX_CANVAS_PATH_LEN: usize = 512;

/// Validate a logical canvas path.
///
/// Rejects empty paths, absolute paths, parent-directory traversal and
/// control characters. Returns the path unchanged on success so call sites
/// can validate inline.
pub fn validate_canvas_path(path: &str) -> Result<&str> {
    if path.is_empty() {
        return Err(AppError::InvalidCanvasPath("(empty)".to_string()));
    }
    if path.len() > MAX_CANVAS_PATH_LEN {
        let prefix: String = path.chars().take(32).collect();
        return Err(AppError::InvalidCanvasPath(format!(
            "{}... ({} bytes, max {})",
            prefix,
            path.len(),
            MAX_CANVAS_PATH_LEN
        )));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(AppError::InvalidCanvasPath(path.to_string()));
    }
    if path.contains("..") {
        return Err(AppError::InvalidCanvasPath(path.to_string()));
    }
    if path.chars().any(|c| c.is_control()) {
        return Err(AppError::InvalidCanvasPath(path.to_string()));
    }
    Ok(path)
}

/// Map a validated canvas path to a single-component directory slug.
///
/// Path separators are escaped rather than stripped so distinct canvas
/// paths cannot collide: `_` -> `__`, `/` and `\` -> `_s`.
pub fn canvas_slug(path: &str) -> String {
    let mut slug = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '_' => slug.push_str("__"),
            '/' | '\\' => slug.push_str("_s"),
            other => slug.push(other),
        }
    }
    slug
}
