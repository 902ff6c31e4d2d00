//! Configuration management for canvas-rewind.
//!
//! All configurable parameters in one place with environment variable
//! overrides. Sensible defaults, configurable in production.

use std::env;
use std::path::PathBuf;
use tracing::info;

/// Server configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: 127.0.0.1)
    pub host: String,

    /// Server port (default: 3040)
    pub port: u16,

    /// Root directory for canvases, operation logs and snapshots
    /// (default: ./canvas_rewind_data)
    pub storage_root: PathBuf,

    /// Maximum recorded operations retained per canvas (default: 100).
    /// Oldest entries are evicted beyond this count.
    pub max_history_per_canvas: usize,

    /// Auto-capture snapshot interval in seconds (default: 300)
    pub auto_interval_secs: u64,

    /// Maximum snapshots retained per canvas (default: 50).
    /// Retention pruning runs after every snapshot create.
    pub max_snapshots: usize,

    /// Whether rollback takes a safety checkpoint when the request does
    /// not say either way (default: true)
    pub create_backup_default: bool,

    /// Whether rollback skips external graph reconciliation when the
    /// request does not say either way (default: false)
    pub preserve_graph_default: bool,

    /// Maximum concurrent HTTP requests (default: 200)
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            storage_root: PathBuf::from("./canvas_rewind_data"),
            max_history_per_canvas: 100,
            auto_interval_secs: 300, // 5 minutes
            max_snapshots: 50,
            create_backup_default: true,
            preserve_graph_default: false,
            max_concurrent_requests: 200,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("REWIND_HOST") {
            config.host = val;
        }

        if let Ok(val) = env::var("REWIND_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = env::var("REWIND_STORAGE_PATH") {
            config.storage_root = PathBuf::from(val);
        }

        if let Ok(val) = env::var("REWIND_MAX_HISTORY") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_history_per_canvas = n.max(1);
            }
        }

        if let Ok(val) = env::var("REWIND_AUTO_INTERVAL") {
            if let Ok(n) = val.parse::<u64>() {
                config.auto_interval_secs = n.max(1);
            }
        }

        if let Ok(val) = env::var("REWIND_MAX_SNAPSHOTS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_snapshots = n.max(1);
            }
        }

        if let Ok(val) = env::var("REWIND_CREATE_BACKUP") {
            config.create_backup_default = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = env::var("REWIND_PRESERVE_GRAPH") {
            config.preserve_graph_default = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = env::var("REWIND_MAX_CONCURRENT") {
            if let Ok(n) = val.parse() {
                config.max_concurrent_requests = n;
            }
        }

        config
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!("   Listen: {}:{}", self.host, self.port);
        info!("   Storage root: {:?}", self.storage_root);
        info!("   Max history per canvas: {}", self.max_history_per_canvas);
        info!("   Max snapshots per canvas: {}", self.max_snapshots);
        info!("   Auto-capture interval: {}s", self.auto_interval_secs);
        info!(
            "   Rollback defaults: create_backup={}, preserve_graph={}",
            self.create_backup_default, self.preserve_graph_default
        );
        info!("   Max concurrent requests: {}", self.max_concurrent_requests);
    }
}

/// Environment variable documentation, printed by `--env-help`.
pub fn print_env_help() {
    println!("canvas-rewind Configuration Environment Variables:");
    println!();
    println!("  REWIND_HOST            - Bind address (default: 127.0.0.1)");
    println!("  REWIND_PORT            - Server port (default: 3040)");
    println!("  REWIND_STORAGE_PATH    - Storage directory (default: ./canvas_rewind_data)");
    println!("  REWIND_MAX_HISTORY     - Max operations kept per canvas (default: 100)");
    println!("  REWIND_AUTO_INTERVAL   - Auto-snapshot interval seconds (default: 300)");
    println!("  REWIND_MAX_SNAPSHOTS   - Max snapshots kept per canvas (default: 50)");
    println!("  REWIND_CREATE_BACKUP   - Default for rollback checkpointing (default: true)");
    println!("  REWIND_PRESERVE_GRAPH  - Default for skipping graph sync (default: false)");
    println!("  REWIND_MAX_CONCURRENT  - Max concurrent requests (default: 200)");
    println!();
    println!("  RUST_LOG               - Log level (e.g., info, debug, trace)");
    println!();
}
