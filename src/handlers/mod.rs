//! HTTP handler modules, split by domain, plus the shared state manager
//! and router construction.

pub mod health;
pub mod history;
pub mod recovery;
pub mod router;
pub mod snapshots;
pub mod state;

pub use router::{AppState, build_api_routes, build_public_routes};
pub use state::RecoveryManager;
