//! Self-hostable todo backend: REST endpoints plus a per-owner change feed.

pub mod api;
pub mod app_state;
pub mod config;

pub use api::build_router;
pub use app_state::AppState;
