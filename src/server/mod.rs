//! HTTP surface: accept creation requests, expose per-run progress for
//! polling, report health.

pub mod api;
#[allow(clippy::module_inception)]
pub mod server;

pub use api::{ApiError, AppState, SharedState};
pub use server::{build_router, build_state, start_server};
