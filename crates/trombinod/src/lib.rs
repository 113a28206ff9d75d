//! trombinod — face recognition over HTTP.
//!
//! Thin orchestration over `trombino-core`: multipart/base64 request
//! shaping, worker-pool offload for the CPU-bound pipeline, and the
//! error mapping that keeps expected recognition outcomes as 200-level
//! decision objects.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use server::{build_router, start};
pub use state::AppState;
