//! Shared application state and the worker-pool offload helper.

use crate::config::Config;
use crate::error::ApiError;
use std::sync::Arc;
use trombino_core::{EmbeddingProvider, MatchPolicy, ModelInfo, QualityGate, VectorIndex};

/// State shared by every request handler.
///
/// The provider and index are injected as explicit dependencies, scoped
/// to the application lifetime; nothing here is process-global.
pub struct AppState {
    pub config: Config,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub policy: MatchPolicy,
    pub gate: QualityGate,
    pub model_info: ModelInfo,
}

impl AppState {
    pub fn new(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let policy = config.match_policy();
        let gate = QualityGate::new(config.quality_thresholds());
        let model_info = provider.info();
        Self { config, provider, index, policy, gate, model_info }
    }
}

/// Run CPU-bound work (image decode, quality assessment, inference,
/// index scans) on the blocking pool so the dispatch loop stays free,
/// bounded by the configured per-request deadline. On timeout nothing
/// is persisted beyond what the closure already completed; a timed-out
/// closure's eventual inserts-in-progress do not exist, because each
/// insert is atomic in the store.
pub async fn run_blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    let deadline = state.config.request_timeout();
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(work)).await {
        Err(_) => Err(ApiError::Timeout),
        Ok(Err(join)) => Err(ApiError::Internal(format!("worker task failed: {join}"))),
        Ok(Ok(result)) => result,
    }
}
