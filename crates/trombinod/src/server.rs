//! Router assembly and daemon startup.

use crate::config::Config;
use crate::routes::{self, admin, analyze, enrollment, identify};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use trombino_core::{OnnxProvider, VectorIndex};
use trombino_store::{MemoryIndex, SqliteIndex};

/// Build the application router over prepared state.
///
/// Kept separate from [`start`] so integration tests can drive the full
/// HTTP surface with stub providers and an in-memory index.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.enable_cors {
        // Permissive on purpose: the enrollment UI is a browser app
        // served from a different origin.
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let api = Router::new()
        .route("/register", post(enrollment::register))
        .route("/register-multi", post(enrollment::register_multi))
        .route("/identify", post(identify::identify))
        .route("/identify-base64", post(identify::identify_base64))
        .route("/verify", post(identify::verify))
        .route("/analyze", post(analyze::analyze))
        .route("/analyze-base64", post(analyze::analyze_base64))
        .route("/people", get(admin::people))
        .route("/people/{person}", delete(admin::remove_person))
        .route("/records", get(admin::records));

    Router::new()
        .route("/", get(routes::status))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load models, open the index, and serve until SIGTERM/Ctrl-C.
pub async fn start(config: Config) -> anyhow::Result<()> {
    let analyzer_path = config.analyzer_model_path();
    let analyzer = analyzer_path.exists().then_some(analyzer_path);
    let provider = Arc::new(OnnxProvider::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
        analyzer.as_deref(),
    )?);

    let index: Arc<dyn VectorIndex> = match config.index_backend.as_str() {
        "memory" => {
            tracing::warn!("using in-memory index; enrollments will not survive a restart");
            Arc::new(MemoryIndex::new())
        }
        "sqlite" => Arc::new(SqliteIndex::open(&config.db_path)?),
        other => anyhow::bail!("unknown index backend {other:?} (expected \"sqlite\" or \"memory\")"),
    };

    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(config, provider, index));
    let app = build_router(state);

    tracing::info!(%addr, "trombinod listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("trombinod shut down");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
