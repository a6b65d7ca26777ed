//! HTTP composition root.
//!
//! Construction is explicit and leaves-first: pool → blob store → renderer
//! → prompt registry → agent → repositories → router. The classifications
//! repository internalizes its workflow engine, so nothing here imports a
//! workflow type.

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::LlmAgent;
use crate::classifications::ClassificationsRepository;
use crate::config::HeraldConfig;
use crate::documents::DocumentsRepository;
use crate::error::Error;
use crate::prompts::PromptRegistry;
use crate::storage::FsBlobStore;
use crate::workflow::{ClassificationWorkflow, PageRenderer};

/// Shared handler state. Cheap to clone: repositories hold a pool handle
/// and `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub documents: DocumentsRepository,
    pub classifications: ClassificationsRepository,
    pub prompts: PromptRegistry,
}

/// Domain error adapted to an HTTP response.
///
/// 4xx bodies carry the sentinel message; 5xx bodies are generic and the
/// full error (with its source chain) goes to the log instead.
pub struct ApiError(pub Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = if status.is_server_error() {
            error!(error = ?self.0, "request failed");
            json!({ "error": "internal server error" })
        } else {
            json!({ "error": self.0.to_string() })
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Startup failures are heterogeneous (DB, storage, provider, bind); a
/// boxed error keeps the composition root readable.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Build every component and return the application router.
pub async fn build(config: &HeraldConfig) -> Result<Router, BoxError> {
    let pool = crate::db::connect(&config.database_url).await?;
    crate::db::migrate(&pool).await?;

    let blobs = Arc::new(FsBlobStore::new(config.storage_root.clone()).await?);
    let renderer = Arc::new(PageRenderer::new(config.dpi));
    let prompts = PromptRegistry::new(pool.clone());
    let agent = Arc::new(LlmAgent::from_config(config)?);

    let documents = DocumentsRepository::new(pool.clone(), blobs.clone(), renderer.clone());
    let workflow = ClassificationWorkflow::new(
        documents.clone(),
        blobs,
        renderer,
        prompts.clone(),
        agent,
    );
    let classifications = ClassificationsRepository::new(pool, Arc::new(workflow));

    let state = AppState {
        documents,
        classifications,
        prompts,
    };

    Ok(Router::new()
        .nest("/api/documents", crate::documents::router())
        .nest("/api/classifications", crate::classifications::router())
        .nest("/api/prompts", crate::prompts::router())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Serve the router until ctrl-c.
pub async fn serve(config: &HeraldConfig) -> Result<(), BoxError> {
    let app = build(config).await?;
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "herald listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// 404 fallback body for unmatched routes.
async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
