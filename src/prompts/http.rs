//! HTTP handlers for `/api/prompts`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::pagination::{PageRequest, SearchRequest};
use crate::server::{ApiResult, AppState};

use super::model::{CreatePrompt, PromptFilters, Stage, UpdatePrompt};
use super::registry::PromptSource as _;

pub fn router() -> Router<AppState> {
    // The stage routes live under the static `/stages` prefix: a sibling
    // `/{stage}/...` registration would clash with `/{id}` (one param name
    // per path slot).
    Router::new()
        .route("/", get(list).post(create))
        .route("/stages", get(stages))
        .route("/stages/{stage}/instructions", get(instructions))
        .route("/stages/{stage}/spec", get(spec))
        .route("/search", post(search))
        .route("/{id}", get(find).put(update).delete(delete))
        .route("/{id}/activate", post(activate))
        .route("/{id}/deactivate", post(deactivate))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .prompts
        .list(&page, &PromptFilters::default())
        .await?;
    Ok(Json(result))
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest<PromptFilters>>,
) -> ApiResult<impl IntoResponse> {
    let result = state.prompts.list(&req.page, &req.filters).await?;
    Ok(Json(result))
}

async fn stages(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.prompts.stages())
}

async fn find(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.prompts.find(id).await?))
}

/// Effective instructions for a stage (active override or default).
async fn instructions(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let stage: Stage = stage.parse()?;
    let content = state.prompts.instructions(stage).await?;
    Ok(Json(json!({ "stage": stage, "content": content })))
}

/// The immutable output spec for a stage.
async fn spec(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let stage: Stage = stage.parse()?;
    Ok(Json(json!({ "stage": stage, "content": state.prompts.spec(stage) })))
}

async fn create(
    State(state): State<AppState>,
    Json(cmd): Json<CreatePrompt>,
) -> ApiResult<impl IntoResponse> {
    let prompt = state.prompts.create(cmd).await?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdatePrompt>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.prompts.update(id, cmd).await?))
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.prompts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.prompts.activate(id).await?))
}

async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.prompts.deactivate(id).await?))
}
