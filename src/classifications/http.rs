//! HTTP handlers for `/api/classifications`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::pagination::{PageRequest, SearchRequest};
use crate::server::{ApiResult, AppState};

use super::model::{ClassificationFilters, UpdateClassification, ValidateClassification};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/search", post(search))
        .route("/document/{id}", get(find_by_document))
        // POST takes a *document* id and runs the workflow; the other verbs
        // take a classification id.
        .route("/{id}", get(find).post(classify).put(update).delete(delete))
        .route("/{id}/validate", post(validate))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .classifications
        .list(&page, &ClassificationFilters::default())
        .await?;
    Ok(Json(result))
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest<ClassificationFilters>>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .classifications
        .list(&req.page, &req.filters)
        .await?;
    Ok(Json(result))
}

async fn find(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.classifications.find(id).await?))
}

async fn find_by_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.classifications.find_by_document(id).await?))
}

/// Run the classification workflow against a document. Long-running: the
/// response arrives once the whole graph has executed and persisted.
async fn classify(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let classification = state.classifications.classify(document_id).await?;
    Ok((StatusCode::CREATED, Json(classification)))
}

async fn validate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<ValidateClassification>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.classifications.validate(id, cmd).await?))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(cmd): Json<UpdateClassification>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.classifications.update(id, cmd).await?))
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.classifications.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
