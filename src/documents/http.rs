//! HTTP handlers for `/api/documents`.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::Error;
use crate::pagination::{PageRequest, SearchRequest};
use crate::server::{ApiError, ApiResult, AppState};

use super::model::DocumentFilters;
use super::repo::DocumentUpload;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(upload))
        .route("/search", post(search))
        .route("/{id}", get(find).delete(delete))
        .route("/{id}/download", get(download))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .documents
        .list(&page, &DocumentFilters::default())
        .await?;
    Ok(Json(result))
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest<DocumentFilters>>,
) -> ApiResult<impl IntoResponse> {
    let result = state.documents.list(&req.page, &req.filters).await?;
    Ok(Json(result))
}

async fn find(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.documents.find(id).await?))
}

/// Accept a single-file multipart upload under the `file` field.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(Error::BadRequest(format!("malformed multipart body: {e}"))))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(sanitize_filename)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "upload.pdf".to_string());
        let content_type = field
            .content_type()
            .unwrap_or("application/pdf")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError(Error::BadRequest(format!("failed to read upload: {e}"))))?;

        if bytes.is_empty() {
            return Err(ApiError(Error::BadRequest("empty upload".into())));
        }

        let doc = state
            .documents
            .create(DocumentUpload {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            })
            .await?;
        return Ok((StatusCode::CREATED, Json(doc)));
    }

    Err(ApiError(Error::BadRequest(
        "multipart body must contain a 'file' field".into(),
    )))
}

/// Stream the PDF back without buffering it; scans run to hundreds of
/// megabytes.
async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let (doc, reader) = state.documents.download(id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, doc.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", doc.filename),
            ),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    ))
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.documents.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Strip any path components a client sneaks into the filename, plus
/// control characters and double quotes (the name is later interpolated
/// into a quoted Content-Disposition value).
fn sanitize_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn sanitize_strips_paths_and_control_chars() {
        assert_eq!(sanitize_filename("scan.pdf"), "scan.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("c:\\docs\\scan.pdf"), "scan.pdf");
        assert_eq!(sanitize_filename("a\nb.pdf"), "ab.pdf");
    }

    #[test]
    fn sanitize_strips_quotes_for_the_disposition_header() {
        assert_eq!(sanitize_filename("a\".pdf"), "a.pdf");
        assert_eq!(sanitize_filename("\"quoted\".pdf"), "quoted.pdf");
    }
}
