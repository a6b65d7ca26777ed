//! Error types for herald.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Error`] — domain-level: the sentinels the HTTP layer maps to status
//!   codes (`NotFound` → 404, `Duplicate`/`InvalidStatus` → 409,
//!   `InvalidStage` → 400, everything else → 500). The mapping lives here,
//!   next to the variants, so the transport layer stays a thin translation.
//!
//! * [`WorkflowError`] — a classification run failed. Each variant names the
//!   stage that aborted the run; the first worker error in a parallel group
//!   is carried as the wrapped cause. Workflow errors surface to clients as
//!   500s through the `Error::Workflow` wrapper.

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

/// Domain errors returned by repositories and decoded request boundaries.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested row does not exist.
    #[error("resource not found")]
    NotFound,

    /// A unique constraint was violated (e.g. duplicate prompt name).
    #[error("a resource with the same unique value already exists")]
    Duplicate,

    /// A guarded document-status transition found the document in the wrong
    /// state (validate/update require `review`).
    #[error("document is not in a reviewable state")]
    InvalidStatus,

    /// A stage string outside `classify | enhance | finalize`.
    #[error("invalid stage: '{0}' (expected classify, enhance, or finalize)")]
    InvalidStage(String),

    /// The classification workflow aborted.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Database failure that is not a recognised sentinel.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Blob store failure.
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Malformed request body (multipart decode, missing field, …).
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// HTTP status for this error. Handlers call this and nothing else;
    /// keeping the table here keeps transport concerns out of the domain.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Duplicate | Error::InvalidStatus => StatusCode::CONFLICT,
            Error::InvalidStage(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Workflow(WorkflowError::DocumentNotFound { .. }) => StatusCode::NOT_FOUND,
            Error::Workflow(_) | Error::Database(_) | Error::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Translate a sqlx error into the domain sentinel it represents.
///
/// `RowNotFound` becomes [`Error::NotFound`]; a Postgres unique violation
/// (SQLSTATE 23505) becomes [`Error::Duplicate`]; anything else is passed
/// through as [`Error::Database`].
impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Error::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => Error::Duplicate,
            _ => Error::Database(e),
        }
    }
}

/// Errors that abort a classification run.
///
/// The workflow driver wraps each stage's failure in the stage's sentinel;
/// within a bounded worker group the first error cancels the siblings and
/// becomes the group's result. Scratch-directory cleanup happens regardless.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The document targeted by the run does not exist.
    #[error("document {id} not found")]
    DocumentNotFound { id: Uuid },

    /// Blob read, PDF open, page extraction, or image write failed.
    #[error("page rendering failed: {0}")]
    RenderFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A per-page classify worker failed.
    #[error("classify stage failed: {0}")]
    ClassifyFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A per-page enhance worker failed.
    #[error("enhance stage failed: {0}")]
    EnhanceFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The synthesis inference or its parse failed.
    #[error("finalize stage failed: {0}")]
    FinalizeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A workflow node read a state-bag key that was absent or mistyped.
    /// Always a programming error, never an input error.
    #[error("workflow state error: {0}")]
    State(String),
}

impl WorkflowError {
    pub fn render(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        WorkflowError::RenderFailed(Box::new(e))
    }

    pub fn classify(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        WorkflowError::ClassifyFailed(Box::new(e))
    }

    pub fn enhance(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        WorkflowError::EnhanceFailed(Box::new(e))
    }

    pub fn finalize(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        WorkflowError::FinalizeFailed(Box::new(e))
    }
}

/// Raised by the response parser when neither the raw text nor a fenced
/// block decodes as the expected JSON shape. Callers wrap it in the stage
/// sentinel; the raw text rides along for diagnostics.
#[derive(Debug, Error)]
#[error("failed to parse model response as JSON: {detail}\nraw response:\n{raw}")]
pub struct ParseError {
    pub detail: String,
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_domain_table() {
        assert_eq!(Error::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Duplicate.status(), StatusCode::CONFLICT);
        assert_eq!(Error::InvalidStatus.status(), StatusCode::CONFLICT);
        assert_eq!(
            Error::InvalidStage("draft".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Workflow(WorkflowError::DocumentNotFound { id: Uuid::nil() }).status(),
            StatusCode::NOT_FOUND
        );
        let classify = WorkflowError::classify(std::io::Error::other("boom"));
        assert_eq!(
            Error::Workflow(classify).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_translates_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound));
    }
}
