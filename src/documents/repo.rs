//! Documents repository.

use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::pagination::{PageRequest, PageResult};
use crate::storage::{self, BlobReader, BlobStore};
use crate::workflow::PageRenderer;

use super::model::{Document, DocumentFilters};

/// An upload accepted from the HTTP surface.
#[derive(Debug)]
pub struct DocumentUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// CRUD over the `documents` table plus blob-store coordination.
#[derive(Clone)]
pub struct DocumentsRepository {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<PageRenderer>,
}

impl DocumentsRepository {
    pub fn new(pool: PgPool, blobs: Arc<dyn BlobStore>, renderer: Arc<PageRenderer>) -> Self {
        Self {
            pool,
            blobs,
            renderer,
        }
    }

    /// Register an uploaded PDF: probe its page count, store the blob,
    /// insert the row with status `pending`.
    ///
    /// The page-count probe also rejects files that are not openable PDFs
    /// before anything is persisted.
    pub async fn create(&self, upload: DocumentUpload) -> Result<Document, Error> {
        let page_count = self.probe_page_count(&upload.bytes).await?;

        let id = Uuid::new_v4();
        let storage_key = storage::document_key(id, &upload.filename);
        self.blobs.upload(&storage_key, &upload.bytes).await?;

        let result = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, storage_key, filename, content_type, size_bytes, page_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&storage_key)
        .bind(&upload.filename)
        .bind(&upload.content_type)
        .bind(upload.bytes.len() as i64)
        .bind(page_count)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(doc) => {
                info!(document_id = %doc.id, pages = ?doc.page_count, "document registered");
                Ok(doc)
            }
            Err(e) => {
                // Roll the blob back so a failed insert leaves no orphan.
                if let Err(cleanup) = self.blobs.delete(&storage_key).await {
                    warn!(key = %storage_key, error = %cleanup, "failed to clean up blob after insert failure");
                }
                Err(e.into())
            }
        }
    }

    pub async fn find(&self, id: Uuid) -> Result<Document, Error> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Paged listing with optional filename search and status filter.
    pub async fn list(
        &self,
        page: &PageRequest,
        filters: &DocumentFilters,
    ) -> Result<PageResult<Document>, Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM documents");
        push_filters(&mut query, filters);
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ").push_bind(page.size());
        query.push(" OFFSET ").push_bind(page.offset());

        let items = query
            .build_query_as::<Document>()
            .fetch_all(&self.pool)
            .await?;
        Ok(PageResult::new(items, page, total))
    }

    /// Open the original PDF for a streamed download. The caller drives
    /// the reader; nothing is buffered here.
    pub async fn download(&self, id: Uuid) -> Result<(Document, BlobReader), Error> {
        let doc = self.find(id).await?;
        let reader = self.blobs.download(&doc.storage_key).await?;
        Ok((doc, reader))
    }

    /// Delete the row (classification cascades) and then the blob.
    ///
    /// A blob-store failure after the row is gone is compensation, not a
    /// user error: it is logged and the delete still succeeds.
    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let storage_key: String =
            sqlx::query_scalar("DELETE FROM documents WHERE id = $1 RETURNING storage_key")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        if let Err(e) = self.blobs.delete(&storage_key).await {
            warn!(document_id = %id, key = %storage_key, error = %e, "blob removal failed after document delete");
        }
        info!(document_id = %id, "document deleted");
        Ok(())
    }

    /// Open the uploaded bytes with the renderer to count pages, via a
    /// throwaway temp file (pdfium needs a filesystem path).
    async fn probe_page_count(&self, bytes: &[u8]) -> Result<i32, Error> {
        let tmp = tempfile::Builder::new()
            .prefix("herald-upload-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| Error::BadRequest(format!("failed to stage upload: {e}")))?;
        tokio::fs::write(tmp.path(), bytes)
            .await
            .map_err(|e| Error::BadRequest(format!("failed to stage upload: {e}")))?;

        let pages = self
            .renderer
            .page_count(tmp.path())
            .await
            .map_err(|e| Error::BadRequest(format!("not a readable PDF: {e}")))?;
        Ok(pages as i32)
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &DocumentFilters) {
    let mut prefix = " WHERE ";
    if let Some(ref search) = filters.search {
        builder
            .push(prefix)
            .push("filename ILIKE ")
            .push_bind(format!("%{search}%"));
        prefix = " AND ";
    }
    if let Some(status) = filters.status {
        builder
            .push(prefix)
            .push("status = ")
            .push_bind(status.as_str());
    }
}
