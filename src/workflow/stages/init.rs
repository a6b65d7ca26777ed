//! Init node: fetch the document, stage the PDF, render every page.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::documents::DocumentsRepository;
use crate::error::{Error, WorkflowError};
use crate::storage::BlobStore;
use crate::workflow::graph::Node;
use crate::workflow::render::{page_image_path, PageRenderer};
use crate::workflow::state::{
    ClassificationPage, ClassificationState, RunState, CLASSIFICATION_STATE, DOCUMENT_ID,
    FILENAME, PAGE_COUNT, TEMP_DIR,
};

/// Name of the staged source PDF inside the scratch directory.
const SOURCE_PDF: &str = "source.pdf";

/// Seeds the run: looks the document up, streams its blob into the scratch
/// directory, renders all pages concurrently, and writes the initial
/// [`ClassificationState`] (pages with paths only, findings empty).
pub struct InitStage {
    documents: DocumentsRepository,
    blobs: Arc<dyn BlobStore>,
    renderer: Arc<PageRenderer>,
}

impl InitStage {
    pub fn new(
        documents: DocumentsRepository,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<PageRenderer>,
    ) -> Self {
        Self {
            documents,
            blobs,
            renderer,
        }
    }
}

#[async_trait]
impl Node for InitStage {
    async fn run(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let document_id: Uuid = state.get(DOCUMENT_ID)?;
        let temp_dir: PathBuf = state.get(TEMP_DIR)?;

        let document = self.documents.find(document_id).await.map_err(|e| match e {
            Error::NotFound => WorkflowError::DocumentNotFound { id: document_id },
            other => WorkflowError::render(other),
        })?;

        // Stream the blob to disk; pdfium needs a filesystem path and the
        // scratch file doubles as the enhance stage's render source.
        let pdf_path = temp_dir.join(SOURCE_PDF);
        let mut reader = self
            .blobs
            .download(&document.storage_key)
            .await
            .map_err(WorkflowError::render)?;
        let mut file = tokio::fs::File::create(&pdf_path)
            .await
            .map_err(WorkflowError::render)?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(WorkflowError::render)?;

        let page_count = self
            .renderer
            .render_all(&pdf_path, &temp_dir)
            .await
            .map_err(WorkflowError::render)?;

        info!(
            document_id = %document_id,
            pages = page_count,
            "document staged and rendered"
        );

        let pages = (1..=page_count)
            .map(|n| ClassificationPage::new(n, page_image_path(&temp_dir, n)))
            .collect();
        state.insert(CLASSIFICATION_STATE, &ClassificationState::with_pages(pages))?;
        state.insert(FILENAME, &document.filename)?;
        state.insert(PAGE_COUNT, &page_count)?;
        Ok(())
    }
}

/// Path of the staged source PDF for a given scratch directory.
pub fn source_pdf_path(temp_dir: &std::path::Path) -> PathBuf {
    temp_dir.join(SOURCE_PDF)
}
