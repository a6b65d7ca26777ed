//! The classification workflow engine.
//!
//! A four-node directed graph executes each run:
//!
//! ```text
//! init ──► classify ──► enhance ──► finalize   (entry: init, exit: finalize)
//!             └──────────────────► finalize
//! ```
//!
//! `classify → enhance` is taken when any page came back with pending
//! enhancement settings; otherwise the run goes straight to `finalize`.
//! The driver owns the per-run scratch directory: created before the graph
//! starts, removed on every exit path — success, stage error, or panic.

mod compose;
mod graph;
mod parse;
mod render;
mod stages;
pub mod state;

pub use compose::PromptComposer;
pub use graph::{Graph, Node, NoopObserver, Observer};
pub use render::{enhanced_image_path, page_image_path, PageRenderer, RenderError};
pub use state::{ClassificationPage, ClassificationState, EnhanceSettings, RunState};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::agent::Agent;
use crate::documents::DocumentsRepository;
use crate::error::WorkflowError;
use crate::prompts::PromptRegistry;
use crate::storage::BlobStore;

use stages::{ClassifyStage, EnhanceStage, FinalizeStage, InitStage};

/// Outcome of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub document_id: Uuid,
    pub filename: String,
    pub page_count: usize,
    pub state: ClassificationState,
    pub completed_at: DateTime<Utc>,
}

/// Executes classification runs. Owned by the classifications repository;
/// nothing outside the domain sees it.
pub struct ClassificationWorkflow {
    graph: Graph,
    model_name: String,
    provider_name: String,
}

impl ClassificationWorkflow {
    /// Wire the four stages into the graph. The same agent handle is
    /// shared; workers clone it per call, so no per-run construction is
    /// needed.
    pub fn new(
        documents: DocumentsRepository,
        blobs: Arc<dyn BlobStore>,
        renderer: Arc<PageRenderer>,
        prompts: PromptRegistry,
        agent: Arc<dyn Agent>,
    ) -> Self {
        let model_name = agent.model_name().to_string();
        let provider_name = agent.provider_name().to_string();

        let composer = PromptComposer::new(Arc::new(prompts));
        let graph = Graph::builder()
            .add_node(
                "init",
                Arc::new(InitStage::new(documents, blobs, Arc::clone(&renderer))),
            )
            .add_node(
                "classify",
                Arc::new(ClassifyStage::new(composer.clone(), Arc::clone(&agent))),
            )
            .add_node(
                "enhance",
                Arc::new(EnhanceStage::new(
                    composer.clone(),
                    Arc::clone(&agent),
                    renderer,
                )),
            )
            .add_node("finalize", Arc::new(FinalizeStage::new(composer, agent)))
            .add_edge("init", "classify")
            .add_conditional_edge("classify", "enhance", state::needs_enhance)
            .add_conditional_edge("classify", "finalize", |s| !state::needs_enhance(s))
            .add_edge("enhance", "finalize")
            .entry("init")
            .exit("finalize")
            .observer(Arc::new(NoopObserver))
            .build()
            .expect("workflow graph wiring is static and valid");

        Self {
            graph,
            model_name,
            provider_name,
        }
    }

    /// Model recorded as provenance on classification rows.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Provider recorded as provenance on classification rows.
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Run the full graph for one document.
    ///
    /// The scratch directory (`herald-classify-*` under the OS temp dir)
    /// lives exactly as long as this call: the `TempDir` guard removes it
    /// on return, early error return, and unwind alike.
    pub async fn execute(&self, document_id: Uuid) -> Result<WorkflowResult, WorkflowError> {
        let scratch = tempfile::Builder::new()
            .prefix("herald-classify-")
            .tempdir()
            .map_err(WorkflowError::render)?;
        info!(
            document_id = %document_id,
            scratch = %scratch.path().display(),
            "classification run starting"
        );

        let mut run_state = RunState::new();
        run_state.insert(state::DOCUMENT_ID, &document_id)?;
        run_state.insert(state::TEMP_DIR, &scratch.path())?;

        self.graph.run(&mut run_state).await?;

        let cls: ClassificationState = run_state.get(state::CLASSIFICATION_STATE)?;
        let filename: String = run_state.get(state::FILENAME)?;
        let page_count: usize = run_state.get(state::PAGE_COUNT)?;

        info!(document_id = %document_id, pages = page_count, "classification run complete");
        Ok(WorkflowResult {
            document_id,
            filename,
            page_count,
            state: cls,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use crate::storage::FsBlobStore;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct UnreachableAgent;

    #[async_trait]
    impl Agent for UnreachableAgent {
        fn model_name(&self) -> &str {
            "test-model"
        }

        fn provider_name(&self) -> &str {
            "test-provider"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, AgentError> {
            unreachable!()
        }

        async fn complete_with_image(&self, _p: &str, _i: &str) -> Result<String, AgentError> {
            unreachable!()
        }
    }

    fn scratch_dirs() -> BTreeSet<String> {
        std::fs::read_dir(std::env::temp_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|name| name.starts_with("herald-classify-"))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn failed_run_leaves_no_scratch_directory_behind() {
        let before = scratch_dirs();

        // A lazy pool never connects until used, so the init stage's
        // document lookup is the first thing to fail.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://127.0.0.1:1/unreachable")
            .expect("lazy pool");
        let blob_dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> =
            Arc::new(FsBlobStore::new(blob_dir.path()).await.unwrap());
        let renderer = Arc::new(PageRenderer::new(300));
        let documents = crate::documents::DocumentsRepository::new(
            pool.clone(),
            Arc::clone(&blobs),
            Arc::clone(&renderer),
        );

        let workflow = ClassificationWorkflow::new(
            documents,
            blobs,
            renderer,
            crate::prompts::PromptRegistry::new(pool),
            Arc::new(UnreachableAgent),
        );
        assert_eq!(workflow.model_name(), "test-model");
        assert_eq!(workflow.provider_name(), "test-provider");

        let err = workflow.execute(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::RenderFailed(_) | WorkflowError::DocumentNotFound { .. }
        ));

        // Whatever scratch directory the run created is gone again.
        let after = scratch_dirs();
        assert!(
            after.is_subset(&before),
            "scratch directories leaked: {:?}",
            after.difference(&before).collect::<Vec<_>>()
        );
    }
}
