//! Classify node: per-page parallel vision calls.
//!
//! Every page is examined in isolation — the prompt is composed once with
//! no running state, so no page's findings can bias another's. Workers
//! write to distinct page slots, which keeps the end-of-stage state
//! deterministic no matter what order the calls complete in.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::error::WorkflowError;
use crate::prompts::Stage;
use crate::workflow::compose::PromptComposer;
use crate::workflow::graph::Node;
use crate::workflow::parse;
use crate::workflow::state::{
    worker_count, ClassificationState, EnhanceSettings, RunState, CLASSIFICATION_STATE,
};

use super::png_data_uri;

/// Wire shape of a classify-stage model response.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    markings_found: Vec<String>,
    #[serde(default)]
    rationale: String,
    /// Informational only; the presence of `enhancements` is the signal
    /// the workflow acts on.
    #[serde(default)]
    enhance: bool,
    #[serde(default)]
    enhancements: Option<EnhanceSettings>,
}

/// Runs one vision call per page under the worker-count rule.
pub struct ClassifyStage {
    composer: PromptComposer,
    agent: Arc<dyn Agent>,
}

impl ClassifyStage {
    pub fn new(composer: PromptComposer, agent: Arc<dyn Agent>) -> Self {
        Self { composer, agent }
    }
}

#[async_trait]
impl Node for ClassifyStage {
    async fn run(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let mut cls: ClassificationState = state.get(CLASSIFICATION_STATE)?;

        // One prompt for every page; classify never sees running state.
        let prompt: Arc<str> = self
            .composer
            .compose(Stage::Classify, None)
            .await
            .map_err(WorkflowError::classify)?
            .into();

        let workers = worker_count(cls.pages.len());
        let findings: Vec<(usize, ClassifyResponse)> = stream::iter(
            cls.pages
                .iter()
                .enumerate()
                .map(|(index, page)| (index, page.page_number, page.image_path.clone()))
                .collect::<Vec<_>>(),
        )
        .map(|(index, page_number, image_path)| {
            let agent = Arc::clone(&self.agent);
            let prompt = Arc::clone(&prompt);
            async move {
                let bytes = tokio::fs::read(&image_path)
                    .await
                    .map_err(WorkflowError::classify)?;
                let image = png_data_uri(&bytes);
                drop(bytes);

                let answer = agent
                    .complete_with_image(&prompt, &image)
                    .await
                    .map_err(WorkflowError::classify)?;
                let response: ClassifyResponse =
                    parse::parse(&answer).map_err(WorkflowError::classify)?;
                debug!(
                    page = page_number,
                    markings = response.markings_found.len(),
                    enhance = response.enhance,
                    "page classified"
                );
                Ok::<_, WorkflowError>((index, response))
            }
        })
        .buffer_unordered(workers)
        .try_collect()
        .await?;

        for (index, response) in findings {
            let page = &mut cls.pages[index];
            page.markings_found = response.markings_found;
            page.rationale = response.rationale;
            // A neutral adjustment request would re-render an identical
            // image; treat it the same as no request.
            page.enhancements = response.enhancements.filter(|e| !e.is_neutral());
        }

        state.insert(CLASSIFICATION_STATE, &cls)?;
        Ok(())
    }
}
