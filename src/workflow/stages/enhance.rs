//! Enhance node: re-render flagged pages with adjustments and re-query.
//!
//! Eligibility is driven solely by `enhancements` being present on a page;
//! the stage clears the field after reprocessing, which is what makes a
//! re-entry onto this node a no-op — no page would be eligible.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::error::WorkflowError;
use crate::prompts::Stage;
use crate::workflow::compose::PromptComposer;
use crate::workflow::graph::Node;
use crate::workflow::render::PageRenderer;
use crate::workflow::state::{
    worker_count, ClassificationState, EnhanceSettings, RunState, CLASSIFICATION_STATE, TEMP_DIR,
};

use super::init::source_pdf_path;
use super::png_data_uri;

/// Wire shape of an enhance-stage model response.
#[derive(Debug, Deserialize)]
struct EnhanceResponse {
    #[serde(default)]
    markings_found: Vec<String>,
    #[serde(default)]
    rationale: String,
}

/// One re-render + vision call per flagged page.
pub struct EnhanceStage {
    composer: PromptComposer,
    agent: Arc<dyn Agent>,
    renderer: Arc<PageRenderer>,
}

impl EnhanceStage {
    pub fn new(
        composer: PromptComposer,
        agent: Arc<dyn Agent>,
        renderer: Arc<PageRenderer>,
    ) -> Self {
        Self {
            composer,
            agent,
            renderer,
        }
    }
}

/// The pages awaiting enhancement: `(slot index, page number, settings)`.
fn eligible_pages(cls: &ClassificationState) -> Vec<(usize, usize, EnhanceSettings)> {
    cls.pages
        .iter()
        .enumerate()
        .filter_map(|(index, page)| {
            page.enhancements
                .clone()
                .map(|settings| (index, page.page_number, settings))
        })
        .collect()
}

#[async_trait]
impl Node for EnhanceStage {
    async fn run(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let mut cls: ClassificationState = state.get(CLASSIFICATION_STATE)?;
        let temp_dir: PathBuf = state.get(TEMP_DIR)?;

        let eligible = eligible_pages(&cls);
        if eligible.is_empty() {
            return Ok(());
        }

        // Compose once, before any worker starts: the prompt carries the
        // current state snapshot, and workers will be mutating that state
        // while calls are in flight. Snapshotting up front is correctness,
        // not an optimization.
        let prompt: Arc<str> = self
            .composer
            .compose(Stage::Enhance, Some(&cls))
            .await
            .map_err(WorkflowError::enhance)?
            .into();

        let pdf_path = source_pdf_path(&temp_dir);
        let workers = worker_count(eligible.len());

        let results: Vec<(usize, PathBuf, EnhanceResponse)> = stream::iter(eligible)
            .map(|(index, page_number, settings)| {
                let agent = Arc::clone(&self.agent);
                let renderer = Arc::clone(&self.renderer);
                let prompt = Arc::clone(&prompt);
                let pdf_path = pdf_path.clone();
                let temp_dir = temp_dir.clone();
                async move {
                    let image_path = renderer
                        .render_page_with_settings(&pdf_path, page_number, &temp_dir, &settings)
                        .await
                        .map_err(WorkflowError::enhance)?;

                    let bytes = tokio::fs::read(&image_path)
                        .await
                        .map_err(WorkflowError::enhance)?;
                    let image = png_data_uri(&bytes);
                    drop(bytes);

                    let answer = agent
                        .complete_with_image(&prompt, &image)
                        .await
                        .map_err(WorkflowError::enhance)?;
                    let response: EnhanceResponse =
                        crate::workflow::parse::parse(&answer).map_err(WorkflowError::enhance)?;
                    debug!(
                        page = page_number,
                        markings = response.markings_found.len(),
                        "page re-examined"
                    );
                    Ok::<_, WorkflowError>((index, image_path, response))
                }
            })
            .buffer_unordered(workers)
            .try_collect()
            .await?;

        for (index, image_path, response) in results {
            let page = &mut cls.pages[index];
            page.image_path = image_path;
            page.markings_found = response.markings_found;
            page.rationale = response.rationale;
            // Clearing the flag records the page as processed.
            page.enhancements = None;
        }

        state.insert(CLASSIFICATION_STATE, &cls)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::ClassificationPage;

    fn flagged(page_number: usize, brightness: i32) -> ClassificationPage {
        let mut page =
            ClassificationPage::new(page_number, PathBuf::from(format!("page-{page_number}.png")));
        page.enhancements = Some(EnhanceSettings {
            brightness: Some(brightness),
            contrast: None,
            saturation: None,
        });
        page
    }

    #[test]
    fn only_flagged_pages_are_eligible() {
        let cls = ClassificationState::with_pages(vec![
            ClassificationPage::new(1, PathBuf::from("page-1.png")),
            flagged(2, 140),
            ClassificationPage::new(3, PathBuf::from("page-3.png")),
            flagged(4, 80),
        ]);

        let eligible = eligible_pages(&cls);
        let slots: Vec<usize> = eligible.iter().map(|(i, _, _)| *i).collect();
        let numbers: Vec<usize> = eligible.iter().map(|(_, n, _)| *n).collect();
        assert_eq!(slots, vec![1, 3]);
        assert_eq!(numbers, vec![2, 4]);
        assert_eq!(eligible[0].2.brightness, Some(140));
    }

    #[test]
    fn cleared_flags_make_a_rerun_a_noop() {
        let mut cls = ClassificationState::with_pages(vec![flagged(1, 140)]);
        assert_eq!(eligible_pages(&cls).len(), 1);

        // What the stage does after reprocessing a page.
        cls.pages[0].enhancements = None;
        assert!(eligible_pages(&cls).is_empty());
    }
}
