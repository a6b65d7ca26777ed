//! Prompt composition: instructions + spec + optional running state.

use std::sync::Arc;

use crate::error::{Error, WorkflowError};
use crate::prompts::{PromptSource, Stage};

use super::state::ClassificationState;

/// Builds the single model-facing prompt for a stage.
#[derive(Clone)]
pub struct PromptComposer {
    source: Arc<dyn PromptSource>,
}

impl PromptComposer {
    pub fn new(source: Arc<dyn PromptSource>) -> Self {
        Self { source }
    }

    /// Effective instructions, the immutable spec, and — when `state` is
    /// given — a pretty-printed JSON snapshot of the running state for the
    /// model to reason over.
    pub async fn compose(
        &self,
        stage: Stage,
        state: Option<&ClassificationState>,
    ) -> Result<String, Error> {
        let instructions = self.source.instructions(stage).await?;
        let state_json = state
            .map(serde_json::to_string_pretty)
            .transpose()
            .map_err(|e| {
                Error::Workflow(WorkflowError::State(format!(
                    "failed to serialize classification state: {e}"
                )))
            })?;
        Ok(compose_parts(
            &instructions,
            self.source.spec(stage),
            state_json.as_deref(),
        ))
    }
}

/// Pure assembly of the prompt halves.
fn compose_parts(instructions: &str, spec: &str, state_json: Option<&str>) -> String {
    let mut prompt = format!("{instructions}\n\n{spec}");
    if let Some(json) = state_json {
        prompt.push_str("\n\nCurrent classification state:\n\n");
        prompt.push_str(json);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state::{ClassificationPage, ClassificationState};
    use std::path::PathBuf;

    #[test]
    fn stateless_prompt_is_instructions_then_spec() {
        let prompt = compose_parts("read the page", "answer in JSON", None);
        assert_eq!(prompt, "read the page\n\nanswer in JSON");
    }

    #[tokio::test]
    async fn builtin_prompts_compose_instructions_then_spec() {
        use crate::prompts::{BuiltinPrompts, Stage};

        let composer = PromptComposer::new(std::sync::Arc::new(BuiltinPrompts));
        let prompt = composer.compose(Stage::Classify, None).await.unwrap();

        assert!(prompt.contains("classification analyst"));
        assert!(prompt.contains("\"markings_found\""));
        assert!(!prompt.contains("Current classification state"));

        let state = ClassificationState::default();
        let with_state = composer
            .compose(Stage::Finalize, Some(&state))
            .await
            .unwrap();
        assert!(with_state.contains("Current classification state"));
        assert!(with_state.contains("\"pages\": []"));
    }

    #[test]
    fn state_snapshot_is_appended_with_header() {
        let state = ClassificationState::with_pages(vec![ClassificationPage::new(
            1,
            PathBuf::from("page-1.png"),
        )]);
        let json = serde_json::to_string_pretty(&state).unwrap();
        let prompt = compose_parts("read", "spec", Some(&json));

        assert!(prompt.starts_with("read\n\nspec"));
        assert!(prompt.contains("\n\nCurrent classification state:\n\n"));
        assert!(prompt.contains("\"page_number\": 1"));
    }
}
