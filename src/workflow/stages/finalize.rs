//! Finalize node: synthesize the document-level classification.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::agent::Agent;
use crate::classifications::Confidence;
use crate::error::WorkflowError;
use crate::prompts::Stage;
use crate::workflow::compose::PromptComposer;
use crate::workflow::graph::Node;
use crate::workflow::parse;
use crate::workflow::state::{ClassificationState, RunState, CLASSIFICATION_STATE};

/// Wire shape of a finalize-stage model response.
#[derive(Debug, Deserialize)]
struct FinalizeResponse {
    classification: String,
    confidence: Confidence,
    #[serde(default)]
    rationale: String,
}

/// A single text-only inference over the full per-page findings.
pub struct FinalizeStage {
    composer: PromptComposer,
    agent: Arc<dyn Agent>,
}

impl FinalizeStage {
    pub fn new(composer: PromptComposer, agent: Arc<dyn Agent>) -> Self {
        Self { composer, agent }
    }
}

#[async_trait]
impl Node for FinalizeStage {
    async fn run(&self, state: &mut RunState) -> Result<(), WorkflowError> {
        let mut cls: ClassificationState = state.get(CLASSIFICATION_STATE)?;

        let prompt = self
            .composer
            .compose(Stage::Finalize, Some(&cls))
            .await
            .map_err(WorkflowError::finalize)?;

        let answer = self
            .agent
            .complete(&prompt)
            .await
            .map_err(WorkflowError::finalize)?;
        let response: FinalizeResponse =
            parse::parse(&answer).map_err(WorkflowError::finalize)?;

        info!(
            classification = %response.classification,
            confidence = %response.confidence,
            "document classification synthesized"
        );

        cls.classification = response.classification;
        cls.confidence = Some(response.confidence);
        cls.rationale = response.rationale;
        state.insert(CLASSIFICATION_STATE, &cls)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentError;
    use crate::prompts::BuiltinPrompts;
    use crate::workflow::state::ClassificationPage;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct TextAgent {
        answer: String,
        prompt_seen: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Agent for TextAgent {
        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "test"
        }

        async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
            *self.prompt_seen.lock().unwrap() = Some(prompt.to_string());
            Ok(self.answer.clone())
        }

        async fn complete_with_image(
            &self,
            _prompt: &str,
            _image: &str,
        ) -> Result<String, AgentError> {
            unreachable!("finalize is text-only")
        }
    }

    fn state_with_findings() -> RunState {
        let mut page = ClassificationPage::new(1, PathBuf::from("page-1.png"));
        page.markings_found = vec!["SECRET//NOFORN".to_string()];
        page.rationale = "banner top and bottom".to_string();

        let mut state = RunState::new();
        state
            .insert(
                CLASSIFICATION_STATE,
                &ClassificationState::with_pages(vec![page]),
            )
            .unwrap();
        state
    }

    #[tokio::test]
    async fn synthesis_fills_the_document_fields_and_leaves_pages_alone() {
        let mut state = state_with_findings();
        let agent = Arc::new(TextAgent {
            answer: r#"{"classification": "SECRET//NOFORN", "confidence": "HIGH", "rationale": "consistent banners"}"#.to_string(),
            prompt_seen: Mutex::new(None),
        });

        let stage = FinalizeStage::new(
            PromptComposer::new(Arc::new(BuiltinPrompts)),
            agent.clone(),
        );
        stage.run(&mut state).await.unwrap();

        let cls: ClassificationState = state.get(CLASSIFICATION_STATE).unwrap();
        assert_eq!(cls.classification, "SECRET//NOFORN");
        assert_eq!(cls.confidence, Some(Confidence::High));
        assert_eq!(cls.rationale, "consistent banners");
        assert_eq!(cls.pages[0].markings_found, vec!["SECRET//NOFORN"]);

        // The prompt carried the full state snapshot.
        let prompt = agent.prompt_seen.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Current classification state"));
        assert!(prompt.contains("banner top and bottom"));
    }

    #[tokio::test]
    async fn out_of_range_confidence_fails_the_stage() {
        let mut state = state_with_findings();
        let agent = Arc::new(TextAgent {
            answer: r#"{"classification": "SECRET", "confidence": "CERTAIN", "rationale": ""}"#
                .to_string(),
            prompt_seen: Mutex::new(None),
        });

        let stage = FinalizeStage::new(PromptComposer::new(Arc::new(BuiltinPrompts)), agent);
        let err = stage.run(&mut state).await.unwrap_err();
        assert!(matches!(err, WorkflowError::FinalizeFailed(_)));
    }
}
