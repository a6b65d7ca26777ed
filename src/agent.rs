//! LLM agent: the narrow inference interface the workflow consumes.
//!
//! Stages never see a provider SDK. They see [`Agent`]: a text completion,
//! a vision completion over one page image, and the model/provider names
//! recorded as provenance on every classification row. Keeping the seam
//! this thin lets tests drive the whole workflow with a scripted fake and
//! lets the production backend change without touching a stage.
//!
//! ## Retry strategy
//!
//! HTTP 429 / 503 responses are routine when a document fans out one vision
//! call per page. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! avoids a thundering herd: with the 500 ms default and 3 retries the wait
//! sequence is 500 ms → 1 s → 2 s per call.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::HeraldConfig;

/// Inference failures surfaced to workflow stages.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No provider could be constructed from configuration/environment.
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },

    /// The call failed on every attempt.
    #[error("LLM call failed after {attempts} attempts: {detail}")]
    CallFailed { attempts: u32, detail: String },

    /// The supplied image was not a `data:` URI the provider can accept.
    #[error("invalid image payload: {0}")]
    InvalidImage(String),
}

/// Minimal inference interface consumed by the workflow stages.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Model identifier recorded as provenance.
    fn model_name(&self) -> &str;

    /// Provider identifier recorded as provenance.
    fn provider_name(&self) -> &str;

    /// Text-only completion.
    async fn complete(&self, prompt: &str) -> Result<String, AgentError>;

    /// Vision completion over a single page image, supplied as a
    /// `data:image/png;base64,…` URI.
    async fn complete_with_image(&self, prompt: &str, image: &str) -> Result<String, AgentError>;
}

/// Production [`Agent`] backed by an `edgequake-llm` provider.
///
/// The handle is cheap to clone (`Arc` inside); each parallel page worker
/// takes its own clone so no mutable client state is ever shared.
#[derive(Clone)]
pub struct LlmAgent {
    provider: Arc<dyn LLMProvider>,
    provider_label: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmAgent {
    /// Resolve a provider from configuration, most-specific first:
    ///
    /// 1. `provider_name` (+ optional `model`) from [`HeraldConfig`] — an
    ///    explicit operator choice; the provider-aware vision default fills
    ///    in the model when omitted.
    /// 2. `OPENAI_API_KEY` present → OpenAI, so multi-key environments get
    ///    a deterministic pick.
    /// 3. Full auto-detection via `ProviderFactory::from_env`.
    pub fn from_config(config: &HeraldConfig) -> Result<Self, AgentError> {
        let (provider_label, model) = if let Some(ref name) = config.provider_name {
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| default_vision_model(name).to_string());
            (name.clone(), model)
        } else if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| default_vision_model("openai").to_string());
            ("openai".to_string(), model)
        } else {
            let (provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| AgentError::NotConfigured {
                    provider: "auto".into(),
                    hint: format!(
                        "no provider auto-detected; set HERALD_LLM_PROVIDER or an API key ({e})"
                    ),
                })?;
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| default_vision_model("openai").to_string());
            return Ok(Self::new(provider, "auto".into(), model, config));
        };

        let provider = ProviderFactory::create_llm_provider(&provider_label, &model).map_err(
            |e| AgentError::NotConfigured {
                provider: provider_label.clone(),
                hint: e.to_string(),
            },
        )?;
        Ok(Self::new(provider, provider_label, model, config))
    }

    fn new(
        provider: Arc<dyn LLMProvider>,
        provider_label: String,
        model: String,
        config: &HeraldConfig,
    ) -> Self {
        Self {
            provider,
            provider_label,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// Drive one chat request through the retry schedule.
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, AgentError> {
        let options = self.options();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    attempt,
                    max = self.max_retries,
                    backoff_ms = backoff,
                    "retrying LLM call"
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        input_tokens = response.prompt_tokens,
                        output_tokens = response.completion_tokens,
                        "LLM call complete"
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "LLM call failed");
                    last_err = Some(e.to_string());
                }
            }
        }

        Err(AgentError::CallFailed {
            attempts: self.max_retries + 1,
            detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        &self.provider_label
    }

    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        self.chat(vec![ChatMessage::user(prompt)]).await
    }

    async fn complete_with_image(&self, prompt: &str, image: &str) -> Result<String, AgentError> {
        let (mime, b64) = split_data_uri(image)?;
        // The empty user text is intentional: providers require a user turn
        // to respond to, but the image carries all the content. `detail:
        // "high"` keeps small marginal stamps within the vision tile budget.
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images(
                "",
                vec![ImageData::new(b64.to_string(), mime).with_detail("high")],
            ),
        ];
        self.chat(messages).await
    }
}

/// Best default vision model per provider.
///
/// Only consulted when the operator names a provider without a model.
/// Mistral's SDK default is not vision-capable, and local runtimes ship
/// `llava` far more often than any other vision model.
fn default_vision_model(provider_name: &str) -> &'static str {
    match provider_name {
        "mistral" | "mistral-ai" | "mistralai" => "pixtral-12b-2409",
        "ollama" | "lmstudio" | "lm-studio" | "lm_studio" => "llava",
        _ => "gpt-4.1-nano",
    }
}

/// Split a `data:<mime>;base64,<payload>` URI into its parts.
fn split_data_uri(uri: &str) -> Result<(&str, &str), AgentError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AgentError::InvalidImage("missing data: scheme".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AgentError::InvalidImage("missing payload separator".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| AgentError::InvalidImage("payload must be base64".into()))?;
    if mime.is_empty() || payload.is_empty() {
        return Err(AgentError::InvalidImage("empty mime or payload".into()));
    }
    Ok((mime, payload))
}
