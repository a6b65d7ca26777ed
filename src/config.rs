//! Service configuration.
//!
//! Every knob lives in one [`HeraldConfig`] struct so a running instance can
//! be described by a single value: log it at startup, diff two deployments,
//! inject a modified copy in tests. Values come from the environment (a
//! `.env` file is honoured via `dotenvy`), with documented defaults for
//! everything except the database URL.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration load/validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable was set to an unparseable value.
    #[error("invalid value for {var}: {detail}")]
    Invalid { var: &'static str, detail: String },
}

/// Runtime configuration for the herald service.
#[derive(Debug, Clone)]
pub struct HeraldConfig {
    /// Postgres connection URL. Required (`HERALD_DATABASE_URL`, falling
    /// back to `DATABASE_URL`).
    pub database_url: String,

    /// Socket address the HTTP server binds. Default: `0.0.0.0:8080`
    /// (`HERALD_BIND`).
    pub bind: SocketAddr,

    /// Root directory of the filesystem blob store. Default: `./data/blobs`
    /// (`HERALD_STORAGE_ROOT`). Created on startup if absent.
    pub storage_root: PathBuf,

    /// LLM provider name, e.g. "openai", "anthropic", "ollama"
    /// (`HERALD_LLM_PROVIDER`). If unset, the provider is auto-detected
    /// from API-key environment variables.
    pub provider_name: Option<String>,

    /// Vision model identifier (`HERALD_MODEL`). If unset, a provider-aware
    /// vision-capable default is chosen.
    pub model: Option<String>,

    /// Sampling temperature for all inference calls. Default: 0.1
    /// (`HERALD_TEMPERATURE`).
    ///
    /// Reading markings off a page is transcription, not generation; a
    /// near-zero temperature keeps the model faithful to what it sees.
    pub temperature: f32,

    /// Maximum tokens per inference response. Default: 4096
    /// (`HERALD_MAX_TOKENS`).
    pub max_tokens: usize,

    /// Retry attempts per LLM call on transient failure. Default: 3
    /// (`HERALD_MAX_RETRIES`).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt.
    /// Default: 500 (`HERALD_RETRY_BACKOFF_MS`). The exponential schedule
    /// keeps N concurrent page workers from retrying in lockstep against a
    /// recovering endpoint.
    pub retry_backoff_ms: u64,

    /// Rasterisation DPI for page renders. Default: 300 (`HERALD_DPI`).
    ///
    /// Classification markings are often stamped in small print in page
    /// margins; 300 DPI keeps banner text legible to the vision model where
    /// 150 DPI renders lose the header/footer stamps.
    pub dpi: u32,

    /// Maximum accepted upload size in bytes. Default: 100 MiB
    /// (`HERALD_MAX_UPLOAD_BYTES`).
    pub max_upload_bytes: usize,
}

impl HeraldConfig {
    /// Load configuration from the process environment.
    ///
    /// `.env` files are read first (ignored when absent) so local
    /// development and containerised deployment share one mechanism.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("HERALD_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::Missing("HERALD_DATABASE_URL"))?;

        let bind = opt_var("HERALD_BIND")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "HERALD_BIND",
                detail: e.to_string(),
            })?;

        Ok(Self {
            database_url,
            bind,
            storage_root: opt_var("HERALD_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/blobs")),
            provider_name: opt_var("HERALD_LLM_PROVIDER"),
            model: opt_var("HERALD_MODEL"),
            temperature: parse_var("HERALD_TEMPERATURE", 0.1)?,
            max_tokens: parse_var("HERALD_MAX_TOKENS", 4096)?,
            max_retries: parse_var("HERALD_MAX_RETRIES", 3)?,
            retry_backoff_ms: parse_var("HERALD_RETRY_BACKOFF_MS", 500)?,
            dpi: parse_var("HERALD_DPI", 300)?,
            max_upload_bytes: parse_var("HERALD_MAX_UPLOAD_BYTES", 100 * 1024 * 1024)?,
        })
    }
}

/// Read an optional variable, treating empty strings as unset.
fn opt_var(name: &'static str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parse an optional variable into `T`, with a default when unset.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match opt_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            var: name,
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        std::env::remove_var("HERALD_TEST_UNSET_KNOB");
        let v: u32 = parse_var("HERALD_TEST_UNSET_KNOB", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parse_var_rejects_garbage() {
        std::env::set_var("HERALD_TEST_BAD_KNOB", "not-a-number");
        let res: Result<u32, _> = parse_var("HERALD_TEST_BAD_KNOB", 1);
        assert!(res.is_err());
        std::env::remove_var("HERALD_TEST_BAD_KNOB");
    }
}
