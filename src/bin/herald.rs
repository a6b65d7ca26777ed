//! CLI binary for herald.
//!
//! A thin shim over the library crate: parse flags, initialise logging,
//! and hand off to the server or the migration runner.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herald::HeraldConfig;
use std::io;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ENVIRONMENT VARIABLES:
  HERALD_DATABASE_URL     Postgres connection URL (required; DATABASE_URL also honoured)
  HERALD_BIND             HTTP bind address (default 0.0.0.0:8080)
  HERALD_STORAGE_ROOT     Blob store directory (default ./data/blobs)
  HERALD_LLM_PROVIDER     LLM provider: openai, anthropic, gemini, ollama, ...
  HERALD_MODEL            Vision model ID (provider-aware default otherwise)
  HERALD_DPI              Page render DPI (default 300)
  HERALD_MAX_TOKENS       Max tokens per inference (default 4096)
  HERALD_MAX_RETRIES      Retries per LLM call (default 3)
  OPENAI_API_KEY /        Provider credentials; auto-detected when no
  ANTHROPIC_API_KEY / ... provider is named explicitly

SETUP:
  1. Start Postgres and set:   export HERALD_DATABASE_URL=postgres://...
  2. Set an API key:           export OPENAI_API_KEY=sk-...
  3. Run the service:          herald serve

  Migrations run automatically on `serve`; use `herald migrate` to apply
  them without starting the server (e.g. in a deploy hook).
"#;

/// Classify security markings in scanned PDFs with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "herald",
    version,
    about = "Classify security markings in scanned PDFs with a vision LLM",
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HERALD_VERBOSE", global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and serve the HTTP API (default).
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let config = HeraldConfig::from_env().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => herald::server::serve(&config)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .context("Server failed"),
        Command::Migrate => {
            let pool = herald::db::connect(&config.database_url)
                .await
                .context("Failed to connect to database")?;
            herald::db::migrate(&pool).await.context("Migration failed")?;
            Ok(())
        }
    }
}
