//! Prompt subsystem: per-stage instructions and output specs.
//!
//! Each LLM-facing workflow stage composes its prompt from two halves:
//!
//! * **Instructions** — how the model should reason. Tunable: reviewers can
//!   store overrides in the database and mark one active per stage; the
//!   hardcoded default applies otherwise.
//! * **Spec** — the exact output JSON shape. Immutable and built-in, so a
//!   prompt override can never break the response parser.

pub mod defaults;
mod http;
mod model;
mod registry;

pub use http::router;
pub use model::{CreatePrompt, Prompt, PromptFilters, Stage, UpdatePrompt};
pub use registry::{BuiltinPrompts, PromptRegistry, PromptSource};
