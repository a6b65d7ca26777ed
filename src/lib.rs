//! # herald
//!
//! Read security classification markings from scanned PDF documents with a
//! vision-capable LLM, and keep humans in the loop to validate or override
//! the result.
//!
//! ## Why a vision model?
//!
//! Classification markings live in the parts of a page that text extraction
//! mangles first: rotated stamps, faded banner lines, handwritten portion
//! markings in the margins. Rasterising each page and letting a vision
//! model read it as a human would is far more reliable than OCR on
//! degraded scans.
//!
//! ## Classification run
//!
//! ```text
//! POST /api/classifications/{documentId}
//!  │
//!  ├─ init      download the PDF, rasterise every page (pdfium, 300 DPI)
//!  ├─ classify  one vision call per page, in parallel, no shared context
//!  ├─ enhance   re-render pages the model flagged as unreadable, re-query
//!  │            (skipped when nothing was flagged)
//!  └─ finalize  one text-only call synthesizing the document result
//!  │
//!  └─ persist   upsert the classification, move the document to review
//! ```
//!
//! Each run works inside its own scratch directory, destroyed on every exit
//! path. Reviewers then validate (or override) through the HTTP API, which
//! moves the document to `complete`.
//!
//! ## Crate layout
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`workflow`] | The four-stage graph, rendering, prompt composition, response parsing |
//! | [`classifications`] | Persistence of results, validation, status transitions |
//! | [`documents`] | Upload and lifecycle of the PDFs themselves |
//! | [`prompts`] | Per-stage instructions (overridable) and output specs (immutable) |
//! | [`agent`] | The narrow LLM interface and its `edgequake-llm` implementation |
//! | [`storage`] | Blob store trait + filesystem backend |
//! | [`server`] | axum composition root |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod agent;
pub mod classifications;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod pagination;
pub mod prompts;
pub mod server;
pub mod storage;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::HeraldConfig;
pub use error::{Error, WorkflowError};
