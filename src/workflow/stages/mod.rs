//! Workflow stage nodes.
//!
//! Each submodule implements exactly one graph node. Keeping stages
//! separate makes each independently testable and keeps the graph wiring
//! in `workflow::mod` a pure declaration.
//!
//! ## Data flow
//!
//! ```text
//! init ──▶ classify ──▶ enhance ──▶ finalize
//!  (render)  (per-page    └─(only when a page   (document-level
//!            vision)         was flagged)        synthesis)
//! ```
//!
//! 1. [`init`]     — fetch the document, stream the PDF, render all pages
//! 2. [`classify`] — per-page parallel vision calls, no cross-page context
//! 3. [`enhance`]  — re-render flagged pages with adjustments, re-query
//! 4. [`finalize`] — one text-only call synthesizing the document result

pub mod classify;
pub mod enhance;
pub mod finalize;
pub mod init;

pub use classify::ClassifyStage;
pub use enhance::EnhanceStage;
pub use finalize::FinalizeStage;
pub use init::InitStage;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Wrap PNG bytes as the `data:` URI the agent interface accepts.
///
/// PNG is kept end-to-end: lossless encoding preserves the crispness of
/// stamped text, which is what the vision model is reading.
pub(crate) fn png_data_uri(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_has_the_png_header() {
        let uri = png_data_uri(b"hello");
        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(uri.ends_with("aGVsbG8="));
    }
}
