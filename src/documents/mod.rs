//! Documents domain: upload, lookup, and lifecycle of scanned PDFs.
//!
//! The classification core consumes this domain read-only (a single
//! `find` per workflow run); everything else here serves the HTTP surface.

mod http;
mod model;
mod repo;

pub use http::router;
pub use model::{Document, DocumentFilters, DocumentStatus};
pub use repo::DocumentsRepository;
