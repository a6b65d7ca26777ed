//! Classifications domain: the persisted outcome of workflow runs and the
//! human validation loop over them.

mod http;
mod model;
mod repo;

pub use http::router;
pub use model::{
    Classification, ClassificationFilters, Confidence, UpdateClassification,
    ValidateClassification,
};
pub use repo::ClassificationsRepository;
