//! Run state for a classification workflow.
//!
//! Nodes communicate through an untyped key/value bag ([`RunState`]) with a
//! fixed set of named keys. Values are stored as JSON so every node sees
//! one uniform representation; reads deserialize into the expected type and
//! a missing key or a type mismatch is reported as a programmer error with
//! the key name in the message — never silently defaulted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::classifications::Confidence;
use crate::error::WorkflowError;

/// UUID of the document being classified. Seeded by the driver.
pub const DOCUMENT_ID: &str = "document_id";
/// Scratch directory for this run. Seeded by the driver.
pub const TEMP_DIR: &str = "temp_dir";
/// Original filename of the document. Written by the init node.
pub const FILENAME: &str = "filename";
/// Number of rendered pages. Written by the init node.
pub const PAGE_COUNT: &str = "page_count";
/// The evolving [`ClassificationState`]. Written by init, updated in place
/// by classify/enhance/finalize.
pub const CLASSIFICATION_STATE: &str = "classification_state";

/// Untyped per-run key/value bag threaded through the graph.
#[derive(Debug, Default)]
pub struct RunState {
    values: HashMap<&'static str, serde_json::Value>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under a named key, replacing any previous value.
    pub fn insert<T: Serialize>(&mut self, key: &'static str, value: &T) -> Result<(), WorkflowError> {
        let json = serde_json::to_value(value)
            .map_err(|e| WorkflowError::State(format!("failed to serialize key '{key}': {e}")))?;
        self.values.insert(key, json);
        Ok(())
    }

    /// Read a value, failing loudly when the key is absent or mistyped.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkflowError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| WorkflowError::State(format!("state key '{key}' is not set")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            WorkflowError::State(format!("state key '{key}' has unexpected shape: {e}"))
        })
    }
}

/// Per-page rendering adjustments requested by the model when the initial
/// image was too poor to read. Absent fields are neutral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhanceSettings {
    /// Brightness percentage; 100 = unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i32>,
    /// Contrast offset; 0 = unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<i32>,
    /// Saturation percentage; 100 = unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<i32>,
}

impl EnhanceSettings {
    /// True when every field is absent or at its neutral value — a request
    /// that would re-render an identical image.
    pub fn is_neutral(&self) -> bool {
        self.brightness.map_or(true, |b| b == 100)
            && self.contrast.map_or(true, |c| c == 0)
            && self.saturation.map_or(true, |s| s == 100)
    }
}

/// Findings for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationPage {
    /// 1-indexed page number; also the page's slot in the state.
    pub page_number: usize,
    /// Rendered PNG inside the run's scratch directory.
    pub image_path: PathBuf,
    /// Distinct markings read off this page. Always present, empty when
    /// the page carries none.
    #[serde(default)]
    pub markings_found: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    /// Present while a re-render is pending; cleared by the enhance stage
    /// once the page has been reprocessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancements: Option<EnhanceSettings>,
}

impl ClassificationPage {
    /// A freshly-rendered page with no findings yet.
    pub fn new(page_number: usize, image_path: PathBuf) -> Self {
        Self {
            page_number,
            image_path,
            markings_found: Vec::new(),
            rationale: String::new(),
            enhancements: None,
        }
    }
}

/// Document-level running state: per-page findings plus the synthesized
/// result once finalize has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationState {
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub rationale: String,
    pub pages: Vec<ClassificationPage>,
}

impl ClassificationState {
    pub fn with_pages(pages: Vec<ClassificationPage>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }
}

/// Edge predicate for `classify → enhance`: true iff any page still has
/// pending enhancement settings.
pub fn needs_enhance(state: &RunState) -> bool {
    state
        .get::<ClassificationState>(CLASSIFICATION_STATE)
        .map(|cls| cls.pages.iter().any(|p| p.enhancements.is_some()))
        .unwrap_or(false)
}

/// Bounded-parallelism limit: `max(min(cores, jobs), 1)`.
pub fn worker_count(jobs: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.min(jobs).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_names_the_key() {
        let state = RunState::new();
        let err = state.get::<String>(FILENAME).unwrap_err();
        assert!(err.to_string().contains("filename"));
    }

    #[test]
    fn mismatched_type_names_the_key() {
        let mut state = RunState::new();
        state.insert(PAGE_COUNT, &"three").unwrap();
        let err = state.get::<usize>(PAGE_COUNT).unwrap_err();
        assert!(err.to_string().contains("page_count"));
    }

    #[test]
    fn values_round_trip() {
        let mut state = RunState::new();
        state.insert(PAGE_COUNT, &7usize).unwrap();
        assert_eq!(state.get::<usize>(PAGE_COUNT).unwrap(), 7);

        let cls = ClassificationState::with_pages(vec![ClassificationPage::new(
            1,
            PathBuf::from("/tmp/run/page-1.png"),
        )]);
        state.insert(CLASSIFICATION_STATE, &cls).unwrap();
        let back: ClassificationState = state.get(CLASSIFICATION_STATE).unwrap();
        assert_eq!(back.pages.len(), 1);
        assert_eq!(back.pages[0].page_number, 1);
        assert!(back.pages[0].markings_found.is_empty());
    }

    #[test]
    fn needs_enhance_tracks_pending_settings() {
        let mut state = RunState::new();
        assert!(!needs_enhance(&state));

        let mut cls = ClassificationState::with_pages(vec![
            ClassificationPage::new(1, PathBuf::from("p1.png")),
            ClassificationPage::new(2, PathBuf::from("p2.png")),
        ]);
        state.insert(CLASSIFICATION_STATE, &cls).unwrap();
        assert!(!needs_enhance(&state));

        cls.pages[1].enhancements = Some(EnhanceSettings {
            brightness: Some(140),
            contrast: Some(30),
            saturation: None,
        });
        state.insert(CLASSIFICATION_STATE, &cls).unwrap();
        assert!(needs_enhance(&state));
    }

    #[test]
    fn neutral_settings_are_detected() {
        let neutral = EnhanceSettings {
            brightness: Some(100),
            contrast: Some(0),
            saturation: None,
        };
        assert!(neutral.is_neutral());

        let real = EnhanceSettings {
            brightness: Some(140),
            contrast: None,
            saturation: None,
        };
        assert!(!real.is_neutral());
    }

    #[test]
    fn worker_count_never_exceeds_jobs_or_drops_to_zero() {
        assert_eq!(worker_count(0), 1);
        assert_eq!(worker_count(1), 1);
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(worker_count(10_000), cores);
    }
}
