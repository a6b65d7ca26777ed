//! Classification entity, confidence grades, and command payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// Model-reported confidence in a document-level classification.
///
/// Serialized in uppercase on the wire and in the database; the DB CHECK
/// constraint enforces the same three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            other => Err(format!("unknown confidence '{other}'")),
        }
    }
}

/// The stored result of classifying one document. At most one per
/// document; re-classification overwrites in place.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub id: Uuid,
    pub document_id: Uuid,
    /// The document-level banner line, e.g. `SECRET//NOFORN`.
    pub classification: String,
    pub confidence: Confidence,
    /// Sorted distinct union of every marking found on any page.
    pub markings_found: Vec<String>,
    pub rationale: String,
    pub classified_at: DateTime<Utc>,
    pub model_name: String,
    pub provider_name: String,
    /// Set by validate/override; nulled whenever the document is
    /// re-classified.
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl FromRow<'_, PgRow> for Classification {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let confidence: String = row.try_get("confidence")?;
        let markings: Json<Vec<String>> = row.try_get("markings_found")?;
        Ok(Self {
            id: row.try_get("id")?,
            document_id: row.try_get("document_id")?,
            classification: row.try_get("classification")?,
            confidence: confidence
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            markings_found: markings.0,
            rationale: row.try_get("rationale")?,
            classified_at: row.try_get("classified_at")?,
            model_name: row.try_get("model_name")?,
            provider_name: row.try_get("provider_name")?,
            validated_by: row.try_get("validated_by")?,
            validated_at: row.try_get("validated_at")?,
        })
    }
}

/// Body of a validate request: the reviewer accepting the result as-is.
#[derive(Debug, Deserialize)]
pub struct ValidateClassification {
    pub validated_by: String,
}

/// Body of an override request: the reviewer correcting the result.
#[derive(Debug, Deserialize)]
pub struct UpdateClassification {
    pub classification: String,
    pub rationale: String,
    pub updated_by: String,
}

/// Filters accepted by the classification search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassificationFilters {
    /// Case-insensitive substring match over classification and rationale.
    pub search: Option<String>,
    /// Exact classification text.
    pub classification: Option<String>,
    pub confidence: Option<Confidence>,
    pub document_id: Option<Uuid>,
    pub validated_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_round_trips_through_strings() {
        for c in [Confidence::High, Confidence::Medium, Confidence::Low] {
            assert_eq!(c.as_str().parse::<Confidence>().unwrap(), c);
        }
        assert!("CERTAIN".parse::<Confidence>().is_err());
    }

    #[test]
    fn confidence_serde_is_uppercase() {
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"HIGH\"");
        let parsed: Confidence = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(parsed, Confidence::Low);
    }
}
