//! Prompt override entity and the workflow stage enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::error::Error;

/// The three LLM-interacting workflow stages.
///
/// The `init` node has no stage: it never calls the model. Stage strings
/// are validated at every decode boundary; the database CHECK constraint
/// enforces the same set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Enhance,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Classify, Stage::Enhance, Stage::Finalize];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Enhance => "enhance",
            Stage::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classify" => Ok(Stage::Classify),
            "enhance" => Ok(Stage::Enhance),
            "finalize" => Ok(Stage::Finalize),
            other => Err(Error::InvalidStage(other.to_string())),
        }
    }
}

/// A stored prompt override.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub id: Uuid,
    pub name: String,
    pub stage: Stage,
    pub instructions: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for Prompt {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let stage: String = row.try_get("stage")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            stage: stage
                .parse()
                .map_err(|e: Error| sqlx::Error::Decode(e.to_string().into()))?,
            instructions: row.try_get("instructions")?,
            description: row.try_get("description")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Create command for a prompt override. New rows start inactive; making
/// one effective is an explicit `activate` call.
#[derive(Debug, Deserialize)]
pub struct CreatePrompt {
    pub name: String,
    pub stage: Stage,
    pub instructions: String,
    pub description: Option<String>,
}

/// Update command. Absent fields are left unchanged; the stage of an
/// existing prompt is fixed so an active row can never migrate into a
/// stage that already has one.
#[derive(Debug, Deserialize)]
pub struct UpdatePrompt {
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub description: Option<String>,
}

/// Filters accepted by the prompt search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptFilters {
    /// Case-insensitive substring match on name or description.
    pub search: Option<String>,
    pub stage: Option<Stage>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_round_trips_through_strings() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn unknown_stage_is_invalid() {
        let err = "init".parse::<Stage>().unwrap_err();
        assert!(matches!(err, Error::InvalidStage(s) if s == "init"));
    }

    #[test]
    fn stage_serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Classify).unwrap(), "\"classify\"");
        let parsed: Stage = serde_json::from_str("\"finalize\"").unwrap();
        assert_eq!(parsed, Stage::Finalize);
    }
}
