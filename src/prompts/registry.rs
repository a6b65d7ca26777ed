//! The prompt registry: effective instructions and immutable specs per
//! stage, plus CRUD over stored overrides.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::pagination::{PageRequest, PageResult};

use super::defaults;
use super::model::{CreatePrompt, Prompt, PromptFilters, Stage, UpdatePrompt};

/// What the workflow needs from the prompt subsystem: effective
/// instructions and the immutable spec, per stage. [`PromptRegistry`] is
/// the production implementation; [`BuiltinPrompts`] serves the defaults
/// with no database behind them.
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn instructions(&self, stage: Stage) -> Result<String, Error>;
    fn spec(&self, stage: Stage) -> &'static str;
}

/// [`PromptSource`] that always serves the hardcoded defaults.
pub struct BuiltinPrompts;

#[async_trait]
impl PromptSource for BuiltinPrompts {
    async fn instructions(&self, stage: Stage) -> Result<String, Error> {
        Ok(defaults::instructions(stage).to_string())
    }

    fn spec(&self, stage: Stage) -> &'static str {
        defaults::spec(stage)
    }
}

/// Supplies per-stage prompt text to the workflow and manages overrides.
#[derive(Clone)]
pub struct PromptRegistry {
    pool: PgPool,
}

#[async_trait]
impl PromptSource for PromptRegistry {
    /// Effective instructions for a stage: the active override when one
    /// exists, the hardcoded default otherwise. Never empty.
    async fn instructions(&self, stage: Stage) -> Result<String, Error> {
        let active: Option<String> = sqlx::query_scalar(
            "SELECT instructions FROM prompts WHERE stage = $1 AND active = true",
        )
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(active.unwrap_or_else(|| defaults::instructions(stage).to_string()))
    }

    /// The immutable output spec for a stage. Not user-editable.
    fn spec(&self, stage: Stage) -> &'static str {
        defaults::spec(stage)
    }
}

impl PromptRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The stage names, in workflow order.
    pub fn stages(&self) -> Vec<&'static str> {
        Stage::ALL.iter().map(|s| s.as_str()).collect()
    }

    pub async fn find(&self, id: Uuid) -> Result<Prompt, Error> {
        let prompt = sqlx::query_as::<_, Prompt>("SELECT * FROM prompts WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(prompt)
    }

    /// Paged listing with optional text search and exact-match filters.
    pub async fn list(
        &self,
        page: &PageRequest,
        filters: &PromptFilters,
    ) -> Result<PageResult<Prompt>, Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM prompts");
        push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM prompts");
        push_filters(&mut query, filters);
        query.push(" ORDER BY stage, name");
        query.push(" LIMIT ").push_bind(page.size());
        query.push(" OFFSET ").push_bind(page.offset());

        let items = query
            .build_query_as::<Prompt>()
            .fetch_all(&self.pool)
            .await?;
        Ok(PageResult::new(items, page, total))
    }

    pub async fn create(&self, cmd: CreatePrompt) -> Result<Prompt, Error> {
        let prompt = sqlx::query_as::<_, Prompt>(
            r#"
            INSERT INTO prompts (id, name, stage, instructions, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&cmd.name)
        .bind(cmd.stage.as_str())
        .bind(&cmd.instructions)
        .bind(&cmd.description)
        .fetch_one(&self.pool)
        .await?;
        info!(prompt_id = %prompt.id, stage = %prompt.stage, "prompt created");
        Ok(prompt)
    }

    pub async fn update(&self, id: Uuid, cmd: UpdatePrompt) -> Result<Prompt, Error> {
        let prompt = sqlx::query_as::<_, Prompt>(
            r#"
            UPDATE prompts SET
                name         = COALESCE($2, name),
                instructions = COALESCE($3, instructions),
                description  = COALESCE($4, description),
                updated_at   = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&cmd.name)
        .bind(&cmd.instructions)
        .bind(&cmd.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(prompt)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM prompts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Make `id` the active override for its stage.
    ///
    /// One transaction: look the row up (404 on miss), deactivate any
    /// current active row for the same stage, then activate the target.
    /// The partial unique index would reject any interleaving that tried
    /// to leave two active rows behind.
    pub async fn activate(&self, id: Uuid) -> Result<Prompt, Error> {
        let mut tx = self.pool.begin().await?;

        let stage: String = sqlx::query_scalar("SELECT stage FROM prompts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::NotFound)?;

        sqlx::query("UPDATE prompts SET active = false, updated_at = now() WHERE stage = $1 AND active = true")
            .bind(&stage)
            .execute(&mut *tx)
            .await?;

        let prompt = sqlx::query_as::<_, Prompt>(
            "UPDATE prompts SET active = true, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(prompt_id = %id, stage = %stage, "prompt activated");
        Ok(prompt)
    }

    /// Clear the active flag on `id`, restoring the hardcoded default for
    /// its stage.
    pub async fn deactivate(&self, id: Uuid) -> Result<Prompt, Error> {
        let prompt = sqlx::query_as::<_, Prompt>(
            "UPDATE prompts SET active = false, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        info!(prompt_id = %id, stage = %prompt.stage, "prompt deactivated");
        Ok(prompt)
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &PromptFilters) {
    let mut prefix = " WHERE ";
    if let Some(ref search) = filters.search {
        let pattern = format!("%{search}%");
        builder
            .push(prefix)
            .push("(name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
        prefix = " AND ";
    }
    if let Some(stage) = filters.stage {
        builder
            .push(prefix)
            .push("stage = ")
            .push_bind(stage.as_str());
        prefix = " AND ";
    }
    if let Some(active) = filters.active {
        builder.push(prefix).push("active = ").push_bind(active);
    }
}
