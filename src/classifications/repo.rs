//! Classifications repository: runs the workflow and persists its results
//! with the document-status transitions that drive the review loop.

use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, WorkflowError};
use crate::pagination::{PageRequest, PageResult};
use crate::workflow::{ClassificationState, ClassificationWorkflow};

use super::model::{
    Classification, ClassificationFilters, UpdateClassification, ValidateClassification,
};

/// Persistence and orchestration for classifications.
#[derive(Clone)]
pub struct ClassificationsRepository {
    pool: PgPool,
    workflow: Arc<ClassificationWorkflow>,
}

impl ClassificationsRepository {
    pub fn new(pool: PgPool, workflow: Arc<ClassificationWorkflow>) -> Self {
        Self { pool, workflow }
    }

    pub async fn find(&self, id: Uuid) -> Result<Classification, Error> {
        let row = sqlx::query_as::<_, Classification>("SELECT * FROM classifications WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    /// The classification for a document; the unique FK guarantees at most
    /// one. A document that has never been classified yields `NotFound`.
    pub async fn find_by_document(&self, document_id: Uuid) -> Result<Classification, Error> {
        let row = sqlx::query_as::<_, Classification>(
            "SELECT * FROM classifications WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Paged listing with text search and exact-match filters.
    pub async fn list(
        &self,
        page: &PageRequest,
        filters: &ClassificationFilters,
    ) -> Result<PageResult<Classification>, Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM classifications");
        push_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM classifications");
        push_filters(&mut query, filters);
        query.push(" ORDER BY classified_at DESC");
        query.push(" LIMIT ").push_bind(page.size());
        query.push(" OFFSET ").push_bind(page.offset());

        let items = query
            .build_query_as::<Classification>()
            .fetch_all(&self.pool)
            .await?;
        Ok(PageResult::new(items, page, total))
    }

    /// Classify a document: run the workflow, then persist in one
    /// transaction — upsert the classification (resetting any validation)
    /// and move the document to `review`, whatever its prior status.
    pub async fn classify(&self, document_id: Uuid) -> Result<Classification, Error> {
        let result = self.workflow.execute(document_id).await?;

        let confidence = result.state.confidence.ok_or_else(|| {
            Error::Workflow(WorkflowError::State(
                "workflow completed without a confidence grade".into(),
            ))
        })?;
        let markings = collect_markings(&result.state);

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Classification>(
            r#"
            INSERT INTO classifications
                (id, document_id, classification, confidence, markings_found,
                 rationale, classified_at, model_name, provider_name)
            VALUES ($1, $2, $3, $4, $5, $6, now(), $7, $8)
            ON CONFLICT (document_id) DO UPDATE SET
                classification = EXCLUDED.classification,
                confidence     = EXCLUDED.confidence,
                markings_found = EXCLUDED.markings_found,
                rationale      = EXCLUDED.rationale,
                classified_at  = EXCLUDED.classified_at,
                model_name     = EXCLUDED.model_name,
                provider_name  = EXCLUDED.provider_name,
                validated_by   = NULL,
                validated_at   = NULL
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(&result.state.classification)
        .bind(confidence.as_str())
        .bind(sqlx::types::Json(&markings))
        .bind(&result.state.rationale)
        .bind(self.workflow.model_name())
        .bind(self.workflow.provider_name())
        .fetch_one(&mut *tx)
        .await?;

        // Unconditional: re-classification pulls a document back into
        // review from any state.
        sqlx::query("UPDATE documents SET status = 'review', updated_at = now() WHERE id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            document_id = %document_id,
            classification = %row.classification,
            confidence = %row.confidence,
            "document classified"
        );
        Ok(row)
    }

    /// Accept a classification as-is. The document must currently be in
    /// `review`; the guarded update detects anything else without racing.
    pub async fn validate(
        &self,
        id: Uuid,
        cmd: ValidateClassification,
    ) -> Result<Classification, Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Classification>(
            r#"
            UPDATE classifications
            SET validated_by = $2, validated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&cmd.validated_by)
        .fetch_one(&mut *tx)
        .await?;

        complete_document(&mut tx, row.document_id).await?;

        tx.commit().await?;
        info!(classification_id = %id, validated_by = %cmd.validated_by, "classification validated");
        Ok(row)
    }

    /// Override a classification with the reviewer's correction. Same
    /// guarded transition as `validate`; the reviewer is recorded in
    /// `validated_by`.
    pub async fn update(
        &self,
        id: Uuid,
        cmd: UpdateClassification,
    ) -> Result<Classification, Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Classification>(
            r#"
            UPDATE classifications
            SET classification = $2, rationale = $3, validated_by = $4, validated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&cmd.classification)
        .bind(&cmd.rationale)
        .bind(&cmd.updated_by)
        .fetch_one(&mut *tx)
        .await?;

        complete_document(&mut tx, row.document_id).await?;

        tx.commit().await?;
        info!(classification_id = %id, updated_by = %cmd.updated_by, "classification overridden");
        Ok(row)
    }

    /// Remove a classification. The document keeps its current status;
    /// deleting a result does not reopen review.
    pub async fn delete(&self, id: Uuid) -> Result<(), Error> {
        let result = sqlx::query("DELETE FROM classifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

/// Flip the owning document `review → complete`, failing the transaction
/// with `InvalidStatus` when it is in any other state.
async fn complete_document(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    document_id: Uuid,
) -> Result<(), Error> {
    let updated = sqlx::query(
        "UPDATE documents SET status = 'complete', updated_at = now() \
         WHERE id = $1 AND status = 'review'",
    )
    .bind(document_id)
    .execute(&mut **tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(Error::InvalidStatus);
    }
    Ok(())
}

/// Sorted distinct union of every page's markings.
fn collect_markings(state: &ClassificationState) -> Vec<String> {
    state
        .pages
        .iter()
        .flat_map(|page| page.markings_found.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &ClassificationFilters) {
    let mut prefix = " WHERE ";
    if let Some(ref search) = filters.search {
        let pattern = format!("%{search}%");
        builder
            .push(prefix)
            .push("(classification ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR rationale ILIKE ")
            .push_bind(pattern)
            .push(")");
        prefix = " AND ";
    }
    if let Some(ref classification) = filters.classification {
        builder
            .push(prefix)
            .push("classification = ")
            .push_bind(classification.clone());
        prefix = " AND ";
    }
    if let Some(confidence) = filters.confidence {
        builder
            .push(prefix)
            .push("confidence = ")
            .push_bind(confidence.as_str());
        prefix = " AND ";
    }
    if let Some(document_id) = filters.document_id {
        builder
            .push(prefix)
            .push("document_id = ")
            .push_bind(document_id);
        prefix = " AND ";
    }
    if let Some(ref validated_by) = filters.validated_by {
        builder
            .push(prefix)
            .push("validated_by = ")
            .push_bind(validated_by.clone());
    }
}
