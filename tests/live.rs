//! Live integration tests against a real Postgres.
//!
//! These tests exercise the persistence invariants that unit tests cannot:
//! transactional upserts, guarded status transitions, and the
//! one-active-prompt-per-stage swap. They are gated behind the
//! `HERALD_TEST_DATABASE_URL` environment variable so they do not run in
//! CI unless a database is provisioned.
//!
//! Run with:
//!   HERALD_TEST_DATABASE_URL=postgres://localhost/herald_test \
//!     cargo test --test live -- --nocapture
//!
//! The classification *workflow* itself (pdfium + LLM) is covered by unit
//! tests with a scripted agent; nothing here calls a model.

use async_trait::async_trait;
use herald::agent::{Agent, AgentError};
use herald::classifications::{
    ClassificationsRepository, UpdateClassification, ValidateClassification,
};
use herald::documents::DocumentsRepository;
use herald::error::Error;
use herald::pagination::PageRequest;
use herald::prompts::{CreatePrompt, PromptFilters, PromptRegistry, PromptSource, Stage};
use herald::storage::FsBlobStore;
use herald::workflow::{ClassificationWorkflow, PageRenderer};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip the test unless HERALD_TEST_DATABASE_URL points at a database.
macro_rules! skip_unless_db {
    () => {{
        match std::env::var("HERALD_TEST_DATABASE_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => {
                println!("SKIP — set HERALD_TEST_DATABASE_URL to run live tests");
                return;
            }
        }
    }};
}

/// An agent that must never be reached; these tests never run a workflow.
struct UnreachableAgent;

#[async_trait]
impl Agent for UnreachableAgent {
    fn model_name(&self) -> &str {
        "test-model"
    }

    fn provider_name(&self) -> &str {
        "test-provider"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, AgentError> {
        unreachable!("live tests never call the model")
    }

    async fn complete_with_image(&self, _p: &str, _i: &str) -> Result<String, AgentError> {
        unreachable!("live tests never call the model")
    }
}

async fn connect(url: &str) -> PgPool {
    let pool = herald::db::connect(url).await.expect("database reachable");
    herald::db::migrate(&pool).await.expect("migrations apply");
    pool
}

async fn classifications_repo(pool: &PgPool) -> ClassificationsRepository {
    let dir = tempfile::tempdir().expect("tempdir");
    let blobs = Arc::new(FsBlobStore::new(dir.path()).await.expect("blob store"));
    let renderer = Arc::new(PageRenderer::new(300));
    let documents = DocumentsRepository::new(pool.clone(), blobs.clone(), renderer.clone());
    let workflow = ClassificationWorkflow::new(
        documents,
        blobs,
        renderer,
        PromptRegistry::new(pool.clone()),
        Arc::new(UnreachableAgent),
    );
    ClassificationsRepository::new(pool.clone(), Arc::new(workflow))
}

/// Seed a document row directly; uploads need pdfium, which live tests avoid.
async fn seed_document(pool: &PgPool, status: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO documents (id, storage_key, filename, content_type, size_bytes, page_count, status) \
         VALUES ($1, $2, 'scan.pdf', 'application/pdf', 1024, 2, $3)",
    )
    .bind(id)
    .bind(format!("documents/{id}/scan.pdf"))
    .bind(status)
    .execute(pool)
    .await
    .expect("seed document");
    id
}

/// Seed a classification row as a completed workflow would have left it.
async fn seed_classification(pool: &PgPool, document_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO classifications \
         (id, document_id, classification, confidence, markings_found, rationale, model_name, provider_name) \
         VALUES ($1, $2, 'SECRET//NOFORN', 'HIGH', $3, 'banner on both pages', 'test-model', 'test-provider')",
    )
    .bind(id)
    .bind(document_id)
    .bind(sqlx::types::Json(vec!["SECRET//NOFORN".to_string()]))
    .execute(pool)
    .await
    .expect("seed classification");
    id
}

async fn document_status(pool: &PgPool, id: Uuid) -> String {
    sqlx::query_scalar("SELECT status FROM documents WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("document exists")
}

// ── Validation lifecycle ─────────────────────────────────────────────────────

#[tokio::test]
async fn validate_completes_a_document_in_review() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "review").await;
    let cls = seed_classification(&pool, doc).await;

    let validated = repo
        .validate(
            cls,
            ValidateClassification {
                validated_by: "alice".into(),
            },
        )
        .await
        .expect("validate succeeds");

    assert_eq!(validated.validated_by.as_deref(), Some("alice"));
    assert!(validated.validated_at.is_some());
    assert_eq!(document_status(&pool, doc).await, "complete");
}

#[tokio::test]
async fn validate_rejects_a_document_not_in_review() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "complete").await;
    let cls = seed_classification(&pool, doc).await;

    let err = repo
        .validate(
            cls,
            ValidateClassification {
                validated_by: "alice".into(),
            },
        )
        .await
        .expect_err("validate must fail");
    assert!(matches!(err, Error::InvalidStatus));

    // The transaction rolled back: no validation fields were written.
    let row = repo.find(cls).await.expect("row still present");
    assert!(row.validated_by.is_none());
    assert!(row.validated_at.is_none());
    assert_eq!(document_status(&pool, doc).await, "complete");
}

#[tokio::test]
async fn update_overrides_and_completes() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "review").await;
    let cls = seed_classification(&pool, doc).await;

    let updated = repo
        .update(
            cls,
            UpdateClassification {
                classification: "TOP SECRET//SI".into(),
                rationale: "missed the SCI banner on page 2".into(),
                updated_by: "bob".into(),
            },
        )
        .await
        .expect("update succeeds");

    assert_eq!(updated.classification, "TOP SECRET//SI");
    assert_eq!(updated.validated_by.as_deref(), Some("bob"));
    assert_eq!(document_status(&pool, doc).await, "complete");
}

#[tokio::test]
async fn delete_leaves_document_status_alone() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "complete").await;
    let cls = seed_classification(&pool, doc).await;

    repo.delete(cls).await.expect("delete succeeds");
    assert!(matches!(repo.find(cls).await, Err(Error::NotFound)));
    // Deliberately NOT reverted to pending/review.
    assert_eq!(document_status(&pool, doc).await, "complete");
}

#[tokio::test]
async fn find_by_document_is_not_found_before_first_classify() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "pending").await;
    assert!(matches!(
        repo.find_by_document(doc).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn markings_round_trip_as_a_json_array() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "review").await;
    let cls = seed_classification(&pool, doc).await;

    let row = repo.find(cls).await.expect("row present");
    assert_eq!(row.markings_found, vec!["SECRET//NOFORN"]);

    // Stored as a JSON array, never SQL NULL.
    let raw: serde_json::Value =
        sqlx::query_scalar("SELECT markings_found FROM classifications WHERE id = $1")
            .bind(cls)
            .fetch_one(&pool)
            .await
            .expect("raw json");
    assert!(raw.is_array());
}

// ── Prompt overrides ─────────────────────────────────────────────────────────

#[tokio::test]
async fn activate_swaps_the_active_row_atomically() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let registry = PromptRegistry::new(pool.clone());

    let suffix = Uuid::new_v4();
    let first = registry
        .create(CreatePrompt {
            name: format!("strict-banners-{suffix}"),
            stage: Stage::Classify,
            instructions: "Read only banner lines.".into(),
            description: None,
        })
        .await
        .expect("create first");
    let second = registry
        .create(CreatePrompt {
            name: format!("portion-markings-{suffix}"),
            stage: Stage::Classify,
            instructions: "Weigh portion markings heavily.".into(),
            description: Some("tuned for memos".into()),
        })
        .await
        .expect("create second");

    // No active row yet: activating the first has no predecessor to clear.
    let first = registry.activate(first.id).await.expect("activate first");
    assert!(first.active);

    // Swapping to the second deactivates the first in the same transaction.
    let second = registry.activate(second.id).await.expect("activate second");
    assert!(second.active);

    let active = registry
        .list(
            &PageRequest::default(),
            &PromptFilters {
                stage: Some(Stage::Classify),
                active: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("list active");
    assert_eq!(active.items.len(), 1, "exactly one active row per stage");
    assert_eq!(active.items[0].id, second.id);

    // The effective instructions are now the override's.
    let effective = registry
        .instructions(Stage::Classify)
        .await
        .expect("instructions");
    assert_eq!(effective, "Weigh portion markings heavily.");

    // Deactivating restores the hardcoded default.
    registry.deactivate(second.id).await.expect("deactivate");
    let effective = registry
        .instructions(Stage::Classify)
        .await
        .expect("instructions");
    assert!(effective.contains("classification analyst"));

    // Cleanup so reruns keep unique-name room.
    registry.delete(first.id).await.ok();
    registry.delete(second.id).await.ok();
}

#[tokio::test]
async fn duplicate_prompt_names_are_rejected() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let registry = PromptRegistry::new(pool.clone());

    let name = format!("dupe-{}", Uuid::new_v4());
    let first = registry
        .create(CreatePrompt {
            name: name.clone(),
            stage: Stage::Enhance,
            instructions: "a".into(),
            description: None,
        })
        .await
        .expect("first create");

    let err = registry
        .create(CreatePrompt {
            name,
            stage: Stage::Enhance,
            instructions: "b".into(),
            description: None,
        })
        .await
        .expect_err("second create must fail");
    assert!(matches!(err, Error::Duplicate));

    registry.delete(first.id).await.ok();
}

#[tokio::test]
async fn cascade_removes_classification_with_document() {
    let url = skip_unless_db!();
    let pool = connect(&url).await;
    let repo = classifications_repo(&pool).await;

    let doc = seed_document(&pool, "review").await;
    let cls = seed_classification(&pool, doc).await;

    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(doc)
        .execute(&pool)
        .await
        .expect("delete document");

    assert!(matches!(repo.find(cls).await, Err(Error::NotFound)));
}
