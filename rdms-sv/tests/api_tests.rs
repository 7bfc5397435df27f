//! Integration tests for the supervisor API
//!
//! Exercise the full HTTP surface against an in-memory database: bearer
//! auth, role gates, the RDMP activation lifecycle, ingest finalization,
//! and the derived remediation views.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use rdms_sv::{build_router, AppState};

const PI_TOKEN: &str = "token-pi";
const STEWARD_TOKEN: &str = "token-steward";
const RESEARCHER_TOKEN: &str = "token-researcher";

struct TestEnv {
    app: Router,
    pool: SqlitePool,
    lab_id: Uuid,
}

async fn seed_user(pool: &SqlitePool, username: &str, token: &str) -> Uuid {
    let guid = Uuid::new_v4();
    sqlx::query("INSERT INTO users (guid, username, api_token) VALUES (?, ?, ?)")
        .bind(guid.to_string())
        .bind(username)
        .bind(token)
        .execute(pool)
        .await
        .unwrap();
    guid
}

async fn seed_member(pool: &SqlitePool, lab_id: Uuid, user_id: Uuid, role: &str) {
    sqlx::query("INSERT INTO lab_members (guid, lab_id, user_id, role) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(lab_id.to_string())
        .bind(user_id.to_string())
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
}

/// Fresh app over an in-memory database with a three-role lab roster
async fn setup() -> TestEnv {
    // Single connection: a pooled :memory: database is per-connection
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    rdms_common::db::init::init_schema(&pool).await.unwrap();

    let lab_id = Uuid::new_v4();
    sqlx::query("INSERT INTO labs (guid, name) VALUES (?, 'Genomics Lab')")
        .bind(lab_id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let pi = seed_user(&pool, "pi", PI_TOKEN).await;
    let steward = seed_user(&pool, "steward", STEWARD_TOKEN).await;
    let researcher = seed_user(&pool, "researcher", RESEARCHER_TOKEN).await;
    seed_member(&pool, lab_id, pi, "PI").await;
    seed_member(&pool, lab_id, steward, "STEWARD").await;
    seed_member(&pool, lab_id, researcher, "RESEARCHER").await;

    let app = build_router(AppState::new(pool.clone()));
    TestEnv { app, pool, lab_id }
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

async fn send(env: &TestEnv, req: Request<Body>) -> (StatusCode, Value) {
    let response = env.app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    (status, json_body(response).await)
}

/// POST /api/projects as the researcher, returning the project id
async fn create_project(env: &TestEnv, name: &str) -> Uuid {
    let (status, body) = send(
        env,
        request(
            "POST",
            "/api/projects",
            Some(RESEARCHER_TOKEN),
            Some(json!({ "lab_id": env.lab_id, "name": name })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["guid"].as_str().unwrap().parse().unwrap()
}

/// Create a draft as steward and activate it as PI
async fn activate_rdmp(env: &TestEnv, project_id: Uuid, content: Value) -> Uuid {
    let (status, body) = send(
        env,
        request(
            "POST",
            &format!("/api/projects/{}/rdmps", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "title": "Data plan", "content": content })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rdmp_id: Uuid = body["guid"].as_str().unwrap().parse().unwrap();

    let (status, _) = send(
        env,
        request(
            "POST",
            &format!("/api/rdmps/{}/activate", rdmp_id),
            Some(PI_TOKEN),
            Some(json!({ "reason": "initial approval" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    rdmp_id
}

/// Register a storage root as steward
async fn create_root(env: &TestEnv, project_id: Uuid, name: &str) -> Uuid {
    let (status, body) = send(
        env,
        request(
            "POST",
            &format!("/api/projects/{}/storage-roots", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "name": name })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["guid"].as_str().unwrap().parse().unwrap()
}

async fn create_pending(env: &TestEnv, project_id: Uuid, root_id: Uuid, path: &str) -> Uuid {
    let (status, body) = send(
        env,
        request(
            "POST",
            &format!("/api/projects/{}/pending-ingests", project_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "storage_root_id": root_id, "relative_path": path })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["guid"].as_str().unwrap().parse().unwrap()
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn health_needs_no_auth() {
    let env = setup().await;
    let (status, body) = send(&env, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "rdms-sv");
}

#[tokio::test]
async fn api_rejects_missing_and_unknown_tokens() {
    let env = setup().await;

    let (status, body) = send(&env, request("GET", "/api/projects", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &env,
        request("GET", "/api/projects", Some("no-such-token"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Projects and visibility
// ============================================================================

#[tokio::test]
async fn duplicate_project_name_is_rejected() {
    let env = setup().await;
    create_project(&env, "Mouse Atlas").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            "/api/projects",
            Some(RESEARCHER_TOKEN),
            Some(json!({ "lab_id": env.lab_id, "name": "Mouse Atlas" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn non_member_sees_project_as_not_found() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    seed_user(&env.pool, "outsider", "token-outsider").await;
    let (status, _) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}", project_id),
            Some("token-outsider"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn project_reports_derived_rdmp_status() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["rdmp_status"], "NONE");

    activate_rdmp(&env, project_id, json!({})).await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["rdmp_status"], "ACTIVE");
}

// ============================================================================
// RDMP lifecycle
// ============================================================================

#[tokio::test]
async fn researcher_cannot_draft_and_steward_cannot_activate() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/rdmps", project_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "title": "Plan", "content": {} })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/rdmps", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "title": "Plan", "content": {} })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rdmp_id = body["guid"].as_str().unwrap();

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/rdmps/{}/activate", rdmp_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "reason": "ready" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");
}

#[tokio::test]
async fn activation_requires_a_reason() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (_, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/rdmps", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "title": "Plan", "content": {} })),
        ),
    )
    .await;
    let rdmp_id = body["guid"].as_str().unwrap().to_string();

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/rdmps/{}/activate", rdmp_id),
            Some(PI_TOKEN),
            Some(json!({ "reason": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn activation_supersedes_and_double_activation_conflicts() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let first = activate_rdmp(&env, project_id, json!({})).await;

    // Re-activating the now-ACTIVE version is a state conflict
    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/rdmps/{}/activate", first),
            Some(PI_TOKEN),
            Some(json!({ "reason": "again" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");

    // A second version activates and supersedes the first
    let second = activate_rdmp(&env, project_id, json!({})).await;
    assert_ne!(first, second);

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/rdmps", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    let rdmps = body["rdmps"].as_array().unwrap();
    let active: Vec<_> = rdmps.iter().filter(|r| r["status"] == "ACTIVE").collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["guid"].as_str().unwrap(), second.to_string());
    assert!(rdmps.iter().any(|r| r["status"] == "SUPERSEDED"));
}

#[tokio::test]
async fn editing_an_activated_version_conflicts() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    let rdmp_id = activate_rdmp(&env, project_id, json!({})).await;

    let (status, body) = send(
        &env,
        request(
            "PATCH",
            &format!("/api/rdmps/{}", rdmp_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "title": "Too late" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");
}

#[tokio::test]
async fn malformed_content_document_is_rejected() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/rdmps", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "title": "Plan", "content": { "fields": [{ "type": "text" }] } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Identifier detection
// ============================================================================

#[tokio::test]
async fn bad_detection_regex_is_rejected_at_configuration() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (status, body) = send(
        &env,
        request(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({
                "sample_id_rule_type": "filename_regex",
                "sample_id_regex": "([unclosed",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn detection_preview_extracts_identifiers() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (status, _) = send(
        &env,
        request(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({
                "sample_id_rule_type": "filename_regex",
                "sample_id_regex": "(?P<sample_id>SAMPLE-\\d+)",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/detect-sample-id", project_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({
                "filenames": ["run1/SAMPLE-001_reads.fastq", "notes.txt"],
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], true);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results[0]["detected_sample_id"], "SAMPLE-001");
    assert_eq!(results[1]["detected_sample_id"], Value::Null);
    assert!(body["explanation"].as_str().unwrap().contains("SAMPLE-001_reads.fastq"));
}

#[tokio::test]
async fn detection_rule_can_be_cleared_with_explicit_nulls() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (status, _) = send(
        &env,
        request(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({
                "sample_id_rule_type": "filename_regex",
                "sample_id_regex": "(?P<sample_id>SAMPLE-\\d+)",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &env,
        request(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({
                "sample_id_rule_type": null,
                "sample_id_regex": null,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_id_rule_type"], Value::Null);
    assert_eq!(body["sample_id_regex"], Value::Null);

    let (_, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/detect-sample-id", project_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "filenames": ["SAMPLE-001.fastq"] })),
        ),
    )
    .await;
    assert_eq!(body["configured"], false);
}

// ============================================================================
// Ingest pipeline
// ============================================================================

#[tokio::test]
async fn finalize_is_blocked_without_an_active_rdmp() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    let root_id = create_root(&env, project_id, "nas").await;
    let ingest_id = create_pending(&env, project_id, root_id, "run1/a.fastq").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/pending-ingests/{}/finalize", ingest_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"]["code"], "BLOCKING_PRECONDITION");
}

#[tokio::test]
async fn duplicate_pending_path_is_rejected() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    let root_id = create_root(&env, project_id, "nas").await;
    create_pending(&env, project_id, root_id, "run1/a.fastq").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/pending-ingests", project_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "storage_root_id": root_id, "relative_path": "run1/a.fastq" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn finalize_by_identifier_is_idempotent_on_the_sample() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(&env, project_id, json!({})).await;
    let root_id = create_root(&env, project_id, "nas").await;

    let first = create_pending(&env, project_id, root_id, "run1/a.fastq").await;
    let second = create_pending(&env, project_id, root_id, "run1/b.fastq").await;

    let (status, body_a) = send(
        &env,
        request(
            "POST",
            &format!("/api/pending-ingests/{}/finalize", first),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "sample_identifier": "SAMPLE-001" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body_b) = send(
        &env,
        request(
            "POST",
            &format!("/api/pending-ingests/{}/finalize", second),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "sample_identifier": "SAMPLE-001" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Both files link to the one sample
    assert_eq!(body_a["sample_id"], body_b["sample_id"]);

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/samples", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["samples"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn finalize_twice_conflicts_and_drops_empty_field_values() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(
        &env,
        project_id,
        json!({ "fields": [
            { "key": "organism", "type": "text", "required": true },
            { "key": "tissue", "type": "text" },
        ]}),
    )
    .await;
    let root_id = create_root(&env, project_id, "nas").await;
    let ingest_id = create_pending(&env, project_id, root_id, "run1/a.fastq").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/pending-ingests/{}/finalize", ingest_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({
                "sample_identifier": "SAMPLE-001",
                "field_values": { "organism": "mouse", "tissue": "", "batch": null },
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sample_id = body["sample_id"].as_str().unwrap().to_string();

    let (_, sample) = send(
        &env,
        request(
            "GET",
            &format!("/api/samples/{}", sample_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(sample["field_values"]["organism"], "mouse");
    assert!(sample["field_values"].get("tissue").is_none());
    assert!(sample["field_values"].get("batch").is_none());

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/pending-ingests/{}/finalize", ingest_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_CONFLICT");
}

#[tokio::test]
async fn finalize_without_identifier_leaves_the_item_orphaned() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(&env, project_id, json!({})).await;
    let root_id = create_root(&env, project_id, "nas").await;
    let ingest_id = create_pending(&env, project_id, root_id, "misc/scan.tif").await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/pending-ingests/{}/finalize", ingest_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_id"], Value::Null);

    let (_, items) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/raw-data-items?orphaned=true", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(items["raw_data_items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_resolves_without_cataloguing() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    let root_id = create_root(&env, project_id, "nas").await;
    let ingest_id = create_pending(&env, project_id, root_id, "junk.tmp").await;

    let (status, body) = send(
        &env,
        request(
            "DELETE",
            &format!("/api/pending-ingests/{}", ingest_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    // Cancelling again is a conflict
    let (status, _) = send(
        &env,
        request(
            "DELETE",
            &format!("/api/pending-ingests/{}", ingest_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, items) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/raw-data-items", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert!(items["raw_data_items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn pending_ingest_serves_form_defaults_from_detection() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    send(
        &env,
        request(
            "PATCH",
            &format!("/api/projects/{}", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({
                "sample_id_rule_type": "filename_regex",
                "sample_id_regex": "(?P<sample_id>SAMPLE-\\d+)",
            })),
        ),
    )
    .await;
    let root_id = create_root(&env, project_id, "nas").await;
    let ingest_id = create_pending(&env, project_id, root_id, "run1/SAMPLE-007.fastq").await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/pending-ingests/{}", ingest_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["detected_sample_id"], "SAMPLE-007");
    assert_eq!(body["form_defaults"]["entry_mode"], "identifier");
    assert_eq!(body["form_defaults"]["sample_identifier"], "SAMPLE-007");
}

// ============================================================================
// Samples
// ============================================================================

#[tokio::test]
async fn sample_field_values_validate_against_the_active_rdmp() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(
        &env,
        project_id,
        json!({ "fields": [
            { "key": "organism", "type": "select", "required": true,
              "allowed_values": ["mouse", "rat"] },
        ]}),
    )
    .await;

    let (status, body) = send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/samples", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "sample_identifier": "SAMPLE-001" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sample_id = body["guid"].as_str().unwrap().to_string();

    // Unknown field key
    let (status, _) = send(
        &env,
        request(
            "PUT",
            &format!("/api/samples/{}/fields/nonexistent", sample_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "value": "x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Value outside allowed_values
    let (status, _) = send(
        &env,
        request(
            "PUT",
            &format!("/api/samples/{}/fields/organism", sample_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "value": "zebrafish" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &env,
        request(
            "PUT",
            &format!("/api/samples/{}/fields/organism", sample_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "value": "mouse" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["field_values"]["organism"], "mouse");
}

#[tokio::test]
async fn sample_listing_reports_missing_required_fields() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(
        &env,
        project_id,
        json!({ "fields": [
            { "key": "organism", "type": "text", "required": true },
            { "key": "tissue", "type": "text", "required": true },
            { "key": "notes", "type": "text" },
        ]}),
    )
    .await;

    send(
        &env,
        request(
            "POST",
            &format!("/api/projects/{}/samples", project_id),
            Some(STEWARD_TOKEN),
            Some(json!({ "sample_identifier": "SAMPLE-001" })),
        ),
    )
    .await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/samples", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    let samples = body["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    let missing = samples[0]["missing_required_fields"].as_array().unwrap();
    assert_eq!(missing.len(), 2);
}

// ============================================================================
// Remediation and lab status
// ============================================================================

#[tokio::test]
async fn remediation_clears_as_the_project_gets_organized() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/remediation", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["well_organized"], false);
    let tasks = body["tasks"].as_array().unwrap();
    assert!(tasks.iter().any(|t| t["code"] == "no_active_rdmp"));

    activate_rdmp(&env, project_id, json!({})).await;
    create_root(&env, project_id, "nas").await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/projects/{}/remediation", project_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["well_organized"], true);
    assert!(body["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn lab_status_requires_steward_and_counts_projects() {
    let env = setup().await;
    let organized = create_project(&env, "Organized").await;
    activate_rdmp(&env, organized, json!({})).await;
    create_project(&env, "Unplanned").await;

    let (status, _) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/status", env.lab_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/status", env.lab_id),
            Some(STEWARD_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_projects"], 2);
    assert_eq!(body["by_rdmp_status"]["active"], 1);
    assert_eq!(body["by_rdmp_status"]["no_rdmp"], 1);

    let items = body["needs_attention"].as_array().unwrap();
    assert!(items
        .iter()
        .any(|i| i["item_type"] == "project_operational_without_active_rdmp"));
    assert!(items.iter().any(|i| i["item_type"] == "project_without_rdmp"));
}

// ============================================================================
// Labs: my-role, activity, checklist
// ============================================================================

#[tokio::test]
async fn my_role_reports_membership_or_null() {
    let env = setup().await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/my-role", env.lab_id),
            Some(STEWARD_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["role"], "STEWARD");

    seed_user(&env.pool, "outsider", "token-outsider").await;
    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/my-role", env.lab_id),
            Some("token-outsider"),
            None,
        ),
    )
    .await;
    assert_eq!(body["role"], Value::Null);
}

#[tokio::test]
async fn activity_log_records_governance_events_newest_first() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(&env, project_id, json!({})).await;

    let (status, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/activity", env.lab_id),
            Some(STEWARD_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let actions: Vec<&str> = body["activity"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"project_created"));
    assert!(actions.contains(&"rdmp_draft_created"));
    assert!(actions.contains(&"rdmp_activated"));

    // Researcher may not read the trail
    let (status, _) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/activity", env.lab_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn checklist_dismissal_resets_while_incomplete() {
    let env = setup().await;
    create_project(&env, "Mouse Atlas").await;

    let (status, _) = send(
        &env,
        request(
            "PUT",
            &format!("/api/labs/{}/checklist-dismissed", env.lab_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "dismissed": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The lab has no project with an active RDMP and storage root, so the
    // dismissal does not stick
    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/checklist-dismissed", env.lab_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["dismissed"], false);
    assert_eq!(body["checklist_complete"], false);
}

#[tokio::test]
async fn checklist_dismissal_sticks_once_complete() {
    let env = setup().await;
    let project_id = create_project(&env, "Mouse Atlas").await;
    activate_rdmp(&env, project_id, json!({})).await;
    create_root(&env, project_id, "nas").await;

    send(
        &env,
        request(
            "PUT",
            &format!("/api/labs/{}/checklist-dismissed", env.lab_id),
            Some(RESEARCHER_TOKEN),
            Some(json!({ "dismissed": true })),
        ),
    )
    .await;

    let (_, body) = send(
        &env,
        request(
            "GET",
            &format!("/api/labs/{}/checklist-dismissed", env.lab_id),
            Some(RESEARCHER_TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(body["dismissed"], true);
    assert_eq!(body["checklist_complete"], true);
}
