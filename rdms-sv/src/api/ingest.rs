//! Pending-ingest handlers: registration by the watcher, the review inbox,
//! and the finalize/cancel resolutions.
//!
//! Finalization is the governance chokepoint: it refuses to catalogue data
//! for a project whose RDMP is not ACTIVE, separately from any permission
//! check, so the error tells the user to fix the plan rather than their
//! role.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::projects::configured_rule;
use crate::api::{load_project, require_member};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::detector;
use crate::services::lifecycle::{project_status, ProjectRdmpStatus};
use crate::AppState;

fn ingest_json(ingest: &db::ingest::PendingIngest) -> Value {
    json!({
        "guid": ingest.guid,
        "project_id": ingest.project_id,
        "storage_root_id": ingest.storage_root_id,
        "relative_path": ingest.relative_path,
        "file_size_bytes": ingest.file_size_bytes,
        "file_hash_sha256": ingest.file_hash_sha256,
        "inferred_sample_identifier": ingest.inferred_sample_identifier,
        "detected_sample_id": ingest.detected_sample_id,
        "status": ingest.status,
        "raw_data_item_id": ingest.raw_data_item_id,
        "created_at": ingest.created_at,
        "resolved_at": ingest.resolved_at,
    })
}

async fn load_ingest(state: &AppState, ingest_id: Uuid) -> ApiResult<db::ingest::PendingIngest> {
    db::ingest::get_ingest(&state.db, ingest_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("pending ingest {} not found", ingest_id)))
}

#[derive(Debug, Deserialize)]
pub struct CreatePendingRequest {
    pub storage_root_id: Uuid,
    pub relative_path: String,
    pub file_size_bytes: Option<i64>,
    pub file_hash_sha256: Option<String>,
    pub inferred_sample_identifier: Option<String>,
}

/// POST /api/projects/:id/pending-ingests
///
/// Registration path used by the filesystem watcher. Detection runs once
/// here, against the configured project rule, and the result is stored on
/// the row for later form pre-fill.
pub async fn create_pending(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreatePendingRequest>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let relative_path = req.relative_path.trim();
    if relative_path.is_empty() {
        return Err(ApiError::Validation("relative_path is required".to_string()));
    }

    let root = db::storage::get_root(&state.db, req.storage_root_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("storage root {} not found", req.storage_root_id))
        })?;
    if root.project_id != project_id {
        return Err(ApiError::Validation(
            "storage root belongs to a different project".to_string(),
        ));
    }

    if db::ingest::pending_path_exists(&state.db, root.guid, relative_path).await? {
        return Err(ApiError::Validation(format!(
            "a pending ingest for '{}' already exists in this storage root",
            relative_path
        )));
    }

    let rule = configured_rule(&project);
    let detection = detector::detect(relative_path, rule.as_ref());

    let ingest = db::ingest::create_pending(
        &state.db,
        project_id,
        root.guid,
        relative_path,
        req.file_size_bytes,
        req.file_hash_sha256.as_deref(),
        req.inferred_sample_identifier.as_deref(),
        detection.detected_sample_id.as_deref(),
    )
    .await?;

    Ok(Json(ingest_json(&ingest)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// GET /api/projects/:id/pending-ingests?status=PENDING
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let ingests =
        db::ingest::list_for_project(&state.db, project_id, query.status.as_deref()).await?;
    let out: Vec<Value> = ingests.iter().map(ingest_json).collect();

    Ok(Json(json!({ "pending_ingests": out })))
}

/// GET /api/pending-ingests/:id
///
/// Includes the resolution-form defaults: detected identifier wins over
/// the watcher's inferred one, and either puts the form in identifier
/// entry mode.
pub async fn get_pending(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(ingest_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let ingest = load_ingest(&state, ingest_id).await?;
    let project = load_project(&state, ingest.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let prefill = ingest
        .detected_sample_id
        .clone()
        .or_else(|| ingest.inferred_sample_identifier.clone());
    let entry_mode = if prefill.is_some() {
        "identifier"
    } else {
        "existing"
    };

    let mut body = ingest_json(&ingest);
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "form_defaults".to_string(),
            json!({ "entry_mode": entry_mode, "sample_identifier": prefill }),
        );
    }

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub sample_id: Option<Uuid>,
    pub sample_identifier: Option<String>,
    #[serde(default)]
    pub field_values: Map<String, Value>,
}

/// POST /api/pending-ingests/:id/finalize
///
/// Resolution order: explicit sample_id, else sample_identifier
/// (get-or-create), else the item is catalogued orphaned. Field values
/// with null or empty-string values are dropped before application.
pub async fn finalize(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(ingest_id): Path<Uuid>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<Json<Value>> {
    let ingest = load_ingest(&state, ingest_id).await?;
    let project = load_project(&state, ingest.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    if ingest.status != "PENDING" {
        return Err(ApiError::StateConflict(format!(
            "pending ingest {} is not in PENDING status",
            ingest_id
        )));
    }

    let statuses = db::rdmp::statuses_for_project(&state.db, project.guid).await?;
    if project_status(&statuses) != ProjectRdmpStatus::Active {
        return Err(ApiError::BlockingPrecondition(
            "ingestion is disabled until an RDMP is activated for this project".to_string(),
        ));
    }

    let sample = match (req.sample_id, req.sample_identifier.as_deref()) {
        (Some(sample_id), _) => {
            let sample = db::samples::get_sample(&state.db, sample_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("sample {} not found", sample_id)))?;
            if sample.project_id != project.guid {
                return Err(ApiError::Validation(
                    "sample belongs to a different project".to_string(),
                ));
            }
            Some(sample)
        }
        (None, Some(identifier)) if !identifier.trim().is_empty() => Some(
            db::samples::get_or_create(&state.db, project.guid, identifier.trim(), user.guid)
                .await?,
        ),
        _ => None,
    };

    let item = db::ingest::finalize(
        &state.db,
        &ingest,
        sample.as_ref().map(|s| s.guid),
        user.guid,
    )
    .await?
    .ok_or_else(|| {
        ApiError::StateConflict(format!(
            "pending ingest {} is not in PENDING status",
            ingest_id
        ))
    })?;

    if let Some(sample) = &sample {
        for (key, value) in &req.field_values {
            let value = match value {
                Value::Null => continue,
                Value::String(s) if s.trim().is_empty() => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            db::samples::upsert_field_value(&state.db, sample.guid, key, &value, user.guid)
                .await?;
        }
    }

    db::labs::log_activity(
        &state.db,
        project.lab_id,
        Some(project.guid),
        user.guid,
        "ingest_finalized",
        json!({
            "relative_path": ingest.relative_path,
            "sample_identifier": sample.as_ref().map(|s| s.sample_identifier.clone()),
        }),
    )
    .await?;

    info!(
        "Ingest finalized: {} ({})",
        ingest.relative_path, item.guid
    );
    Ok(Json(json!({
        "raw_data_item_id": item.guid,
        "sample_id": item.sample_id,
        "status": "COMPLETED",
    })))
}

/// DELETE /api/pending-ingests/:id
///
/// Cancels the review; the file itself is never touched.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(ingest_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let ingest = load_ingest(&state, ingest_id).await?;
    let project = load_project(&state, ingest.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    if !db::ingest::cancel(&state.db, ingest_id).await? {
        return Err(ApiError::StateConflict(format!(
            "pending ingest {} is not in PENDING status",
            ingest_id
        )));
    }

    Ok(Json(json!({ "status": "CANCELLED" })))
}
