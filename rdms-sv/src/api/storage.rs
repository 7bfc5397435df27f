//! Storage root and raw-data-item handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::{load_project, require_member, require_role};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::permissions::Role;
use crate::AppState;

fn root_json(root: &db::storage::StorageRoot) -> Value {
    json!({
        "guid": root.guid,
        "project_id": root.project_id,
        "name": root.name,
        "description": root.description,
        "created_at": root.created_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateRootRequest {
    pub name: String,
    pub description: Option<String>,
}

/// POST /api/projects/:id/storage-roots: Steward+
pub async fn create_root(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateRootRequest>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_role(
        &state,
        project.lab_id,
        user.guid,
        &[Role::Steward],
        "registering a storage root",
    )
    .await?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(
            "storage root name is required".to_string(),
        ));
    }
    if db::storage::root_name_exists(&state.db, project_id, name).await? {
        return Err(ApiError::Validation(format!(
            "a storage root named '{}' already exists for this project",
            name
        )));
    }

    let root =
        db::storage::create_root(&state.db, project_id, name, req.description.as_deref()).await?;
    Ok(Json(root_json(&root)))
}

/// GET /api/projects/:id/storage-roots
pub async fn list_roots(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let roots = db::storage::list_roots(&state.db, project_id).await?;
    let out: Vec<Value> = roots.iter().map(root_json).collect();

    Ok(Json(json!({ "storage_roots": out })))
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub sample_id: Option<Uuid>,
    #[serde(default)]
    pub orphaned: bool,
}

/// GET /api/projects/:id/raw-data-items
///
/// Optional sample filter, or `orphaned=true` for items with no sample
/// link. Items are enriched with the storage root name and the sample
/// identifier so the catalogue view needs no follow-up lookups.
pub async fn list_items(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let items =
        db::storage::list_items(&state.db, project_id, query.sample_id, query.orphaned).await?;

    let roots: HashMap<Uuid, String> = db::storage::list_roots(&state.db, project_id)
        .await?
        .into_iter()
        .map(|r| (r.guid, r.name))
        .collect();
    let samples: HashMap<Uuid, String> = db::samples::list_for_project(&state.db, project_id)
        .await?
        .into_iter()
        .map(|s| (s.guid, s.sample_identifier))
        .collect();

    let out: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "guid": item.guid,
                "project_id": item.project_id,
                "storage_root_id": item.storage_root_id,
                "storage_root_name": roots.get(&item.storage_root_id),
                "sample_id": item.sample_id,
                "sample_identifier": item.sample_id.and_then(|s| samples.get(&s)),
                "relative_path": item.relative_path,
                "file_size_bytes": item.file_size_bytes,
                "file_hash_sha256": item.file_hash_sha256,
                "created_at": item.created_at,
            })
        })
        .collect();

    Ok(Json(json!({ "raw_data_items": out })))
}

#[derive(Debug, Deserialize)]
pub struct AssignSampleRequest {
    pub sample_id: Uuid,
}

/// PUT /api/raw-data-items/:id/sample
///
/// Links an orphaned item to a sample after the fact. The sample must
/// belong to the same project as the item.
pub async fn assign_sample(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<AssignSampleRequest>,
) -> ApiResult<Json<Value>> {
    let item = db::storage::get_item(&state.db, item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("raw data item {} not found", item_id)))?;
    let project = load_project(&state, item.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let sample = db::samples::get_sample(&state.db, req.sample_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sample {} not found", req.sample_id)))?;
    if sample.project_id != item.project_id {
        return Err(ApiError::Validation(
            "sample belongs to a different project".to_string(),
        ));
    }

    db::storage::assign_sample(&state.db, item_id, sample.guid).await?;

    Ok(Json(json!({
        "guid": item_id,
        "sample_id": sample.guid,
        "sample_identifier": sample.sample_identifier,
    })))
}
