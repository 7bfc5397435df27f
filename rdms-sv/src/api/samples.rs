//! Sample handlers, including completeness against the active RDMP

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::{load_project, require_member, require_role};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::lifecycle::{find_field, required_field_keys};
use crate::services::permissions::Role;
use crate::AppState;

fn sample_json(sample: &db::samples::Sample, missing: &[String]) -> Value {
    json!({
        "guid": sample.guid,
        "project_id": sample.project_id,
        "sample_identifier": sample.sample_identifier,
        "missing_required_fields": missing,
        "created_at": sample.created_at,
        "created_by": sample.created_by,
    })
}

async fn load_sample(state: &AppState, sample_id: Uuid) -> ApiResult<db::samples::Sample> {
    db::samples::get_sample(&state.db, sample_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sample {} not found", sample_id)))
}

/// Required field keys of the project's active RDMP; empty when none
async fn active_required_keys(state: &AppState, project_id: Uuid) -> ApiResult<Vec<String>> {
    Ok(db::rdmp::active_for_project(&state.db, project_id)
        .await?
        .map(|rdmp| required_field_keys(&rdmp.content))
        .unwrap_or_default())
}

/// GET /api/projects/:id/samples
///
/// Each sample carries the required fields it has not yet filled in,
/// measured against the active RDMP.
pub async fn list_samples(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let samples = db::samples::list_for_project(&state.db, project_id).await?;
    let required = active_required_keys(&state, project_id).await?;
    let keys_by_sample = db::samples::field_keys_by_sample(&state.db, project_id).await?;

    let out: Vec<Value> = samples
        .iter()
        .map(|sample| {
            let present = keys_by_sample.get(&sample.guid);
            let missing: Vec<String> = required
                .iter()
                .filter(|key| !present.is_some_and(|keys| keys.contains(key)))
                .cloned()
                .collect();
            sample_json(sample, &missing)
        })
        .collect();

    Ok(Json(json!({ "samples": out })))
}

#[derive(Debug, Deserialize)]
pub struct CreateSampleRequest {
    pub sample_identifier: String,
}

/// POST /api/projects/:id/samples: Steward+
pub async fn create_sample(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateSampleRequest>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_role(
        &state,
        project.lab_id,
        user.guid,
        &[Role::Steward],
        "creating a sample",
    )
    .await?;

    let identifier = req.sample_identifier.trim();
    if identifier.is_empty() {
        return Err(ApiError::Validation(
            "sample_identifier is required".to_string(),
        ));
    }
    if db::samples::find_by_identifier(&state.db, project_id, identifier)
        .await?
        .is_some()
    {
        return Err(ApiError::Validation(format!(
            "sample '{}' already exists in this project",
            identifier
        )));
    }

    let sample = db::samples::create_sample(&state.db, project_id, identifier, user.guid).await?;
    Ok(Json(sample_json(&sample, &[])))
}

/// GET /api/samples/:id: includes the full field-value map
pub async fn get_sample(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(sample_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let sample = load_sample(&state, sample_id).await?;
    let project = load_project(&state, sample.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let values = db::samples::field_values(&state.db, sample_id).await?;
    let required = active_required_keys(&state, sample.project_id).await?;
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !values.contains_key(*key))
        .cloned()
        .collect();

    let mut body = sample_json(&sample, &missing);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("field_values".to_string(), json!(values));
    }

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct SetFieldRequest {
    pub value: String,
}

/// PUT /api/samples/:id/fields/:key
///
/// The key must name a field defined in the active RDMP; categorical
/// fields additionally check the value against `allowed_values`.
pub async fn set_field_value(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((sample_id, field_key)): Path<(Uuid, String)>,
    Json(req): Json<SetFieldRequest>,
) -> ApiResult<Json<Value>> {
    let sample = load_sample(&state, sample_id).await?;
    let project = load_project(&state, sample.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let value = req.value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation("value cannot be empty".to_string()));
    }

    let active = db::rdmp::active_for_project(&state.db, sample.project_id)
        .await?
        .ok_or_else(|| {
            ApiError::Validation(
                "the project has no active RDMP defining sample fields".to_string(),
            )
        })?;

    let field = find_field(&active.content, &field_key).ok_or_else(|| {
        ApiError::Validation(format!(
            "field '{}' is not defined in the active RDMP",
            field_key
        ))
    })?;

    if let Some(allowed) = field.get("allowed_values").and_then(Value::as_array) {
        if !allowed.is_empty() && !allowed.iter().any(|v| v.as_str() == Some(value)) {
            return Err(ApiError::Validation(format!(
                "'{}' is not an allowed value for field '{}'",
                value, field_key
            )));
        }
    }

    db::samples::upsert_field_value(&state.db, sample_id, &field_key, value, user.guid).await?;

    let values = db::samples::field_values(&state.db, sample_id).await?;
    Ok(Json(json!({
        "sample_id": sample_id,
        "field_values": values,
    })))
}
