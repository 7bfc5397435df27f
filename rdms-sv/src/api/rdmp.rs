//! RDMP lifecycle handlers
//!
//! Drafting is open to Stewards and above; activation is reserved to the
//! PI and always records who approved and why. Activation is a single
//! guarded transaction, so concurrent activations cannot yield two ACTIVE
//! versions of one project.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::{load_project, require_member, require_role};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::lifecycle::{self, RdmpStatus};
use crate::services::permissions::Role;
use crate::AppState;

fn rdmp_json(rdmp: &db::rdmp::RdmpVersion) -> Value {
    json!({
        "guid": rdmp.guid,
        "project_id": rdmp.project_id,
        "version": rdmp.version,
        "status": rdmp.status,
        "title": rdmp.title,
        "content": rdmp.content,
        "reason": rdmp.reason,
        "approved_by": rdmp.approved_by,
        "created_at": rdmp.created_at,
        "updated_at": rdmp.updated_at,
        "created_by": rdmp.created_by,
    })
}

async fn load_rdmp(state: &AppState, rdmp_id: Uuid) -> ApiResult<db::rdmp::RdmpVersion> {
    db::rdmp::get_rdmp(&state.db, rdmp_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("RDMP version {} not found", rdmp_id)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDraftRequest {
    pub title: String,
    pub content: Value,
}

/// POST /api/projects/:id/rdmps
///
/// Steward+. Content is validated before any write; the new draft takes
/// the next version number for the project.
pub async fn create_draft(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateDraftRequest>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_role(
        &state,
        project.lab_id,
        user.guid,
        &[Role::Steward],
        "creating an RDMP draft",
    )
    .await?;

    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("RDMP title is required".to_string()));
    }
    lifecycle::validate_content(&req.content)?;

    let draft = db::rdmp::create_draft(&state.db, project_id, title, &req.content, user.guid).await?;

    db::labs::log_activity(
        &state.db,
        project.lab_id,
        Some(project_id),
        user.guid,
        "rdmp_draft_created",
        json!({ "version": draft.version, "title": draft.title }),
    )
    .await?;

    info!(
        "RDMP draft v{} created for project {}",
        draft.version, project_id
    );
    Ok(Json(rdmp_json(&draft)))
}

/// GET /api/projects/:id/rdmps: all versions, newest first
pub async fn list_versions(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let versions = db::rdmp::list_for_project(&state.db, project_id).await?;
    let out: Vec<Value> = versions.iter().map(rdmp_json).collect();

    Ok(Json(json!({ "rdmps": out })))
}

/// GET /api/projects/:id/rdmps/active
pub async fn get_active(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let active = db::rdmp::active_for_project(&state.db, project_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("project {} has no active RDMP", project_id))
        })?;

    Ok(Json(rdmp_json(&active)))
}

/// GET /api/rdmps/:id
pub async fn get_rdmp(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(rdmp_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let rdmp = load_rdmp(&state, rdmp_id).await?;
    let project = load_project(&state, rdmp.project_id).await?;
    require_member(&state, &project, user.guid).await?;

    Ok(Json(rdmp_json(&rdmp)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDraftRequest {
    pub title: Option<String>,
    pub content: Option<Value>,
}

/// PATCH /api/rdmps/:id
///
/// Steward+. Only DRAFT versions are editable; an activated or superseded
/// version reports a state conflict.
pub async fn update_draft(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(rdmp_id): Path<Uuid>,
    Json(req): Json<UpdateDraftRequest>,
) -> ApiResult<Json<Value>> {
    let rdmp = load_rdmp(&state, rdmp_id).await?;
    let project = load_project(&state, rdmp.project_id).await?;
    require_role(
        &state,
        project.lab_id,
        user.guid,
        &[Role::Steward],
        "editing an RDMP draft",
    )
    .await?;

    if let Some(title) = &req.title {
        if title.trim().is_empty() {
            return Err(ApiError::Validation("RDMP title cannot be empty".to_string()));
        }
    }
    if let Some(content) = &req.content {
        lifecycle::validate_content(content)?;
    }

    let updated = db::rdmp::update_draft(
        &state.db,
        rdmp_id,
        req.title.as_deref().map(str::trim),
        req.content.as_ref(),
    )
    .await?;

    if !updated {
        return Err(ApiError::StateConflict(format!(
            "RDMP version {} is not in DRAFT status",
            rdmp.version
        )));
    }

    Ok(Json(rdmp_json(&load_rdmp(&state, rdmp_id).await?)))
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub reason: String,
}

/// POST /api/rdmps/:id/activate
///
/// PI only. Requires a non-empty reason, which is recorded on the version
/// and in the lab activity log. The previous ACTIVE version, if any, is
/// superseded in the same transaction.
pub async fn activate(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(rdmp_id): Path<Uuid>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<Json<Value>> {
    let rdmp = load_rdmp(&state, rdmp_id).await?;
    let project = load_project(&state, rdmp.project_id).await?;
    require_role(
        &state,
        project.lab_id,
        user.guid,
        &[Role::Pi],
        "activating an RDMP",
    )
    .await?;

    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::Validation(
            "an activation reason is required".to_string(),
        ));
    }

    if rdmp.status != RdmpStatus::Draft {
        return Err(ApiError::StateConflict(format!(
            "RDMP version {} is not in DRAFT status",
            rdmp.version
        )));
    }

    let activated =
        db::rdmp::activate(&state.db, rdmp_id, rdmp.project_id, user.guid, reason).await?;
    if !activated {
        // Lost the race: another transition moved the version out of DRAFT
        return Err(ApiError::StateConflict(format!(
            "RDMP version {} is not in DRAFT status",
            rdmp.version
        )));
    }

    db::labs::log_activity(
        &state.db,
        project.lab_id,
        Some(rdmp.project_id),
        user.guid,
        "rdmp_activated",
        json!({ "version": rdmp.version, "reason": reason }),
    )
    .await?;

    info!(
        "RDMP v{} activated for project {} by {}",
        rdmp.version, rdmp.project_id, user.username
    );
    Ok(Json(rdmp_json(&load_rdmp(&state, rdmp_id).await?)))
}
