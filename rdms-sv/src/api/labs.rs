//! Lab handlers: role introspection, the activity trail, and onboarding
//! checklist preferences.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::require_role;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::lifecycle::{project_status, ProjectRdmpStatus};
use crate::services::permissions::Role;
use crate::AppState;

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
const MAX_ACTIVITY_LIMIT: i64 = 200;

async fn load_lab(state: &AppState, lab_id: Uuid) -> ApiResult<db::labs::Lab> {
    db::labs::get_lab(&state.db, lab_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lab {} not found", lab_id)))
}

/// Membership gate for lab-scoped reads; non-members see NotFound
async fn require_lab_member(state: &AppState, lab_id: Uuid, user_id: Uuid) -> ApiResult<Role> {
    db::labs::member_role(&state.db, lab_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lab {} not found", lab_id)))
}

/// GET /api/labs/:id/my-role
///
/// Returns null for authenticated users outside the lab, so the UI can
/// distinguish "no access" from "no such lab".
pub async fn my_role(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(lab_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let lab = load_lab(&state, lab_id).await?;
    let role = db::labs::member_role(&state.db, lab_id, user.guid).await?;

    Ok(Json(json!({
        "lab_id": lab.guid,
        "lab_name": lab.name,
        "role": role,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

/// GET /api/labs/:id/activity: Steward+, newest first
pub async fn list_activity(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(lab_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Json<Value>> {
    load_lab(&state, lab_id).await?;
    require_role(
        &state,
        lab_id,
        user.guid,
        &[Role::Steward],
        "viewing lab activity",
    )
    .await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let entries = db::labs::list_activity(&state.db, lab_id, limit).await?;

    let out: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "guid": e.guid,
                "project_id": e.project_id,
                "actor_user_id": e.actor_user_id,
                "action": e.action,
                "detail": e.detail,
                "created_at": e.created_at,
            })
        })
        .collect();

    Ok(Json(json!({ "activity": out })))
}

/// Whether the lab's onboarding checklist is satisfied: at least one
/// project holding both an ACTIVE RDMP and a registered storage root.
async fn checklist_complete(state: &AppState, lab_id: Uuid) -> ApiResult<bool> {
    let projects = db::projects::list_for_lab(&state.db, lab_id).await?;
    for project in &projects {
        let statuses = db::rdmp::statuses_for_project(&state.db, project.guid).await?;
        if project_status(&statuses) != ProjectRdmpStatus::Active {
            continue;
        }
        if db::storage::count_roots(&state.db, project.guid).await? > 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// GET /api/labs/:id/checklist-dismissed
///
/// A stored dismissal is only honored while the checklist stays complete;
/// if the lab regresses the flag resets so the checklist resurfaces.
pub async fn get_checklist_dismissed(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(lab_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    load_lab(&state, lab_id).await?;
    require_lab_member(&state, lab_id, user.guid).await?;

    let complete = checklist_complete(&state, lab_id).await?;
    let mut dismissed = db::labs::checklist_dismissed(&state.db, user.guid, lab_id).await?;

    if dismissed && !complete {
        db::labs::set_checklist_dismissed(&state.db, user.guid, lab_id, false).await?;
        dismissed = false;
    }

    Ok(Json(json!({
        "dismissed": dismissed,
        "checklist_complete": complete,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SetDismissedRequest {
    pub dismissed: bool,
}

/// PUT /api/labs/:id/checklist-dismissed
pub async fn set_checklist_dismissed(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(lab_id): Path<Uuid>,
    Json(req): Json<SetDismissedRequest>,
) -> ApiResult<Json<Value>> {
    load_lab(&state, lab_id).await?;
    require_lab_member(&state, lab_id, user.guid).await?;

    db::labs::set_checklist_dismissed(&state.db, user.guid, lab_id, req.dismissed).await?;

    Ok(Json(json!({ "dismissed": req.dismissed })))
}
