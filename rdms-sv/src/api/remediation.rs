//! Remediation worklist and lab needs-attention handlers
//!
//! Both endpoints fetch a snapshot and hand it to the pure derivers in
//! `services::remediation`; nothing here is persisted.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::{load_project, require_member, require_role};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::lifecycle::required_field_keys;
use crate::services::permissions::Role;
use crate::services::remediation::{
    derive_lab_status, derive_project_tasks, LabProjectSnapshot, LabSnapshot, ProjectSnapshot,
    SampleCompleteness,
};
use crate::AppState;

/// Assemble the governance snapshot the project deriver runs over
async fn project_snapshot(state: &AppState, project_id: Uuid) -> ApiResult<ProjectSnapshot> {
    let rdmp_statuses = db::rdmp::statuses_for_project(&state.db, project_id).await?;
    let storage_root_count = db::storage::count_roots(&state.db, project_id).await? as usize;
    let pending_ingest_count = db::ingest::count_pending(&state.db, project_id).await? as usize;
    let orphaned_raw_data_count = db::storage::count_orphaned(&state.db, project_id).await? as usize;

    let required = db::rdmp::active_for_project(&state.db, project_id)
        .await?
        .map(|rdmp| required_field_keys(&rdmp.content))
        .unwrap_or_default();

    let incomplete_samples = if required.is_empty() {
        Vec::new()
    } else {
        let samples = db::samples::list_for_project(&state.db, project_id).await?;
        let keys_by_sample = db::samples::field_keys_by_sample(&state.db, project_id).await?;

        samples
            .iter()
            .filter_map(|sample| {
                let present = keys_by_sample.get(&sample.guid);
                let missing: Vec<String> = required
                    .iter()
                    .filter(|key| !present.is_some_and(|keys| keys.contains(key)))
                    .cloned()
                    .collect();
                (!missing.is_empty()).then(|| SampleCompleteness {
                    sample_identifier: sample.sample_identifier.clone(),
                    missing_required_fields: missing,
                })
            })
            .collect()
    };

    Ok(ProjectSnapshot {
        project_id,
        rdmp_statuses,
        storage_root_count,
        pending_ingest_count,
        incomplete_samples,
        orphaned_raw_data_count,
    })
}

/// GET /api/projects/:id/remediation
pub async fn project_remediation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let snapshot = project_snapshot(&state, project_id).await?;
    let report = derive_project_tasks(&snapshot);

    Ok(Json(json!(report)))
}

/// GET /api/labs/:id/status: Steward+
pub async fn lab_status(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(lab_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    db::labs::get_lab(&state.db, lab_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lab {} not found", lab_id)))?;
    require_role(
        &state,
        lab_id,
        user.guid,
        &[Role::Steward],
        "viewing lab status",
    )
    .await?;

    let mut projects = Vec::new();
    for project in db::projects::list_for_lab(&state.db, lab_id).await? {
        let rdmp_statuses = db::rdmp::statuses_for_project(&state.db, project.guid).await?;
        projects.push(LabProjectSnapshot {
            project_id: project.guid,
            is_active: project.is_active,
            rdmp_statuses,
        });
    }

    let snapshot = LabSnapshot {
        lab_id,
        projects,
        has_steward_or_pi: db::labs::has_steward_or_pi(&state.db, lab_id).await?,
    };
    let summary = derive_lab_status(&snapshot);

    Ok(Json(json!(summary)))
}
