//! HTTP API handlers for the supervisor service

pub mod auth;
pub mod health;
pub mod ingest;
pub mod labs;
pub mod projects;
pub mod rdmp;
pub mod remediation;
pub mod samples;
pub mod storage;

pub use auth::auth_middleware;
pub use health::health_routes;

use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::permissions::{permits, Role};
use crate::AppState;

/// Load a project or report NotFound
pub(crate) async fn load_project(
    state: &AppState,
    project_id: Uuid,
) -> ApiResult<db::projects::Project> {
    db::projects::get_project(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {} not found", project_id)))
}

/// Read gate: the caller must be a member of the project's lab. Projects
/// in labs the caller does not belong to are reported as NotFound rather
/// than PermissionDenied.
pub(crate) async fn require_member(
    state: &AppState,
    project: &db::projects::Project,
    user_id: Uuid,
) -> ApiResult<Role> {
    db::labs::member_role(&state.db, project.lab_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {} not found", project.guid)))
}

/// Write gate: the caller's lab role must satisfy the requirement
pub(crate) async fn require_role(
    state: &AppState,
    lab_id: Uuid,
    user_id: Uuid,
    required: &[Role],
    action: &str,
) -> ApiResult<Role> {
    let role = db::labs::member_role(&state.db, lab_id, user_id).await?;
    if permits(role, required) {
        // permits(None, _) is false, so role is present here
        role.ok_or_else(|| ApiError::PermissionDenied(format!("{} requires lab membership", action)))
    } else {
        let needed = required
            .iter()
            .min()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "a higher".to_string());
        Err(ApiError::PermissionDenied(format!(
            "{} requires the {} role",
            action, needed
        )))
    }
}
