//! Project handlers: CRUD, membership-scoped listing, and the identifier
//! detection rule preview.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::{load_project, require_member, require_role};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::detector::{self, DetectionRule};
use crate::services::lifecycle::project_status;
use crate::services::permissions::Role;
use crate::AppState;

pub(crate) fn project_json(project: &db::projects::Project, rdmp_status: &str) -> Value {
    json!({
        "guid": project.guid,
        "lab_id": project.lab_id,
        "name": project.name,
        "description": project.description,
        "is_active": project.is_active,
        "sample_id_rule_type": project.sample_id_rule_type,
        "sample_id_regex": project.sample_id_regex,
        "rdmp_status": rdmp_status,
        "created_at": project.created_at,
        "created_by": project.created_by,
    })
}

pub(crate) async fn project_with_status(
    state: &AppState,
    project: &db::projects::Project,
) -> ApiResult<Value> {
    let statuses = db::rdmp::statuses_for_project(&state.db, project.guid).await?;
    Ok(project_json(project, project_status(&statuses).as_str()))
}

/// The detection rule configured on a project, if complete
pub(crate) fn configured_rule(project: &db::projects::Project) -> Option<DetectionRule> {
    match (&project.sample_id_rule_type, &project.sample_id_regex) {
        (Some(rule_type), Some(pattern)) => Some(DetectionRule {
            rule_type: rule_type.clone(),
            pattern: pattern.clone(),
        }),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub lab_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// POST /api/projects
///
/// Any lab member may create a project in their lab.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<Json<Value>> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("project name is required".to_string()));
    }

    db::labs::get_lab(&state.db, req.lab_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lab {} not found", req.lab_id)))?;

    require_role(
        &state,
        req.lab_id,
        user.guid,
        &[Role::Researcher],
        "creating a project",
    )
    .await?;

    if db::projects::name_exists(&state.db, name).await? {
        return Err(ApiError::Validation(format!(
            "a project named '{}' already exists",
            name
        )));
    }

    let project = db::projects::create_project(
        &state.db,
        req.lab_id,
        name,
        req.description.as_deref(),
        user.guid,
    )
    .await?;

    db::labs::log_activity(
        &state.db,
        req.lab_id,
        Some(project.guid),
        user.guid,
        "project_created",
        json!({ "name": project.name }),
    )
    .await?;

    info!("Project created: {} ({})", project.name, project.guid);
    Ok(Json(project_json(&project, "NONE")))
}

/// GET /api/projects: projects in labs where the caller is a member
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    let projects = db::projects::list_visible(&state.db, user.guid).await?;

    let mut out = Vec::with_capacity(projects.len());
    for project in &projects {
        out.push(project_with_status(&state, project).await?);
    }

    Ok(Json(json!({ "projects": out })))
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    Ok(Json(project_with_status(&state, &project).await?))
}

/// Keeps an explicit JSON `null` (Some(None)) distinct from an absent
/// field (None) in PATCH bodies
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub sample_id_rule_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub sample_id_regex: Option<Option<String>>,
}

/// PATCH /api/projects/:id
///
/// Steward+. The identifier rule fields travel together; the pattern is
/// compiled here so a bad regex never reaches the detection path. Sending
/// both rule fields as null clears the configured rule.
pub async fn update_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_role(
        &state,
        project.lab_id,
        user.guid,
        &[Role::Steward],
        "updating a project",
    )
    .await?;

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("project name cannot be empty".to_string()));
        }
        if name.trim() != project.name && db::projects::name_exists(&state.db, name.trim()).await? {
            return Err(ApiError::Validation(format!(
                "a project named '{}' already exists",
                name.trim()
            )));
        }
    }

    let rule = match (&req.sample_id_rule_type, &req.sample_id_regex) {
        (Some(Some(rule_type)), Some(Some(pattern))) => {
            detector::validate_rule(rule_type, pattern)?;
            Some((Some(rule_type.as_str()), Some(pattern.as_str())))
        }
        // Both explicitly null: remove the configured rule
        (Some(None), Some(None)) => Some((None, None)),
        (None, None) => None,
        _ => {
            return Err(ApiError::Validation(
                "sample_id_rule_type and sample_id_regex must be set together".to_string(),
            ));
        }
    };

    db::projects::update_project(
        &state.db,
        project_id,
        req.name.as_deref().map(str::trim),
        req.description.as_deref(),
        rule,
    )
    .await?;

    let updated = load_project(&state, project_id).await?;
    Ok(Json(project_with_status(&state, &updated).await?))
}

#[derive(Debug, Deserialize)]
pub struct DetectPreviewRequest {
    pub filenames: Vec<String>,
}

/// POST /api/projects/:id/detect-sample-id
///
/// Dry-run of the configured rule against a list of filenames. Nothing is
/// persisted; the explanation block uses the first filename as its example.
pub async fn detect_preview(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<DetectPreviewRequest>,
) -> ApiResult<Json<Value>> {
    let project = load_project(&state, project_id).await?;
    require_member(&state, &project, user.guid).await?;

    let rule = configured_rule(&project);

    let results: Vec<Value> = req
        .filenames
        .iter()
        .map(|filename| {
            let detection = detector::detect(filename, rule.as_ref());
            json!({
                "filename": filename,
                "detected_sample_id": detection.detected_sample_id,
                "match_success": detection.match_success,
            })
        })
        .collect();

    let explanation = req
        .filenames
        .first()
        .map(|f| detector::detect(f, rule.as_ref()).explanation)
        .unwrap_or_else(|| detector::detect("", rule.as_ref()).explanation);

    Ok(Json(json!({
        "configured": rule.is_some(),
        "rule_type": project.sample_id_rule_type,
        "pattern": project.sample_id_regex,
        "results": results,
        "explanation": explanation,
    })))
}
