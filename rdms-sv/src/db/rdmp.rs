//! RDMP version database operations
//!
//! The DRAFT → ACTIVE → SUPERSEDED transitions are guarded UPDATEs run
//! inside one transaction: of two concurrent activations, exactly one
//! sees its affected-row count and the other reports a state conflict.

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::services::lifecycle::RdmpStatus;

/// RDMP version record
#[derive(Debug, Clone)]
pub struct RdmpVersion {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub version: i64,
    pub status: RdmpStatus,
    pub title: String,
    pub content: Value,
    pub reason: Option<String>,
    pub approved_by: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
    pub created_by: Uuid,
}

const RDMP_COLUMNS: &str = "guid, project_id, version, status, title, content, \
     reason, approved_by, created_at, updated_at, created_by";

fn rdmp_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RdmpVersion> {
    let guid_str: String = row.get("guid");
    let project_str: String = row.get("project_id");
    let status_str: String = row.get("status");
    let content_str: String = row.get("content");
    let approved_str: Option<String> = row.get("approved_by");
    let creator_str: String = row.get("created_by");

    Ok(RdmpVersion {
        guid: Uuid::parse_str(&guid_str)?,
        project_id: Uuid::parse_str(&project_str)?,
        version: row.get("version"),
        status: status_str.parse().map_err(anyhow::Error::msg)?,
        title: row.get("title"),
        content: serde_json::from_str(&content_str)?,
        reason: row.get("reason"),
        approved_by: match approved_str {
            Some(a) => Some(Uuid::parse_str(&a)?),
            None => None,
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        created_by: Uuid::parse_str(&creator_str)?,
    })
}

pub async fn get_rdmp(pool: &SqlitePool, rdmp_id: Uuid) -> Result<Option<RdmpVersion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM rdmp_versions WHERE guid = ?",
        RDMP_COLUMNS
    ))
    .bind(rdmp_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(rdmp_from_row).transpose()
}

/// All versions of a project, newest first
pub async fn list_for_project(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<RdmpVersion>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM rdmp_versions WHERE project_id = ? ORDER BY version DESC",
        RDMP_COLUMNS
    ))
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(rdmp_from_row).collect()
}

/// The currently active version, if any
pub async fn active_for_project(
    pool: &SqlitePool,
    project_id: Uuid,
) -> Result<Option<RdmpVersion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM rdmp_versions WHERE project_id = ? AND status = 'ACTIVE'",
        RDMP_COLUMNS
    ))
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(rdmp_from_row).transpose()
}

/// Bare status list used to derive the project's governance status
pub async fn statuses_for_project(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<RdmpStatus>> {
    let rows: Vec<String> =
        sqlx::query_scalar("SELECT status FROM rdmp_versions WHERE project_id = ?")
            .bind(project_id.to_string())
            .fetch_all(pool)
            .await?;

    rows.iter()
        .map(|s| s.parse().map_err(anyhow::Error::msg))
        .collect()
}

/// Create a new DRAFT at version max(existing) + 1. The version is
/// assigned inside the insert statement itself, so concurrent drafts of
/// one project take distinct version numbers.
pub async fn create_draft(
    pool: &SqlitePool,
    project_id: Uuid,
    title: &str,
    content: &Value,
    created_by: Uuid,
) -> Result<RdmpVersion> {
    let guid = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO rdmp_versions
            (guid, project_id, version, status, title, content, created_at, updated_at, created_by)
        SELECT ?, ?, COALESCE(MAX(version), 0) + 1, 'DRAFT', ?, ?, ?, ?, ?
        FROM rdmp_versions WHERE project_id = ?
        "#,
    )
    .bind(guid.to_string())
    .bind(project_id.to_string())
    .bind(title)
    .bind(content.to_string())
    .bind(&now)
    .bind(&now)
    .bind(created_by.to_string())
    .bind(project_id.to_string())
    .execute(pool)
    .await?;

    let next_version: i64 = sqlx::query_scalar("SELECT version FROM rdmp_versions WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_one(pool)
        .await?;

    Ok(RdmpVersion {
        guid,
        project_id,
        version: next_version,
        status: RdmpStatus::Draft,
        title: title.to_string(),
        content: content.clone(),
        reason: None,
        approved_by: None,
        created_at: now.clone(),
        updated_at: now,
        created_by,
    })
}

/// Update a draft's title/content. Returns false when the version was not
/// DRAFT at write time (state conflict).
pub async fn update_draft(
    pool: &SqlitePool,
    rdmp_id: Uuid,
    title: Option<&str>,
    content: Option<&Value>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();

    let result = match (title, content) {
        (Some(title), Some(content)) => {
            sqlx::query(
                "UPDATE rdmp_versions SET title = ?, content = ?, updated_at = ? \
                 WHERE guid = ? AND status = 'DRAFT'",
            )
            .bind(title)
            .bind(content.to_string())
            .bind(&now)
            .bind(rdmp_id.to_string())
            .execute(pool)
            .await?
        }
        (Some(title), None) => {
            sqlx::query(
                "UPDATE rdmp_versions SET title = ?, updated_at = ? \
                 WHERE guid = ? AND status = 'DRAFT'",
            )
            .bind(title)
            .bind(&now)
            .bind(rdmp_id.to_string())
            .execute(pool)
            .await?
        }
        (None, Some(content)) => {
            sqlx::query(
                "UPDATE rdmp_versions SET content = ?, updated_at = ? \
                 WHERE guid = ? AND status = 'DRAFT'",
            )
            .bind(content.to_string())
            .bind(&now)
            .bind(rdmp_id.to_string())
            .execute(pool)
            .await?
        }
        // Nothing to write, but the caller still needs the DRAFT guard
        (None, None) => {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM rdmp_versions WHERE guid = ?")
                    .bind(rdmp_id.to_string())
                    .fetch_optional(pool)
                    .await?;
            return Ok(status.as_deref() == Some("DRAFT"));
        }
    };

    Ok(result.rows_affected() > 0)
}

/// Atomically activate a draft, superseding any prior ACTIVE version of
/// the same project. Returns false (and leaves nothing changed) when the
/// target was not DRAFT at commit time.
pub async fn activate(
    pool: &SqlitePool,
    rdmp_id: Uuid,
    project_id: Uuid,
    approved_by: Uuid,
    reason: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE rdmp_versions SET status = 'SUPERSEDED', updated_at = ? \
         WHERE project_id = ? AND status = 'ACTIVE'",
    )
    .bind(&now)
    .bind(project_id.to_string())
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
        "UPDATE rdmp_versions SET status = 'ACTIVE', approved_by = ?, reason = ?, updated_at = ? \
         WHERE guid = ? AND status = 'DRAFT'",
    )
    .bind(approved_by.to_string())
    .bind(reason)
    .bind(&now)
    .bind(rdmp_id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        // Target raced out of DRAFT; undo the supersession
        tx.rollback().await?;
        return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
}
