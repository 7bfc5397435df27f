//! Lab, membership, activity-log and checklist-preference operations

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::services::permissions::Role;

/// Lab record
#[derive(Debug, Clone)]
pub struct Lab {
    pub guid: Uuid,
    pub name: String,
    pub is_active: bool,
}

/// One append-only activity fact
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub guid: Uuid,
    pub lab_id: Uuid,
    pub project_id: Option<Uuid>,
    pub actor_user_id: Uuid,
    pub action: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: String,
}

pub async fn get_lab(pool: &SqlitePool, lab_id: Uuid) -> Result<Option<Lab>> {
    let row = sqlx::query("SELECT guid, name, is_active FROM labs WHERE guid = ?")
        .bind(lab_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let guid_str: String = row.get("guid");
            Ok(Some(Lab {
                guid: Uuid::parse_str(&guid_str)?,
                name: row.get("name"),
                is_active: row.get::<i64, _>("is_active") != 0,
            }))
        }
        None => Ok(None),
    }
}

/// A user's role within a lab, or None if not a member
pub async fn member_role(pool: &SqlitePool, lab_id: Uuid, user_id: Uuid) -> Result<Option<Role>> {
    let role: Option<String> =
        sqlx::query_scalar("SELECT role FROM lab_members WHERE lab_id = ? AND user_id = ?")
            .bind(lab_id.to_string())
            .bind(user_id.to_string())
            .fetch_optional(pool)
            .await?;

    match role {
        Some(r) => Ok(Some(r.parse().map_err(anyhow::Error::msg)?)),
        None => Ok(None),
    }
}

/// Whether the roster has at least one STEWARD or PI member
pub async fn has_steward_or_pi(pool: &SqlitePool, lab_id: Uuid) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lab_members WHERE lab_id = ? AND role IN ('STEWARD', 'PI')",
    )
    .bind(lab_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Append an activity fact for the lab audit trail
pub async fn log_activity(
    pool: &SqlitePool,
    lab_id: Uuid,
    project_id: Option<Uuid>,
    actor_user_id: Uuid,
    action: &str,
    detail: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO lab_activity (guid, lab_id, project_id, actor_user_id, action, detail, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(lab_id.to_string())
    .bind(project_id.map(|p| p.to_string()))
    .bind(actor_user_id.to_string())
    .bind(action)
    .bind(detail.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Recent activity for a lab, newest first
pub async fn list_activity(
    pool: &SqlitePool,
    lab_id: Uuid,
    limit: i64,
) -> Result<Vec<ActivityEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, lab_id, project_id, actor_user_id, action, detail, created_at
        FROM lab_activity
        WHERE lab_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(lab_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::new();
    for row in rows {
        let guid_str: String = row.get("guid");
        let lab_str: String = row.get("lab_id");
        let project_str: Option<String> = row.get("project_id");
        let actor_str: String = row.get("actor_user_id");
        let detail_str: Option<String> = row.get("detail");

        entries.push(ActivityEntry {
            guid: Uuid::parse_str(&guid_str)?,
            lab_id: Uuid::parse_str(&lab_str)?,
            project_id: match project_str {
                Some(p) => Some(Uuid::parse_str(&p)?),
                None => None,
            },
            actor_user_id: Uuid::parse_str(&actor_str)?,
            action: row.get("action"),
            detail: detail_str.and_then(|d| serde_json::from_str(&d).ok()),
            created_at: row.get("created_at"),
        });
    }

    Ok(entries)
}

/// Current checklist-dismissed flag for (user, lab); absent record = false
pub async fn checklist_dismissed(pool: &SqlitePool, user_id: Uuid, lab_id: Uuid) -> Result<bool> {
    let dismissed: Option<i64> =
        sqlx::query_scalar("SELECT dismissed FROM checklist_prefs WHERE user_id = ? AND lab_id = ?")
            .bind(user_id.to_string())
            .bind(lab_id.to_string())
            .fetch_optional(pool)
            .await?;
    Ok(dismissed.unwrap_or(0) != 0)
}

/// Upsert the checklist-dismissed flag for (user, lab)
pub async fn set_checklist_dismissed(
    pool: &SqlitePool,
    user_id: Uuid,
    lab_id: Uuid,
    dismissed: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checklist_prefs (guid, user_id, lab_id, dismissed, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, lab_id) DO UPDATE SET
            dismissed = excluded.dismissed,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(lab_id.to_string())
    .bind(if dismissed { 1i64 } else { 0i64 })
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
