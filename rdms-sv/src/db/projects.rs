//! Project database operations

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Project record
#[derive(Debug, Clone)]
pub struct Project {
    pub guid: Uuid,
    pub lab_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub sample_id_rule_type: Option<String>,
    pub sample_id_regex: Option<String>,
    pub created_at: String,
    pub created_by: Uuid,
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Project> {
    let guid_str: String = row.get("guid");
    let lab_str: String = row.get("lab_id");
    let creator_str: String = row.get("created_by");

    Ok(Project {
        guid: Uuid::parse_str(&guid_str)?,
        lab_id: Uuid::parse_str(&lab_str)?,
        name: row.get("name"),
        description: row.get("description"),
        is_active: row.get::<i64, _>("is_active") != 0,
        sample_id_rule_type: row.get("sample_id_rule_type"),
        sample_id_regex: row.get("sample_id_regex"),
        created_at: row.get("created_at"),
        created_by: Uuid::parse_str(&creator_str)?,
    })
}

const PROJECT_COLUMNS: &str = "guid, lab_id, name, description, is_active, \
     sample_id_rule_type, sample_id_regex, created_at, created_by";

pub async fn get_project(pool: &SqlitePool, project_id: Uuid) -> Result<Option<Project>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM projects WHERE guid = ?",
        PROJECT_COLUMNS
    ))
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(project_from_row).transpose()
}

/// Projects in labs where the user holds any role
pub async fn list_visible(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Project>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM projects
        WHERE lab_id IN (SELECT lab_id FROM lab_members WHERE user_id = ?)
        ORDER BY name
        "#,
        PROJECT_COLUMNS
    ))
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(project_from_row).collect()
}

pub async fn list_for_lab(pool: &SqlitePool, lab_id: Uuid) -> Result<Vec<Project>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM projects WHERE lab_id = ? ORDER BY name",
        PROJECT_COLUMNS
    ))
    .bind(lab_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(project_from_row).collect()
}

pub async fn name_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

pub async fn create_project(
    pool: &SqlitePool,
    lab_id: Uuid,
    name: &str,
    description: Option<&str>,
    created_by: Uuid,
) -> Result<Project> {
    let guid = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO projects (guid, lab_id, name, description, is_active, created_at, created_by)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(lab_id.to_string())
    .bind(name)
    .bind(description)
    .bind(&created_at)
    .bind(created_by.to_string())
    .execute(pool)
    .await?;

    Ok(Project {
        guid,
        lab_id,
        name: name.to_string(),
        description: description.map(String::from),
        is_active: true,
        sample_id_rule_type: None,
        sample_id_regex: None,
        created_at,
        created_by,
    })
}

/// Partial update of name, description and identifier-detection rule.
/// Rule fields are written together: callers validate the pattern first.
pub async fn update_project(
    pool: &SqlitePool,
    project_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    rule: Option<(Option<&str>, Option<&str>)>,
) -> Result<()> {
    if let Some(name) = name {
        sqlx::query("UPDATE projects SET name = ? WHERE guid = ?")
            .bind(name)
            .bind(project_id.to_string())
            .execute(pool)
            .await?;
    }

    if let Some(description) = description {
        sqlx::query("UPDATE projects SET description = ? WHERE guid = ?")
            .bind(description)
            .bind(project_id.to_string())
            .execute(pool)
            .await?;
    }

    if let Some((rule_type, pattern)) = rule {
        sqlx::query(
            "UPDATE projects SET sample_id_rule_type = ?, sample_id_regex = ? WHERE guid = ?",
        )
        .bind(rule_type)
        .bind(pattern)
        .bind(project_id.to_string())
        .execute(pool)
        .await?;
    }

    Ok(())
}
