//! Sample and field-value database operations

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

/// Sample record
#[derive(Debug, Clone)]
pub struct Sample {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub sample_identifier: String,
    pub created_at: String,
    pub created_by: Uuid,
}

fn sample_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Sample> {
    let guid_str: String = row.get("guid");
    let project_str: String = row.get("project_id");
    let creator_str: String = row.get("created_by");

    Ok(Sample {
        guid: Uuid::parse_str(&guid_str)?,
        project_id: Uuid::parse_str(&project_str)?,
        sample_identifier: row.get("sample_identifier"),
        created_at: row.get("created_at"),
        created_by: Uuid::parse_str(&creator_str)?,
    })
}

const SAMPLE_COLUMNS: &str = "guid, project_id, sample_identifier, created_at, created_by";

pub async fn get_sample(pool: &SqlitePool, sample_id: Uuid) -> Result<Option<Sample>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM samples WHERE guid = ?",
        SAMPLE_COLUMNS
    ))
    .bind(sample_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(sample_from_row).transpose()
}

pub async fn find_by_identifier(
    pool: &SqlitePool,
    project_id: Uuid,
    sample_identifier: &str,
) -> Result<Option<Sample>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM samples WHERE project_id = ? AND sample_identifier = ?",
        SAMPLE_COLUMNS
    ))
    .bind(project_id.to_string())
    .bind(sample_identifier)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(sample_from_row).transpose()
}

pub async fn list_for_project(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Sample>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM samples WHERE project_id = ? ORDER BY sample_identifier",
        SAMPLE_COLUMNS
    ))
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(sample_from_row).collect()
}

pub async fn create_sample(
    pool: &SqlitePool,
    project_id: Uuid,
    sample_identifier: &str,
    created_by: Uuid,
) -> Result<Sample> {
    let guid = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO samples (guid, project_id, sample_identifier, created_at, created_by)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(project_id.to_string())
    .bind(sample_identifier)
    .bind(&created_at)
    .bind(created_by.to_string())
    .execute(pool)
    .await?;

    Ok(Sample {
        guid,
        project_id,
        sample_identifier: sample_identifier.to_string(),
        created_at,
        created_by,
    })
}

/// Find a sample by identifier, creating it when absent. A concurrent
/// insert racing past the lookup trips the UNIQUE (project_id,
/// sample_identifier) constraint; that loser re-reads the winner's row.
pub async fn get_or_create(
    pool: &SqlitePool,
    project_id: Uuid,
    sample_identifier: &str,
    created_by: Uuid,
) -> Result<Sample> {
    if let Some(existing) = find_by_identifier(pool, project_id, sample_identifier).await? {
        return Ok(existing);
    }

    match create_sample(pool, project_id, sample_identifier, created_by).await {
        Ok(sample) => Ok(sample),
        Err(_) => find_by_identifier(pool, project_id, sample_identifier)
            .await?
            .ok_or_else(|| anyhow::anyhow!("sample vanished after unique-constraint race")),
    }
}

/// Write or overwrite one field value on a sample
pub async fn upsert_field_value(
    pool: &SqlitePool,
    sample_id: Uuid,
    field_key: &str,
    value: &str,
    updated_by: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sample_field_values (guid, sample_id, field_key, value, updated_at, updated_by)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(sample_id, field_key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at,
            updated_by = excluded.updated_by
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(sample_id.to_string())
    .bind(field_key)
    .bind(value)
    .bind(Utc::now().to_rfc3339())
    .bind(updated_by.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Field key/value map for a single sample
pub async fn field_values(pool: &SqlitePool, sample_id: Uuid) -> Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT field_key, value FROM sample_field_values WHERE sample_id = ?")
        .bind(sample_id.to_string())
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("field_key"), row.get("value")))
        .collect())
}

/// Field keys present per sample, across a whole project. Used by the
/// remediation deriver to check required-field completeness without one
/// query per sample.
pub async fn field_keys_by_sample(
    pool: &SqlitePool,
    project_id: Uuid,
) -> Result<HashMap<Uuid, Vec<String>>> {
    let rows = sqlx::query(
        r#"
        SELECT v.sample_id, v.field_key
        FROM sample_field_values v
        JOIN samples s ON s.guid = v.sample_id
        WHERE s.project_id = ?
        "#,
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut keys: HashMap<Uuid, Vec<String>> = HashMap::new();
    for row in rows {
        let sample_str: String = row.get("sample_id");
        keys.entry(Uuid::parse_str(&sample_str)?)
            .or_default()
            .push(row.get("field_key"));
    }
    Ok(keys)
}
