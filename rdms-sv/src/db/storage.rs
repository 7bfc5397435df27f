//! Storage root and raw-data-item database operations

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Registered storage location for a project
#[derive(Debug, Clone)]
pub struct StorageRoot {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

/// Catalogued raw data file
#[derive(Debug, Clone)]
pub struct RawDataItem {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub storage_root_id: Uuid,
    pub sample_id: Option<Uuid>,
    pub relative_path: String,
    pub file_size_bytes: Option<i64>,
    pub file_hash_sha256: Option<String>,
    pub created_at: String,
    pub created_by: Uuid,
}

fn root_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StorageRoot> {
    let guid_str: String = row.get("guid");
    let project_str: String = row.get("project_id");

    Ok(StorageRoot {
        guid: Uuid::parse_str(&guid_str)?,
        project_id: Uuid::parse_str(&project_str)?,
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    })
}

fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RawDataItem> {
    let guid_str: String = row.get("guid");
    let project_str: String = row.get("project_id");
    let root_str: String = row.get("storage_root_id");
    let sample_str: Option<String> = row.get("sample_id");
    let creator_str: String = row.get("created_by");

    Ok(RawDataItem {
        guid: Uuid::parse_str(&guid_str)?,
        project_id: Uuid::parse_str(&project_str)?,
        storage_root_id: Uuid::parse_str(&root_str)?,
        sample_id: match sample_str {
            Some(s) => Some(Uuid::parse_str(&s)?),
            None => None,
        },
        relative_path: row.get("relative_path"),
        file_size_bytes: row.get("file_size_bytes"),
        file_hash_sha256: row.get("file_hash_sha256"),
        created_at: row.get("created_at"),
        created_by: Uuid::parse_str(&creator_str)?,
    })
}

const ITEM_COLUMNS: &str = "guid, project_id, storage_root_id, sample_id, relative_path, \
     file_size_bytes, file_hash_sha256, created_at, created_by";

pub async fn get_root(pool: &SqlitePool, root_id: Uuid) -> Result<Option<StorageRoot>> {
    let row = sqlx::query(
        "SELECT guid, project_id, name, description, created_at FROM storage_roots WHERE guid = ?",
    )
    .bind(root_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(root_from_row).transpose()
}

pub async fn list_roots(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<StorageRoot>> {
    let rows = sqlx::query(
        "SELECT guid, project_id, name, description, created_at \
         FROM storage_roots WHERE project_id = ? ORDER BY name",
    )
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(root_from_row).collect()
}

pub async fn count_roots(pool: &SqlitePool, project_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storage_roots WHERE project_id = ?")
        .bind(project_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn create_root(
    pool: &SqlitePool,
    project_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<StorageRoot> {
    let guid = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO storage_roots (guid, project_id, name, description, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(project_id.to_string())
    .bind(name)
    .bind(description)
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(StorageRoot {
        guid,
        project_id,
        name: name.to_string(),
        description: description.map(String::from),
        created_at,
    })
}

pub async fn root_name_exists(pool: &SqlitePool, project_id: Uuid, name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM storage_roots WHERE project_id = ? AND name = ?",
    )
    .bind(project_id.to_string())
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Raw data items for a project, optionally filtered by sample. Passing
/// `orphaned_only` restricts to items with no sample link.
pub async fn list_items(
    pool: &SqlitePool,
    project_id: Uuid,
    sample_id: Option<Uuid>,
    orphaned_only: bool,
) -> Result<Vec<RawDataItem>> {
    let rows = if let Some(sample_id) = sample_id {
        sqlx::query(&format!(
            "SELECT {} FROM raw_data_items WHERE project_id = ? AND sample_id = ? \
             ORDER BY relative_path",
            ITEM_COLUMNS
        ))
        .bind(project_id.to_string())
        .bind(sample_id.to_string())
        .fetch_all(pool)
        .await?
    } else if orphaned_only {
        sqlx::query(&format!(
            "SELECT {} FROM raw_data_items WHERE project_id = ? AND sample_id IS NULL \
             ORDER BY relative_path",
            ITEM_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(&format!(
            "SELECT {} FROM raw_data_items WHERE project_id = ? ORDER BY relative_path",
            ITEM_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?
    };

    rows.iter().map(item_from_row).collect()
}

pub async fn count_orphaned(pool: &SqlitePool, project_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM raw_data_items WHERE project_id = ? AND sample_id IS NULL",
    )
    .bind(project_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Link an orphaned item to a sample after the fact
pub async fn assign_sample(pool: &SqlitePool, item_id: Uuid, sample_id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE raw_data_items SET sample_id = ? WHERE guid = ?")
        .bind(sample_id.to_string())
        .bind(item_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_item(pool: &SqlitePool, item_id: Uuid) -> Result<Option<RawDataItem>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM raw_data_items WHERE guid = ?",
        ITEM_COLUMNS
    ))
    .bind(item_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(item_from_row).transpose()
}
