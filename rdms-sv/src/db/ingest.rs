//! Pending-ingest database operations
//!
//! Finalize and cancel are guarded transitions out of PENDING: the UPDATE
//! carries `AND status = 'PENDING'`, so of two concurrent resolutions only
//! one takes effect and the other reports a state conflict.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::storage::RawDataItem;

/// Pending ingest record awaiting finalization or cancellation
#[derive(Debug, Clone)]
pub struct PendingIngest {
    pub guid: Uuid,
    pub project_id: Uuid,
    pub storage_root_id: Uuid,
    pub relative_path: String,
    pub file_size_bytes: Option<i64>,
    pub file_hash_sha256: Option<String>,
    pub inferred_sample_identifier: Option<String>,
    pub detected_sample_id: Option<String>,
    pub status: String,
    pub raw_data_item_id: Option<Uuid>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

const INGEST_COLUMNS: &str = "guid, project_id, storage_root_id, relative_path, \
     file_size_bytes, file_hash_sha256, inferred_sample_identifier, detected_sample_id, \
     status, raw_data_item_id, created_at, resolved_at";

fn ingest_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PendingIngest> {
    let guid_str: String = row.get("guid");
    let project_str: String = row.get("project_id");
    let root_str: String = row.get("storage_root_id");
    let item_str: Option<String> = row.get("raw_data_item_id");

    Ok(PendingIngest {
        guid: Uuid::parse_str(&guid_str)?,
        project_id: Uuid::parse_str(&project_str)?,
        storage_root_id: Uuid::parse_str(&root_str)?,
        relative_path: row.get("relative_path"),
        file_size_bytes: row.get("file_size_bytes"),
        file_hash_sha256: row.get("file_hash_sha256"),
        inferred_sample_identifier: row.get("inferred_sample_identifier"),
        detected_sample_id: row.get("detected_sample_id"),
        status: row.get("status"),
        raw_data_item_id: match item_str {
            Some(i) => Some(Uuid::parse_str(&i)?),
            None => None,
        },
        created_at: row.get("created_at"),
        resolved_at: row.get("resolved_at"),
    })
}

pub async fn get_ingest(pool: &SqlitePool, ingest_id: Uuid) -> Result<Option<PendingIngest>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM pending_ingests WHERE guid = ?",
        INGEST_COLUMNS
    ))
    .bind(ingest_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(ingest_from_row).transpose()
}

/// Pending ingests for a project, optionally filtered by status
pub async fn list_for_project(
    pool: &SqlitePool,
    project_id: Uuid,
    status: Option<&str>,
) -> Result<Vec<PendingIngest>> {
    let rows = if let Some(status) = status {
        sqlx::query(&format!(
            "SELECT {} FROM pending_ingests WHERE project_id = ? AND status = ? \
             ORDER BY created_at DESC",
            INGEST_COLUMNS
        ))
        .bind(project_id.to_string())
        .bind(status)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query(&format!(
            "SELECT {} FROM pending_ingests WHERE project_id = ? ORDER BY created_at DESC",
            INGEST_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(pool)
        .await?
    };

    rows.iter().map(ingest_from_row).collect()
}

pub async fn count_pending(pool: &SqlitePool, project_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pending_ingests WHERE project_id = ? AND status = 'PENDING'",
    )
    .bind(project_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Whether an unresolved ingest already covers this path under this root
pub async fn pending_path_exists(
    pool: &SqlitePool,
    storage_root_id: Uuid,
    relative_path: &str,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pending_ingests \
         WHERE storage_root_id = ? AND relative_path = ? AND status = 'PENDING'",
    )
    .bind(storage_root_id.to_string())
    .bind(relative_path)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

#[allow(clippy::too_many_arguments)]
pub async fn create_pending(
    pool: &SqlitePool,
    project_id: Uuid,
    storage_root_id: Uuid,
    relative_path: &str,
    file_size_bytes: Option<i64>,
    file_hash_sha256: Option<&str>,
    inferred_sample_identifier: Option<&str>,
    detected_sample_id: Option<&str>,
) -> Result<PendingIngest> {
    let guid = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO pending_ingests
            (guid, project_id, storage_root_id, relative_path, file_size_bytes,
             file_hash_sha256, inferred_sample_identifier, detected_sample_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(project_id.to_string())
    .bind(storage_root_id.to_string())
    .bind(relative_path)
    .bind(file_size_bytes)
    .bind(file_hash_sha256)
    .bind(inferred_sample_identifier)
    .bind(detected_sample_id)
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(PendingIngest {
        guid,
        project_id,
        storage_root_id,
        relative_path: relative_path.to_string(),
        file_size_bytes,
        file_hash_sha256: file_hash_sha256.map(String::from),
        inferred_sample_identifier: inferred_sample_identifier.map(String::from),
        detected_sample_id: detected_sample_id.map(String::from),
        status: "PENDING".to_string(),
        raw_data_item_id: None,
        created_at,
        resolved_at: None,
    })
}

/// Complete a pending ingest: mark it COMPLETED and catalogue the file as
/// a raw data item, in one transaction. Returns None when the ingest was
/// no longer PENDING at commit time (state conflict); nothing is written
/// in that case.
pub async fn finalize(
    pool: &SqlitePool,
    ingest: &PendingIngest,
    sample_id: Option<Uuid>,
    created_by: Uuid,
) -> Result<Option<RawDataItem>> {
    let item_guid = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE pending_ingests SET status = 'COMPLETED', resolved_at = ? \
         WHERE guid = ? AND status = 'PENDING'",
    )
    .bind(&now)
    .bind(ingest.guid.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    sqlx::query(
        r#"
        INSERT INTO raw_data_items
            (guid, project_id, storage_root_id, sample_id, relative_path,
             file_size_bytes, file_hash_sha256, created_at, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item_guid.to_string())
    .bind(ingest.project_id.to_string())
    .bind(ingest.storage_root_id.to_string())
    .bind(sample_id.map(|s| s.to_string()))
    .bind(&ingest.relative_path)
    .bind(ingest.file_size_bytes)
    .bind(ingest.file_hash_sha256.as_deref())
    .bind(&now)
    .bind(created_by.to_string())
    .execute(&mut *tx)
    .await?;

    // The back-reference carries a foreign key to raw_data_items, so it is
    // written only after the item row exists
    sqlx::query("UPDATE pending_ingests SET raw_data_item_id = ? WHERE guid = ?")
        .bind(item_guid.to_string())
        .bind(ingest.guid.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(RawDataItem {
        guid: item_guid,
        project_id: ingest.project_id,
        storage_root_id: ingest.storage_root_id,
        sample_id,
        relative_path: ingest.relative_path.clone(),
        file_size_bytes: ingest.file_size_bytes,
        file_hash_sha256: ingest.file_hash_sha256.clone(),
        created_at: now,
        created_by,
    }))
}

/// Cancel a pending ingest. Returns false when it was no longer PENDING.
pub async fn cancel(pool: &SqlitePool, ingest_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE pending_ingests SET status = 'CANCELLED', resolved_at = ? \
         WHERE guid = ? AND status = 'PENDING'",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(ingest_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (SqlitePool, Uuid, Uuid, Uuid) {
        // Single connection: a pooled :memory: database is per-connection
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        rdms_common::db::init::init_schema(&pool).await.unwrap();

        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (guid, username, api_token) VALUES (?, 'u', 't')")
            .bind(user_id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let lab_id = Uuid::new_v4();
        sqlx::query("INSERT INTO labs (guid, name) VALUES (?, 'lab')")
            .bind(lab_id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let project_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO projects (guid, lab_id, name, created_by) VALUES (?, ?, 'proj', ?)",
        )
        .bind(project_id.to_string())
        .bind(lab_id.to_string())
        .bind(user_id.to_string())
        .execute(&pool)
        .await
        .unwrap();

        let root_id = Uuid::new_v4();
        sqlx::query("INSERT INTO storage_roots (guid, project_id, name) VALUES (?, ?, 'nas')")
            .bind(root_id.to_string())
            .bind(project_id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        (pool, project_id, root_id, user_id)
    }

    #[tokio::test]
    async fn finalize_transitions_once_and_catalogues_the_file() {
        let (pool, project_id, root_id, user_id) = setup().await;

        let ingest = create_pending(
            &pool,
            project_id,
            root_id,
            "run1/SAMPLE-001_reads.fastq",
            Some(1024),
            None,
            None,
            Some("SAMPLE-001"),
        )
        .await
        .unwrap();

        let item = finalize(&pool, &ingest, None, user_id)
            .await
            .unwrap()
            .expect("first finalize succeeds");

        // Second resolution of the same ingest must fail closed
        let again = finalize(&pool, &ingest, None, user_id).await.unwrap();
        assert!(again.is_none());

        let resolved = get_ingest(&pool, ingest.guid).await.unwrap().unwrap();
        assert_eq!(resolved.status, "COMPLETED");
        assert_eq!(resolved.raw_data_item_id, Some(item.guid));
        assert_eq!(count_pending(&pool, project_id).await.unwrap(), 0);

        // The catalogued row really exists and matches the back-reference
        let catalogued = crate::db::storage::get_item(&pool, item.guid)
            .await
            .unwrap()
            .expect("catalogued item exists");
        assert_eq!(catalogued.relative_path, "run1/SAMPLE-001_reads.fastq");
        assert_eq!(catalogued.storage_root_id, root_id);
    }

    #[tokio::test]
    async fn cancel_after_finalize_is_a_conflict() {
        let (pool, project_id, root_id, user_id) = setup().await;

        let ingest = create_pending(&pool, project_id, root_id, "a.bin", None, None, None, None)
            .await
            .unwrap();
        finalize(&pool, &ingest, None, user_id).await.unwrap();

        assert!(!cancel(&pool, ingest.guid).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_pending_path_is_detected() {
        let (pool, project_id, root_id, _user_id) = setup().await;

        create_pending(&pool, project_id, root_id, "a.bin", None, None, None, None)
            .await
            .unwrap();
        assert!(pending_path_exists(&pool, root_id, "a.bin").await.unwrap());
        assert!(!pending_path_exists(&pool, root_id, "b.bin").await.unwrap());
    }
}
