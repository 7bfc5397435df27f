//! Database initialization
//!
//! Creates the supervisor schema on first run. All statements are
//! `CREATE TABLE IF NOT EXISTS`, so initialization is idempotent and safe
//! to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables on an existing pool (also used by tests with
/// `sqlite::memory:` connections)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers while a finalize/activate transaction
    // holds the write lock
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    create_users_table(pool).await?;
    create_labs_table(pool).await?;
    create_lab_members_table(pool).await?;
    create_projects_table(pool).await?;
    create_rdmp_versions_table(pool).await?;
    create_samples_table(pool).await?;
    create_sample_field_values_table(pool).await?;
    create_storage_roots_table(pool).await?;
    create_raw_data_items_table(pool).await?;
    create_pending_ingests_table(pool).await?;
    create_lab_activity_table(pool).await?;
    create_checklist_prefs_table(pool).await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            api_token TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_labs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labs (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lab_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lab_members (
            guid TEXT PRIMARY KEY,
            lab_id TEXT NOT NULL REFERENCES labs(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK (role IN ('RESEARCHER', 'STEWARD', 'PI')),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (lab_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_lab_members_lab_user ON lab_members (lab_id, user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            guid TEXT PRIMARY KEY,
            lab_id TEXT NOT NULL REFERENCES labs(guid),
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            sample_id_rule_type TEXT,
            sample_id_regex TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            created_by TEXT NOT NULL REFERENCES users(guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_projects_lab ON projects (lab_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_rdmp_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rdmp_versions (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'DRAFT'
                CHECK (status IN ('DRAFT', 'ACTIVE', 'SUPERSEDED')),
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            reason TEXT,
            approved_by TEXT REFERENCES users(guid),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            created_by TEXT NOT NULL REFERENCES users(guid),
            UNIQUE (project_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_rdmp_versions_project_status ON rdmp_versions (project_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_samples_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            sample_identifier TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            created_by TEXT NOT NULL REFERENCES users(guid),
            UNIQUE (project_id, sample_identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sample_field_values_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sample_field_values (
            guid TEXT PRIMARY KEY,
            sample_id TEXT NOT NULL REFERENCES samples(guid) ON DELETE CASCADE,
            field_key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_by TEXT NOT NULL REFERENCES users(guid),
            UNIQUE (sample_id, field_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_storage_roots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS storage_roots (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (project_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_raw_data_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raw_data_items (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            storage_root_id TEXT NOT NULL REFERENCES storage_roots(guid),
            sample_id TEXT REFERENCES samples(guid),
            relative_path TEXT NOT NULL,
            file_size_bytes INTEGER,
            file_hash_sha256 TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            created_by TEXT NOT NULL REFERENCES users(guid),
            UNIQUE (storage_root_id, relative_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_raw_data_items_project ON raw_data_items (project_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pending_ingests_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_ingests (
            guid TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(guid) ON DELETE CASCADE,
            storage_root_id TEXT NOT NULL REFERENCES storage_roots(guid),
            relative_path TEXT NOT NULL,
            file_size_bytes INTEGER,
            file_hash_sha256 TEXT,
            inferred_sample_identifier TEXT,
            detected_sample_id TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING'
                CHECK (status IN ('PENDING', 'COMPLETED', 'CANCELLED')),
            raw_data_item_id TEXT REFERENCES raw_data_items(guid),
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_pending_ingests_project_status ON pending_ingests (project_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lab_activity_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lab_activity (
            guid TEXT PRIMARY KEY,
            lab_id TEXT NOT NULL REFERENCES labs(guid) ON DELETE CASCADE,
            project_id TEXT REFERENCES projects(guid),
            actor_user_id TEXT NOT NULL REFERENCES users(guid),
            action TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_lab_activity_lab ON lab_activity (lab_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_checklist_prefs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checklist_prefs (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            lab_id TEXT NOT NULL REFERENCES labs(guid) ON DELETE CASCADE,
            dismissed INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, lab_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
