//! User lookup for bearer-token authentication

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Authenticated user record
#[derive(Debug, Clone)]
pub struct User {
    pub guid: Uuid,
    pub username: String,
    pub is_active: bool,
}

/// Resolve a bearer token to an active user, if any
pub async fn find_by_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT guid, username, is_active
        FROM users
        WHERE api_token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let guid_str: String = row.get("guid");
            Ok(Some(User {
                guid: Uuid::parse_str(&guid_str)?,
                username: row.get("username"),
                is_active: row.get::<i64, _>("is_active") != 0,
            }))
        }
        None => Ok(None),
    }
}
