//! Database module for SQLite persistence.
//!
//! SQLite is the entity store for users, topics and subscriptions. The pool is created once
//! at startup and handed to each component.

mod subscriptions;
mod topics;
mod users;

pub use subscriptions::*;
pub use topics::*;
pub use users::*;

use chrono::Utc;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{query::Query, Sqlite};
use std::path::Path;
use std::str::FromStr;

use crate::errors::AppError;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!("Could not create database directory {:?}: {}", parent, e);
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            telegram_id INTEGER NOT NULL UNIQUE,
            first_name TEXT,
            last_name TEXT,
            username TEXT,
            avatar TEXT,
            department TEXT,
            telegram_chat_id TEXT,
            events TEXT NOT NULL DEFAULT '[]',
            created INTEGER NOT NULL,
            banned_status INTEGER NOT NULL DEFAULT 0,
            banned_expires_at INTEGER NOT NULL DEFAULT 0,
            admin_permission INTEGER NOT NULL DEFAULT 0,
            admin_password TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL DEFAULT '{}',
            created INTEGER NOT NULL,
            updated INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created INTEGER NOT NULL,
            UNIQUE (topic_id, user_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_users_created ON users(created);
        CREATE INDEX IF NOT EXISTS idx_users_department ON users(department);
        CREATE INDEX IF NOT EXISTS idx_topics_created ON topics(created);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Reject a missing or malformed record id before touching the store.
pub(crate) fn require_id<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid(format!("{} is required", field)));
    }
    if uuid::Uuid::parse_str(trimmed).is_err() {
        return Err(AppError::invalid(format!(
            "{} is not a valid id: {}",
            field, value
        )));
    }
    Ok(trimmed)
}

/// Reject a missing or blank free-text argument. Accepted values are returned as given.
pub(crate) fn require_text<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid(format!("{} is required", field)));
    }
    Ok(value)
}

/// A value bound into a dynamically assembled statement.
#[derive(Debug, Clone)]
pub(crate) enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
    Null,
}

impl SqlValue {
    pub(crate) fn opt_text(value: Option<&str>) -> Self {
        value.map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string()))
    }
}

pub(crate) fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Temporary on-disk database for component tests.
#[cfg(test)]
pub(crate) async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&temp_dir.path().join("test.sqlite"), 5)
        .await
        .expect("Failed to init DB");
    (temp_dir, pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_id() {
        let id = uuid::Uuid::new_v4().to_string();
        assert_eq!(require_id("userId", &id).unwrap(), id);
        assert!(matches!(
            require_id("userId", ""),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            require_id("userId", "not-an-id"),
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("eventId", " e1 ").unwrap(), " e1 ");
        assert!(require_text("eventId", "   ").is_err());
    }

    #[tokio::test]
    async fn test_init_fails_when_directory_cannot_be_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let result = init_database(&blocker.join("notify.sqlite"), 1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (_dir, pool) = test_pool().await;
        run_migrations(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
