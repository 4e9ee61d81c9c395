//! Topic catalog. Topics are created and updated, never deleted.
//!
//! Content is stored as a JSON object; updates are applied with `json_patch`, so a partial
//! payload only touches the fields it names.

use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{bind_all, now_millis, require_id, SqlValue};
use crate::errors::AppError;
use crate::models::{Pagination, Topic, TopicContent, TopicFilter, TopicSort};

/// Owner of all topic records.
#[derive(Clone)]
pub struct TopicCatalog {
    pool: SqlitePool,
}

impl TopicCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new topic.
    pub async fn create(&self, content: &TopicContent) -> Result<Topic, AppError> {
        check_content(content)?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        let row = sqlx::query(
            "INSERT INTO topics (id, content, created, updated) VALUES (?, json(?), ?, ?) \
             RETURNING id, content, created, updated",
        )
        .bind(&id)
        .bind(serde_json::to_string(content)?)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(topic_id = %id, "Created topic");
        topic_from_row(&row)
    }

    /// Merge `patch` into an existing topic. A field set to `null` is removed.
    pub async fn update(&self, id: &str, patch: &TopicContent) -> Result<Topic, AppError> {
        let id = require_id("topicId", id)?;
        check_content(patch)?;

        let row = sqlx::query(
            "UPDATE topics SET content = json_patch(content, ?), updated = ? WHERE id = ? \
             RETURNING id, content, created, updated",
        )
        .bind(serde_json::to_string(patch)?)
        .bind(now_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Topic", id))?;

        topic_from_row(&row)
    }

    /// Get a topic by ID.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Topic>, AppError> {
        let id = require_id("topicId", id)?;
        let row = sqlx::query("SELECT id, content, created, updated FROM topics WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(topic_from_row).transpose()
    }

    /// List topics matching `filter`, in creation order unless `sort` names a field.
    pub async fn list_all(
        &self,
        filter: &TopicFilter,
        sort: Option<&TopicSort>,
        pagination: Pagination,
    ) -> Result<Vec<Topic>, AppError> {
        let (where_sql, mut binds) = where_clause(filter)?;

        let order_sql = match sort {
            Some(sort) => {
                binds.push(SqlValue::Text(field_path(&sort.field)?));
                format!(
                    "json_extract(content, ?) {}, created, id",
                    if sort.descending { "DESC" } else { "ASC" }
                )
            }
            None => "created, id".to_string(),
        };
        binds.push(SqlValue::Int(pagination.sql_limit()));
        binds.push(SqlValue::Int(pagination.offset));

        let sql = format!(
            "SELECT id, content, created, updated FROM topics{} ORDER BY {} LIMIT ? OFFSET ?",
            where_sql, order_sql
        );
        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(topic_from_row).collect()
    }

    /// Count topics matching `filter`.
    pub async fn count(&self, filter: &TopicFilter) -> Result<i64, AppError> {
        let (where_sql, binds) = where_clause(filter)?;
        let sql = format!("SELECT COUNT(*) AS total FROM topics{}", where_sql);
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }
}

fn check_content(content: &TopicContent) -> Result<(), AppError> {
    for reserved in ["id", "created", "updated"] {
        if content.contains_key(reserved) {
            return Err(AppError::invalid(format!(
                "Topic content may not set the reserved field '{}'",
                reserved
            )));
        }
    }
    Ok(())
}

/// JSON path for a top-level content field.
fn field_path(field: &str) -> Result<String, AppError> {
    if field.is_empty() || field.contains('"') || field.contains('\\') {
        return Err(AppError::invalid(format!(
            "Invalid topic field name: {:?}",
            field
        )));
    }
    Ok(format!("$.\"{}\"", field))
}

fn where_clause(filter: &TopicFilter) -> Result<(String, Vec<SqlValue>), AppError> {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    for (field, value) in &filter.fields {
        binds.push(SqlValue::Text(field_path(field)?));
        match value {
            Value::Null => {
                conditions.push("json_extract(content, ?) IS NULL");
                continue;
            }
            Value::String(s) => binds.push(SqlValue::Text(s.clone())),
            Value::Bool(b) => binds.push(SqlValue::Int(*b as i64)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => binds.push(SqlValue::Int(i)),
                None => binds.push(SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::Array(_) | Value::Object(_) => {
                return Err(AppError::invalid(format!(
                    "Filter on '{}' must be a scalar value",
                    field
                )));
            }
        }
        conditions.push("json_extract(content, ?) = ?");
    }

    if conditions.is_empty() {
        Ok((String::new(), binds))
    } else {
        Ok((format!(" WHERE {}", conditions.join(" AND ")), binds))
    }
}

fn topic_from_row(row: &SqliteRow) -> Result<Topic, AppError> {
    let content: String = row.try_get("content")?;
    Ok(Topic {
        id: row.try_get("id")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        content: serde_json::from_str(&content)?,
    })
}
