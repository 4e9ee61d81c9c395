//! Subscription index: the many-to-many membership between users and topics.
//!
//! The `(topic_id, user_id)` unique constraint is the only guard against duplicates, and both
//! subscribe and unsubscribe are single statements against it.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{bind_all, now_millis, require_id, SqlValue};
use crate::errors::AppError;
use crate::models::{DeleteResult, Pagination, Subscription, SubscriptionFilter};

/// Owner of all subscription records.
#[derive(Clone)]
pub struct SubscriptionIndex {
    pool: SqlitePool,
}

impl SubscriptionIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Subscribe a user to a topic, returning the existing record if there already is one.
    pub async fn subscribe(&self, topic_id: &str, user_id: &str) -> Result<Subscription, AppError> {
        let topic_id = require_id("topicId", topic_id)?;
        let user_id = require_id("userId", user_id)?;

        let new_id = uuid::Uuid::new_v4().to_string();
        // The no-op DO UPDATE makes RETURNING yield the surviving row on conflict.
        let row = sqlx::query(
            "INSERT INTO subscriptions (id, topic_id, user_id, created) VALUES (?, ?, ?, ?) \
             ON CONFLICT(topic_id, user_id) DO UPDATE SET topic_id = excluded.topic_id \
             RETURNING id, topic_id, user_id, created",
        )
        .bind(&new_id)
        .bind(topic_id)
        .bind(user_id)
        .bind(now_millis())
        .fetch_one(&self.pool)
        .await?;

        let subscription = subscription_from_row(&row)?;
        if subscription.id == new_id {
            tracing::debug!(topic_id, user_id, "Created subscription");
        }
        Ok(subscription)
    }

    /// Remove a subscription. Removing a pair that does not exist is not an error.
    pub async fn unsubscribe(&self, topic_id: &str, user_id: &str) -> Result<DeleteResult, AppError> {
        let topic_id = require_id("topicId", topic_id)?;
        let user_id = require_id("userId", user_id)?;

        let result = sqlx::query("DELETE FROM subscriptions WHERE topic_id = ? AND user_id = ?")
            .bind(topic_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(DeleteResult {
            deleted_count: result.rows_affected(),
        })
    }

    /// Subscriptions for one topic.
    pub async fn list_by_topic(
        &self,
        topic_id: &str,
        pagination: Pagination,
    ) -> Result<Vec<Subscription>, AppError> {
        let topic_id = require_id("topicId", topic_id)?;
        self.list_all(&SubscriptionFilter::topic(topic_id), pagination)
            .await
    }

    pub async fn list_all(
        &self,
        filter: &SubscriptionFilter,
        pagination: Pagination,
    ) -> Result<Vec<Subscription>, AppError> {
        let (where_sql, mut binds) = where_clause(filter)?;
        binds.push(SqlValue::Int(pagination.sql_limit()));
        binds.push(SqlValue::Int(pagination.offset));

        let sql = format!(
            "SELECT id, topic_id, user_id, created FROM subscriptions{} \
             ORDER BY created, id LIMIT ? OFFSET ?",
            where_sql
        );
        let rows = bind_all(sqlx::query(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    pub async fn count(&self, filter: &SubscriptionFilter) -> Result<i64, AppError> {
        let (where_sql, binds) = where_clause(filter)?;
        let sql = format!("SELECT COUNT(*) AS total FROM subscriptions{}", where_sql);
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }
}

fn where_clause(filter: &SubscriptionFilter) -> Result<(String, Vec<SqlValue>), AppError> {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(topic_id) = &filter.topic_id {
        conditions.push("topic_id = ?");
        binds.push(SqlValue::Text(require_id("topicId", topic_id)?.to_string()));
    }
    if let Some(user_id) = &filter.user_id {
        conditions.push("user_id = ?");
        binds.push(SqlValue::Text(require_id("userId", user_id)?.to_string()));
    }

    if conditions.is_empty() {
        Ok((String::new(), binds))
    } else {
        Ok((format!(" WHERE {}", conditions.join(" AND ")), binds))
    }
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription, AppError> {
    Ok(Subscription {
        id: row.try_get("id")?,
        topic_id: row.try_get("topic_id")?,
        user_id: row.try_get("user_id")?,
        created: row.try_get("created")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, TopicCatalog};
    use serde_json::json;

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn index() -> (tempfile::TempDir, SqlitePool, SubscriptionIndex) {
        let (dir, pool) = test_pool().await;
        let index = SubscriptionIndex::new(pool.clone());
        (dir, pool, index)
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (_dir, _pool, subs) = index().await;
        let (topic, user) = (new_id(), new_id());

        let first = subs.subscribe(&topic, &user).await.unwrap();
        let second = subs.subscribe(&topic, &user).await.unwrap();
        assert_eq!(first, second);

        let listed = subs.list_by_topic(&topic, Pagination::all()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, user);
    }

    #[tokio::test]
    async fn test_unsubscribe_twice_is_noop() {
        let (_dir, _pool, subs) = index().await;
        let (topic, user) = (new_id(), new_id());
        subs.subscribe(&topic, &user).await.unwrap();

        assert_eq!(subs.unsubscribe(&topic, &user).await.unwrap().deleted_count, 1);
        assert_eq!(subs.unsubscribe(&topic, &user).await.unwrap().deleted_count, 0);
        assert!(subs
            .list_by_topic(&topic, Pagination::all())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let (_dir, _pool, subs) = index().await;
        assert!(matches!(
            subs.subscribe("", &new_id()).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            subs.unsubscribe(&new_id(), "nope").await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_stores_one_record() {
        let (_dir, _pool, subs) = index().await;
        let (topic, user) = (new_id(), new_id());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let subs = subs.clone();
            let (topic, user) = (topic.clone(), user.clone());
            handles.push(tokio::spawn(async move {
                subs.subscribe(&topic, &user).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let filter = SubscriptionFilter {
            topic_id: Some(topic),
            user_id: Some(user),
        };
        assert_eq!(subs.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_topic_subscriber_scenario() {
        let (_dir, pool, subs) = index().await;
        let topics = TopicCatalog::new(pool);
        let topic = topics
            .create(json!({ "title": "T" }).as_object().unwrap())
            .await
            .unwrap();
        let (u1, u2) = (new_id(), new_id());

        subs.subscribe(&topic.id, &u1).await.unwrap();
        subs.subscribe(&topic.id, &u2).await.unwrap();

        let mut subscribers: Vec<String> = subs
            .list_by_topic(&topic.id, Pagination::all())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.user_id)
            .collect();
        subscribers.sort();
        let mut expected = vec![u1.clone(), u2.clone()];
        expected.sort();
        assert_eq!(subscribers, expected);

        subs.unsubscribe(&topic.id, &u1).await.unwrap();
        let remaining: Vec<String> = subs
            .list_by_topic(&topic.id, Pagination::all())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.user_id)
            .collect();
        assert_eq!(remaining, vec![u2]);
    }

    #[tokio::test]
    async fn test_list_all_filters_and_pages() {
        let (_dir, _pool, subs) = index().await;
        let (t1, t2, user) = (new_id(), new_id(), new_id());
        subs.subscribe(&t1, &user).await.unwrap();
        subs.subscribe(&t2, &user).await.unwrap();
        subs.subscribe(&t2, &new_id()).await.unwrap();

        let by_user = SubscriptionFilter {
            topic_id: None,
            user_id: Some(user.clone()),
        };
        assert_eq!(subs.count(&by_user).await.unwrap(), 2);
        assert_eq!(subs.count(&SubscriptionFilter::default()).await.unwrap(), 3);

        let page = subs
            .list_all(&SubscriptionFilter::default(), Pagination::new(1, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }
}
