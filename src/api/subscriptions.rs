//! Subscription API endpoints.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};

use super::{paged, success, ApiResult, ListParams};
use crate::errors::AppError;
use crate::models::{Subscription, SubscriptionFilter};
use crate::AppState;

/// GET /api/subscriptions - List subscriptions, optionally by `topicId` and/or `userId`.
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Subscription>> {
    let mut params = ListParams::parse(raw)?;
    let filter = SubscriptionFilter {
        topic_id: params.filters.remove("topicId"),
        user_id: params.filters.remove("userId"),
    };
    if let Some(unknown) = params.filters.keys().next() {
        return Err(AppError::invalid(format!(
            "Unknown subscription filter '{}'",
            unknown
        )));
    }

    let subscriptions = state
        .subscriptions
        .list_all(&filter, params.pagination)
        .await?;
    let total = if params.pagination.limit > 0 {
        state.subscriptions.count(&filter).await?
    } else {
        subscriptions.len() as i64
    };

    paged(subscriptions, params.pagination, total)
}

/// GET /api/subscriptions/topic/:id - User ids subscribed to a topic.
pub async fn list_topic_subscribers(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(raw): Query<HashMap<String, String>>,
) -> ApiResult<Vec<String>> {
    let params = ListParams::parse(raw)?;
    let subscribers = state
        .subscriptions
        .list_by_topic(&topic_id, params.pagination)
        .await?
        .into_iter()
        .map(|s| s.user_id)
        .collect();

    success(subscribers)
}
