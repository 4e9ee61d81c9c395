//! Topic API endpoints, including subscribe/unsubscribe on a topic.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;

use super::{paged, success, ApiResult, ListParams};
use crate::auth::require_tier;
use crate::errors::AppError;
use crate::models::{AdminTier, DeleteResult, Subscription, Topic, TopicContent, TopicFilter, TopicSort};
use crate::AppState;

/// GET /api/topics - List topics.
pub async fn list_topics(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Topic>> {
    let params = ListParams::parse(raw)?;
    let filter = params
        .filters
        .into_iter()
        .fold(TopicFilter::default(), |filter, (field, value)| {
            filter.with(field, Value::String(value))
        });
    let sort = params.sort.as_deref().map(TopicSort::parse);

    let topics = state
        .topics
        .list_all(&filter, sort.as_ref(), params.pagination)
        .await?;
    let total = if params.pagination.limit > 0 {
        state.topics.count(&filter).await?
    } else {
        topics.len() as i64
    };

    paged(topics, params.pagination, total)
}

/// GET /api/topics/:id - Get a single topic.
pub async fn get_topic(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Topic> {
    match state.topics.find_by_id(&id).await? {
        Some(topic) => success(topic),
        None => Err(AppError::not_found("Topic", &id)),
    }
}

/// POST /api/topics - Create a new topic.
pub async fn create_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(content): Json<TopicContent>,
) -> ApiResult<Topic> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(state.topics.create(&content).await?)
}

/// PUT /api/topics/:id - Update a topic.
pub async fn update_topic(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<TopicContent>,
) -> ApiResult<Topic> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(state.topics.update(&id, &patch).await?)
}

/// POST /api/topics/:id/:user_id - Subscribe a user to a topic.
pub async fn subscribe(
    State(state): State<AppState>,
    Path((topic_id, user_id)): Path<(String, String)>,
) -> ApiResult<Subscription> {
    success(state.subscriptions.subscribe(&topic_id, &user_id).await?)
}

/// DELETE /api/topics/:id/:user_id - Unsubscribe a user from a topic.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path((topic_id, user_id)): Path<(String, String)>,
) -> ApiResult<DeleteResult> {
    success(state.subscriptions.unsubscribe(&topic_id, &user_id).await?)
}
