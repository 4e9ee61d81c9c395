//! Subscription model: a membership edge between one user and one topic.

use serde::{Deserialize, Serialize};

/// Existence of the record is the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub topic_id: String,
    pub user_id: String,
    /// Epoch milliseconds
    pub created: i64,
}

/// Criteria for subscription listings.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub topic_id: Option<String>,
    pub user_id: Option<String>,
}

impl SubscriptionFilter {
    pub fn topic(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: Some(topic_id.into()),
            user_id: None,
        }
    }
}
