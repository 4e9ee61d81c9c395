//! Topic model. Content fields are free-form and opaque to the backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form topic content (title, description, ...).
pub type TopicContent = Map<String, Value>;

/// A topic users can subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    /// Epoch milliseconds
    pub created: i64,
    /// Epoch milliseconds
    pub updated: i64,
    #[serde(flatten)]
    pub content: TopicContent,
}

/// Equality criteria on top-level content fields.
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    pub fields: Map<String, Value>,
}

impl TopicFilter {
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// Ordering by one content field.
#[derive(Debug, Clone)]
pub struct TopicSort {
    pub field: String,
    pub descending: bool,
}

impl TopicSort {
    /// Parse `field` (ascending) or `-field` (descending).
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: spec.to_string(),
                descending: false,
            },
        }
    }
}
