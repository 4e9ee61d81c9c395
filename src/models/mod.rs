//! Data models for users, topics and subscriptions.
//!
//! JSON shapes use camelCase to match the existing web and bot clients.

mod query;
mod subscription;
mod topic;
mod user;

pub use query::*;
pub use subscription::*;
pub use topic::*;
pub use user::*;
