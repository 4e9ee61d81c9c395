//! Access control: effective permission tier of a user.
//!
//! Pure functions over a user record. Ban checks happen in the request layer, which knows
//! the current time.

use crate::models::{AdminTier, User};

/// Tier derived from the user's admin state.
pub fn effective_tier(user: &User) -> AdminTier {
    user.admin.tier
}

/// Whether `user` holds at least `required`. A super-admin satisfies every admin check.
pub fn has_tier(user: &User, required: AdminTier) -> bool {
    effective_tier(user) >= required
}
