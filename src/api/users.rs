//! User API endpoints: identity, profile, department, bans, admin tier and events.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use super::{paged, success, ApiResult, ListParams};
use crate::auth::require_tier;
use crate::errors::AppError;
use crate::models::{
    AdminState, AdminTier, BanRequest, DeleteResult, DepartmentRequest, EventMembership,
    EventRequest, PromoteRequest, TelegramChatRequest, TelegramIdentity, TelegramProfile, User,
    UserFilter, UserProjection, UserSort, UserSortField,
};
use crate::AppState;

/// GET /api/users - List users. Without query parameters every user is returned.
pub async fn list_users(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> ApiResult<Vec<User>> {
    if raw.is_empty() {
        return success(state.users.list_all(UserProjection::Public).await?);
    }

    let mut params = ListParams::parse(raw)?;
    let filter = user_filter(&mut params.filters)?;
    let sort = match params.sort.as_deref() {
        Some(spec) => user_sort(spec)?,
        None => UserSort::default(),
    };

    let users = state
        .users
        .find(&filter, sort, params.pagination, UserProjection::Public)
        .await?;
    let total = if params.pagination.limit > 0 {
        state.users.count(&filter).await?
    } else {
        users.len() as i64
    };

    paged(users, params.pagination, total)
}

/// GET /api/users/lookup?telegramId= - Find a user by Telegram id.
pub async fn lookup_user(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> ApiResult<User> {
    let telegram_id = raw
        .get("telegramId")
        .ok_or_else(|| AppError::invalid("telegramId is required"))?
        .parse::<i64>()
        .map_err(|_| AppError::invalid("telegramId must be an integer"))?;

    match state.users.find_by_external_id(telegram_id).await? {
        Some(user) => success(user),
        None => Err(AppError::not_found("User with telegramId", telegram_id)),
    }
}

/// POST /api/users/identity - Create or refresh a user from a Telegram login.
pub async fn upsert_identity(
    State(state): State<AppState>,
    Json(identity): Json<TelegramIdentity>,
) -> ApiResult<User> {
    success(state.users.upsert_from_external_identity(&identity).await?)
}

/// GET /api/users/:id - Get a single user.
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<User> {
    match state.users.find_by_id(&id).await? {
        Some(user) => success(user),
        None => Err(AppError::not_found("User", &id)),
    }
}

/// DELETE /api/users/:id - Remove a user.
pub async fn remove_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<DeleteResult> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(state.users.remove(&id).await?)
}

/// PUT /api/users/:id/profile - Refresh profile fields.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(profile): Json<TelegramProfile>,
) -> ApiResult<User> {
    success(state.users.update_profile(&id, &profile).await?)
}

/// GET /api/users/:id/department
pub async fn get_department(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Option<String>> {
    success(state.users.get_department(&id).await?)
}

/// PUT /api/users/:id/department
pub async fn set_department(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<DepartmentRequest>,
) -> ApiResult<User> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(
        state
            .users
            .set_department(&id, &request.department_id)
            .await?,
    )
}

/// PUT /api/users/:id/telegram-chat
pub async fn set_telegram_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<TelegramChatRequest>,
) -> ApiResult<User> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(
        state
            .users
            .set_telegram_chat_id(&id, &request.telegram_chat_id)
            .await?,
    )
}

/// POST /api/users/:id/ban
pub async fn ban_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<BanRequest>,
) -> ApiResult<User> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(state.users.ban(&id, request.duration_ms).await?)
}

/// DELETE /api/users/:id/ban
pub async fn unban_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<User> {
    require_tier(&state.users, &headers, AdminTier::Admin).await?;
    success(state.users.unban(&id).await?)
}

/// GET /api/users/:id/admin - Tier and password hash; super-admins only.
pub async fn get_admin_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<AdminState> {
    require_tier(&state.users, &headers, AdminTier::SuperAdmin).await?;
    success(state.users.get_admin_state(&id).await?)
}

/// PUT /api/users/:id/admin
pub async fn promote_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PromoteRequest>,
) -> ApiResult<User> {
    require_tier(&state.users, &headers, AdminTier::SuperAdmin).await?;
    let user = match request.tier {
        AdminTier::Admin => {
            state
                .users
                .promote_to_admin(&id, &request.password_hash)
                .await?
        }
        AdminTier::SuperAdmin => {
            state
                .users
                .promote_to_super_admin(&id, &request.password_hash)
                .await?
        }
        AdminTier::None => {
            return Err(AppError::invalid(
                "tier must be 1 or 2; use DELETE to revoke admin rights",
            ))
        }
    };
    success(user)
}

/// DELETE /api/users/:id/admin
pub async fn demote_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<User> {
    require_tier(&state.users, &headers, AdminTier::SuperAdmin).await?;
    success(state.users.demote_to_none(&id).await?)
}

/// GET /api/users/:id/events
pub async fn get_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<EventMembership>> {
    success(state.users.get_events(&id).await?)
}

/// POST /api/users/:id/events
pub async fn add_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EventRequest>,
) -> ApiResult<User> {
    success(
        state
            .users
            .add_event_membership(&id, &request.event_id)
            .await?,
    )
}

/// DELETE /api/users/:id/events/:event_id
pub async fn remove_event(
    State(state): State<AppState>,
    Path((id, event_id)): Path<(String, String)>,
) -> ApiResult<User> {
    success(state.users.remove_event_membership(&id, &event_id).await?)
}

/// DELETE /api/users/:id/events
pub async fn clear_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    success(state.users.clear_event_memberships(&id).await?)
}

/// GET /api/events/:event_id/users
pub async fn list_event_users(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Vec<User>> {
    success(state.users.list_users_by_event(&event_id).await?)
}

fn user_filter(raw: &mut HashMap<String, String>) -> Result<UserFilter, AppError> {
    let banned = match raw.remove("banned").as_deref() {
        None => None,
        Some("true") => Some(true),
        Some("false") => Some(false),
        Some(_) => return Err(AppError::invalid("banned must be true or false")),
    };
    let tier = match raw.remove("tier") {
        None => None,
        Some(value) => Some(
            value
                .parse::<i64>()
                .ok()
                .and_then(AdminTier::from_i64)
                .ok_or_else(|| AppError::invalid("tier must be 0, 1 or 2"))?,
        ),
    };
    let filter = UserFilter {
        department: raw.remove("department"),
        event_id: raw.remove("eventId"),
        banned,
        tier,
    };

    if let Some(unknown) = raw.keys().next() {
        return Err(AppError::invalid(format!("Unknown user filter '{}'", unknown)));
    }
    Ok(filter)
}

fn user_sort(spec: &str) -> Result<UserSort, AppError> {
    let (name, descending) = match spec.strip_prefix('-') {
        Some(name) => (name, true),
        None => (spec, false),
    };
    let field = name.parse::<UserSortField>().map_err(AppError::InvalidArgument)?;
    Ok(UserSort { field, descending })
}
