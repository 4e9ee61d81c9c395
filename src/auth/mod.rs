//! Request authentication.
//!
//! Two gates: a pre-shared key on every API call (compared in constant time), and a tier gate
//! for admin operations keyed by the caller's user id.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::access::has_tier;
use crate::db::{now_millis, UserDirectory};
use crate::errors::AppError;
use crate::models::{AdminTier, User};

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the id of the user on whose behalf the request is made. Set by the
/// gateway after it has verified the user's JWT.
pub const CALLER_HEADER: &str = "x-user-id";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    // Get the API key from the request header
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            // Also check Authorization header as bearer token
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Resolve the caller and check they may perform an operation needing `required`.
///
/// Unknown callers are unauthorized; callers with an active ban or a lower tier are
/// forbidden. Bans are evaluated against the current time here since nothing expires them
/// in storage.
pub async fn require_tier(
    users: &UserDirectory,
    headers: &HeaderMap,
    required: AdminTier,
) -> Result<User, AppError> {
    let caller_id = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", CALLER_HEADER)))?;

    let caller = match users.find_by_id(caller_id).await {
        Ok(Some(user)) => user,
        Ok(None) | Err(AppError::InvalidArgument(_)) => {
            return Err(AppError::Unauthorized("Unknown caller".to_string()))
        }
        Err(e) => return Err(e),
    };

    if caller.banned.is_active_at(now_millis()) {
        tracing::warn!(user_id = %caller.id, "Rejected request from banned user");
        return Err(AppError::Forbidden("Caller is banned".to_string()));
    }
    if !has_tier(&caller, required) {
        return Err(AppError::Forbidden(format!(
            "Requires admin tier {}",
            required.as_i64()
        )));
    }

    Ok(caller)
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    a_bytes.ct_eq(b_bytes).into()
}

/// Create an unauthorized response.
fn unauthorized_response(message: &str) -> Response {
    AppError::Unauthorized(message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::db::test_pool;
    use crate::models::{TelegramIdentity, TelegramProfile};

    fn guarded(psk: Option<String>) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn(move |req, next| {
                psk_auth_layer(psk.clone(), req, next)
            }))
    }

    fn headers_for(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CALLER_HEADER, user_id.parse().unwrap());
        headers
    }

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    #[tokio::test]
    async fn test_psk_layer_accepts_bearer_token() {
        let app = guarded(Some("secret".to_string()));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_psk_layer_rejects_wrong_key() {
        let app = guarded(Some("secret".to_string()));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/ping")
                    .header(API_KEY_HEADER, "guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_tier() {
        let (_dir, pool) = test_pool().await;
        let users = UserDirectory::new(pool);
        let user = users
            .upsert_from_external_identity(&TelegramIdentity {
                id: 77,
                profile: TelegramProfile::default(),
            })
            .await
            .unwrap();

        let missing = require_tier(&users, &HeaderMap::new(), AdminTier::Admin).await;
        assert!(matches!(missing, Err(AppError::Unauthorized(_))));

        let unknown = uuid::Uuid::new_v4().to_string();
        let unknown = require_tier(&users, &headers_for(&unknown), AdminTier::Admin).await;
        assert!(matches!(unknown, Err(AppError::Unauthorized(_))));

        let headers = headers_for(&user.id);
        let plain = require_tier(&users, &headers, AdminTier::Admin).await;
        assert!(matches!(plain, Err(AppError::Forbidden(_))));

        users.promote_to_admin(&user.id, "h").await.unwrap();
        let admin = require_tier(&users, &headers, AdminTier::Admin).await.unwrap();
        assert_eq!(admin.id, user.id);
        assert!(matches!(
            require_tier(&users, &headers, AdminTier::SuperAdmin).await,
            Err(AppError::Forbidden(_))
        ));

        users.ban(&user.id, 60_000).await.unwrap();
        assert!(matches!(
            require_tier(&users, &headers, AdminTier::Admin).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
