//! REST API module.
//!
//! Thin handlers over the user directory, topic catalog and subscription index.

mod subscriptions;
mod topics;
mod users;

pub use subscriptions::*;
pub use topics::*;
pub use users::*;

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::Pagination;

/// Page information attached to paginated listings.
#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub total: i64,
}

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<PageInfo>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            pages: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Create a successful paginated response. Page count is only reported when a limit is set.
pub fn paged<T: Serialize>(data: T, pagination: Pagination, total: i64) -> ApiResult<T> {
    Ok(ApiResponse {
        success: true,
        data,
        pages: pagination
            .page_count(total)
            .map(|total| PageInfo { total }),
    })
}

/// Query string of a listing endpoint: pagination, sort and the remaining filter criteria.
#[derive(Debug, Default)]
pub struct ListParams {
    pub pagination: Pagination,
    pub sort: Option<String>,
    pub filters: HashMap<String, String>,
}

impl ListParams {
    pub fn parse(mut raw: HashMap<String, String>) -> Result<Self, AppError> {
        let offset = take_non_negative(&mut raw, "offset")?;
        let limit = take_non_negative(&mut raw, "limit")?;
        let sort = raw.remove("sort").filter(|s| !s.is_empty());

        Ok(Self {
            pagination: Pagination::new(offset, limit),
            sort,
            filters: raw,
        })
    }
}

fn take_non_negative(raw: &mut HashMap<String, String>, key: &str) -> Result<i64, AppError> {
    match raw.remove(key) {
        None => Ok(0),
        Some(value) => value
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| {
                AppError::invalid(format!("{} must be a non-negative integer", key))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_list_params_split() {
        let params =
            ListParams::parse(raw(&[("offset", "20"), ("limit", "10"), ("category", "news")]))
                .unwrap();
        assert_eq!(params.pagination, Pagination::new(20, 10));
        assert!(params.sort.is_none());
        assert_eq!(params.filters.get("category").map(String::as_str), Some("news"));
        assert!(!params.filters.contains_key("offset"));
    }

    #[test]
    fn test_list_params_reject_bad_numbers() {
        assert!(ListParams::parse(raw(&[("limit", "-1")])).is_err());
        assert!(ListParams::parse(raw(&[("offset", "ten")])).is_err());
    }
}
