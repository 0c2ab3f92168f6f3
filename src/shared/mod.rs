pub mod models;
pub mod state;
pub mod utils;

use crate::shared::models::{schema::businesses, Business};
use crate::shared::utils::{api_error, DbConn};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

pub const BUSINESS_ID_HEADER: &str = "x-business-id";

/// Explicit tenant context. Every service call takes one of these instead of
/// reading an ambient "current business" out of session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantCtx {
    pub business_id: Uuid,
}

impl TenantCtx {
    pub fn new(business_id: Uuid) -> Self {
        Self { business_id }
    }
}

/// Resolves the tenant from the `X-Business-Id` header on API routes.
/// Webhook routes carry the business id in the URL path instead.
pub fn tenant_from_headers(headers: &HeaderMap) -> Result<TenantCtx, (StatusCode, Json<Value>)> {
    let raw = headers
        .get(BUSINESS_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing X-Business-Id header"))?;

    let business_id = Uuid::parse_str(raw)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid X-Business-Id header"))?;

    Ok(TenantCtx::new(business_id))
}

pub fn load_business(
    conn: &mut DbConn,
    business_id: Uuid,
) -> Result<Business, diesel::result::Error> {
    businesses::table
        .filter(businesses::id.eq(business_id))
        .first(conn)
}

#[cfg(test)]
mod shared_tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_tenant_from_headers_ok() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            BUSINESS_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        let tenant = tenant_from_headers(&headers).unwrap();
        assert_eq!(tenant.business_id, id);
    }

    #[test]
    fn test_tenant_from_headers_missing() {
        let headers = HeaderMap::new();
        let err = tenant_from_headers(&headers).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_tenant_from_headers_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(BUSINESS_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        let err = tenant_from_headers(&headers).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
