use crate::shared::models::schema::{activity_log, notifications};
use crate::shared::models::{ActivityEntry, Notification};
use crate::shared::state::AppState;
use crate::shared::utils::{api_error, DbConn};
use crate::shared::{tenant_from_headers, TenantCtx};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Appends an audit row. Callers treat failure as non-fatal and log it.
pub fn record_activity(
    conn: &mut DbConn,
    tenant: &TenantCtx,
    action: &str,
    detail: Value,
) -> Result<(), diesel::result::Error> {
    let entry = ActivityEntry {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        user_id: None,
        action: action.to_string(),
        detail,
        created_at: Utc::now(),
    };

    diesel::insert_into(activity_log::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

pub fn notify(
    conn: &mut DbConn,
    tenant: &TenantCtx,
    kind: &str,
    title: &str,
    body: &str,
) -> Result<(), diesel::result::Error> {
    let notification = Notification {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        user_id: None,
        kind: kind.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        read: false,
        created_at: Utc::now(),
    };

    diesel::insert_into(notifications::table)
        .values(&notification)
        .execute(conn)?;
    Ok(())
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_read))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let rows: Vec<Notification> = notifications::table
        .filter(notifications::business_id.eq(tenant.business_id))
        .order(notifications::created_at.desc())
        .limit(100)
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    Ok(Json(json!({ "success": true, "notifications": rows })))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::id.eq(id))
            .filter(notifications::business_id.eq(tenant.business_id)),
    )
    .set(notifications::read.eq(true))
    .execute(&mut conn)
    .map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Update error: {e}"),
        )
    })?;

    if updated == 0 {
        return Err(api_error(StatusCode::NOT_FOUND, "Notification not found"));
    }

    Ok(Json(json!({ "success": true })))
}
