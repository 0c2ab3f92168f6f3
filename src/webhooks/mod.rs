use crate::channels::{self, Channel};
use crate::ingest::{self, IngestOutcome};
use crate::security::verify_signature;
use crate::settings::load_channel_config;
use crate::shared::models::{Business, ChannelConfig};
use crate::shared::state::AppState;
use crate::shared::utils::api_error;
use crate::shared::{load_business, TenantCtx};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route(
        "/webhooks/:channel/:business_id",
        get(verify_webhook).post(handle_webhook),
    )
}

/// Meta's verification handshake parameters. Meta sends dotted names; the
/// underscored aliases are accepted for hand-rolled callers.
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode", alias = "hub_mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token", alias = "hub_verify_token", default)]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge", alias = "hub_challenge", default)]
    pub challenge: Option<String>,
}

/// GET handshake for the Meta-family channels: echo the challenge verbatim on
/// a subscribe request with the right token, 403 on any mismatch.
async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Path((channel, business_id)): Path<(String, Uuid)>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let channel = match channel.parse::<Channel>() {
        Ok(c) => c,
        Err(_) => return (StatusCode::NOT_FOUND, "Unknown channel".to_string()),
    };
    if !channel.is_meta_family() {
        return (
            StatusCode::NOT_FOUND,
            "Channel has no verification handshake".to_string(),
        );
    }

    let mut conn = match state.conn.get() {
        Ok(c) => c,
        Err(e) => {
            error!("DB pool error during webhook verification: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database unavailable".to_string(),
            );
        }
    };

    let tenant = TenantCtx::new(business_id);
    let cfg = match load_channel_config(&mut conn, &tenant, channel) {
        Ok(Some(cfg)) => cfg,
        Ok(None) | Err(_) => {
            warn!(
                "Verification request for unconfigured {} channel of business {}",
                channel, business_id
            );
            return (StatusCode::FORBIDDEN, "Channel not configured".to_string());
        }
    };

    match check_verification(&query, cfg.verify_token.as_deref()) {
        Some(challenge) => {
            info!("{} webhook verified for business {}", channel, business_id);
            (StatusCode::OK, challenge)
        }
        None => {
            warn!(
                "{} webhook verification failed for business {}",
                channel, business_id
            );
            (StatusCode::FORBIDDEN, "Verification failed".to_string())
        }
    }
}

/// Returns the challenge to echo when mode and token check out.
pub fn check_verification(query: &VerifyQuery, expected_token: Option<&str>) -> Option<String> {
    let expected = match expected_token {
        Some(t) if !t.is_empty() => t,
        _ => return None,
    };

    if query.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        return None;
    }
    query.challenge.clone()
}

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Path((channel, business_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let channel = match channel.parse::<Channel>() {
        Ok(c) => c,
        Err(_) => return api_error(StatusCode::NOT_FOUND, "Unknown channel"),
    };

    let tenant = TenantCtx::new(business_id);

    let (business, cfg) = match resolve_tenant_config(&state, &tenant, channel) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    if let Some(header_name) = channel.signature_header() {
        let provided = headers.get(header_name).and_then(|v| v.to_str().ok());
        if !verify_signature(cfg.webhook_secret.as_deref(), &body, provided) {
            warn!(
                "Rejected {} webhook for business {}: bad signature",
                channel, business_id
            );
            return api_error(StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    let events = match channels::normalize(channel, &body) {
        Ok(events) => events,
        Err(e) => {
            warn!(
                "Unparseable {} payload for business {}: {}",
                channel, business_id, e
            );
            return api_error(StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    // The batch never aborts on one bad event, and the vendor always gets an
    // acknowledgment once the payload parsed; anything else invites retry
    // storms for errors the vendor cannot fix.
    let mut processed = 0usize;
    let mut duplicates = 0usize;
    for event in &events {
        match ingest::ingest_event(&state, &tenant, &business, &cfg, event).await {
            Ok(IngestOutcome::Created { .. }) => processed += 1,
            Ok(IngestOutcome::Duplicate) => duplicates += 1,
            Err(e) => error!(
                "Failed to ingest {} event from {}: {}",
                channel, event.external_sender_id, e
            ),
        }
    }

    info!(
        "{} webhook for business {}: {} processed, {} duplicates, {} received",
        channel,
        business_id,
        processed,
        duplicates,
        events.len()
    );

    (StatusCode::OK, Json(ack_body(channel, processed)))
}

fn resolve_tenant_config(
    state: &Arc<AppState>,
    tenant: &TenantCtx,
    channel: Channel,
) -> Result<(Business, ChannelConfig), (StatusCode, Json<Value>)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let business = load_business(&mut conn, tenant.business_id)
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Business not found"))?;

    let cfg = match load_channel_config(&mut conn, tenant, channel) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            warn!(
                "Webhook for business {} on unconfigured channel {}",
                tenant.business_id, channel
            );
            return Err(api_error(StatusCode::BAD_REQUEST, "Channel not configured"));
        }
        Err(e) => {
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            ))
        }
    };

    if !cfg.enabled {
        warn!(
            "Webhook for business {} on disabled channel {}",
            tenant.business_id, channel
        );
        return Err(api_error(StatusCode::BAD_REQUEST, "Channel disabled"));
    }

    if channel.requires_access_token()
        && cfg.access_token.as_deref().map_or(true, str::is_empty)
    {
        warn!(
            "Webhook for business {} on channel {} without credentials",
            tenant.business_id, channel
        );
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Channel credentials missing",
        ));
    }

    Ok((business, cfg))
}

/// Telegram expects its own `{"ok": true}` shape; everything else gets the
/// standard success envelope.
fn ack_body(channel: Channel, processed: usize) -> Value {
    match channel {
        Channel::Telegram => json!({ "ok": true, "processed": processed }),
        _ => json!({ "success": true, "processed": processed }),
    }
}
