use crate::channels::Channel;
use crate::shared::models::schema::{channel_configs, chatbot_templates};
use crate::shared::models::{ChannelConfig, ChatbotTemplate};
use crate::shared::state::AppState;
use crate::shared::utils::{api_error, DbConn};
use crate::shared::{tenant_from_headers, TenantCtx};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/settings/channels", get(list_channel_configs))
        .route("/api/settings/channels/:channel", put(upsert_channel_config))
        .route("/api/settings/templates/:channel", put(replace_templates))
}

/// One row per (business, channel); read on every inbound webhook.
pub fn load_channel_config(
    conn: &mut DbConn,
    tenant: &TenantCtx,
    channel: Channel,
) -> Result<Option<ChannelConfig>, diesel::result::Error> {
    channel_configs::table
        .filter(channel_configs::business_id.eq(tenant.business_id))
        .filter(channel_configs::channel.eq(channel.as_str()))
        .first(conn)
        .optional()
}

#[derive(Debug, Deserialize)]
pub struct ChannelConfigRequest {
    pub enabled: bool,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub verify_token: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub ai_enabled: bool,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub business_hours: Option<String>,
}

async fn list_channel_configs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let configs: Vec<ChannelConfig> = channel_configs::table
        .filter(channel_configs::business_id.eq(tenant.business_id))
        .order(channel_configs::channel.asc())
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    Ok(Json(json!({ "success": true, "channels": configs })))
}

async fn upsert_channel_config(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ChannelConfigRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let channel: Channel = channel
        .parse()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Unknown channel"))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let now = Utc::now();
    let existing = load_channel_config(&mut conn, &tenant, channel).map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Query error: {e}"),
        )
    })?;

    let config = match existing {
        Some(mut cfg) => {
            cfg.enabled = req.enabled;
            cfg.access_token = req.access_token;
            cfg.verify_token = req.verify_token;
            cfg.webhook_secret = req.webhook_secret;
            cfg.ai_enabled = req.ai_enabled;
            cfg.greeting = req.greeting;
            cfg.fallback = req.fallback;
            cfg.business_hours = req.business_hours;
            cfg.updated_at = now;

            diesel::update(channel_configs::table.filter(channel_configs::id.eq(cfg.id)))
                .set(&cfg)
                .execute(&mut conn)
                .map_err(|e| {
                    api_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("Update error: {e}"),
                    )
                })?;
            cfg
        }
        None => {
            let cfg = ChannelConfig {
                id: Uuid::new_v4(),
                business_id: tenant.business_id,
                channel: channel.as_str().to_string(),
                enabled: req.enabled,
                access_token: req.access_token,
                verify_token: req.verify_token,
                webhook_secret: req.webhook_secret,
                ai_enabled: req.ai_enabled,
                greeting: req.greeting,
                fallback: req.fallback,
                business_hours: req.business_hours,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(channel_configs::table)
                .values(&cfg)
                .execute(&mut conn)
                .map_err(|e| {
                    api_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("Insert error: {e}"),
                    )
                })?;
            cfg
        }
    };

    info!(
        "Channel config for {}:{} saved (enabled={}, ai={})",
        tenant.business_id, channel, config.enabled, config.ai_enabled
    );

    Ok(Json(json!({ "success": true, "config": config })))
}

#[derive(Debug, Deserialize)]
pub struct TemplatesRequest {
    pub templates: Vec<TemplateItem>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateItem {
    pub trigger: String,
    pub response: String,
}

/// Templates are replaced wholesale on each save, never diffed.
async fn replace_templates(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TemplatesRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let channel: Channel = channel
        .parse()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Unknown channel"))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let now = Utc::now();
    let rows: Vec<ChatbotTemplate> = req
        .templates
        .into_iter()
        .filter(|t| !t.trigger.trim().is_empty())
        .map(|t| ChatbotTemplate {
            id: Uuid::new_v4(),
            business_id: tenant.business_id,
            channel: channel.as_str().to_string(),
            trigger: t.trigger,
            response: t.response,
            created_at: now,
        })
        .collect();

    let count = rows.len();
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(
            chatbot_templates::table
                .filter(chatbot_templates::business_id.eq(tenant.business_id))
                .filter(chatbot_templates::channel.eq(channel.as_str())),
        )
        .execute(conn)?;

        diesel::insert_into(chatbot_templates::table)
            .values(&rows)
            .execute(conn)?;
        Ok(())
    })
    .map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Transaction error: {e}"),
        )
    })?;

    info!(
        "Replaced {} chatbot templates for {}:{}",
        count, tenant.business_id, channel
    );

    Ok(Json(json!({ "success": true, "count": count })))
}
