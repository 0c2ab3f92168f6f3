use crate::channels::Channel;
use crate::ingest::append_outbound;
use crate::settings::load_channel_config;
use crate::shared::models::schema::{conversations, messages};
use crate::shared::models::{Conversation, Message};
use crate::shared::state::AppState;
use crate::shared::utils::api_error;
use crate::shared::{tenant_from_headers, TenantCtx};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/inbox", get(list_inbox))
        .route("/api/inbox/:id", get(get_conversation))
        .route("/api/inbox/:id/message", post(send_message))
}

/// The channel-agnostic row every conversation is flattened into for the
/// merged inbox view.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationPreview {
    pub id: Uuid,
    pub channel: String,
    pub contact_name: Option<String>,
    pub external_id: String,
    pub last_message_preview: Option<String>,
    pub unread_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationPreview {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            channel: c.channel,
            contact_name: c.contact_name,
            external_id: c.external_id,
            last_message_preview: c.last_message_preview,
            unread_count: c.unread_count,
            updated_at: c.updated_at,
        }
    }
}

/// Most recently updated first, regardless of origin channel.
pub fn order_previews(previews: &mut [ConversationPreview]) {
    previews.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

pub fn compute_stats(rows: &[(String, i32)]) -> Value {
    let total = rows.len();
    let unread: i64 = rows.iter().map(|(_, u)| *u as i64).sum();

    let mut per_channel: BTreeMap<&str, (usize, i64)> = BTreeMap::new();
    for (channel, unread_count) in rows {
        let entry = per_channel.entry(channel.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += *unread_count as i64;
    }

    let channels: BTreeMap<&str, Value> = per_channel
        .into_iter()
        .map(|(channel, (count, unread))| {
            (channel, json!({ "conversations": count, "unread": unread }))
        })
        .collect();

    json!({ "total": total, "unread": unread, "channels": channels })
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

async fn list_inbox(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut q = conversations::table
        .filter(conversations::business_id.eq(tenant.business_id))
        .into_boxed();

    if let Some(channel) = &query.channel {
        let channel: Channel = channel
            .parse()
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Unknown channel filter"))?;
        q = q.filter(conversations::channel.eq(channel.as_str()));
    }

    if let Some(status) = &query.status {
        q = q.filter(conversations::status.eq(status.clone()));
    }

    if let Some(search) = &query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            conversations::contact_name
                .ilike(pattern.clone())
                .or(conversations::external_id.ilike(pattern.clone()))
                .or(conversations::last_message_preview.ilike(pattern)),
        );
    }

    let rows: Vec<Conversation> = q
        .order(conversations::updated_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    let mut previews: Vec<ConversationPreview> =
        rows.into_iter().map(ConversationPreview::from).collect();
    order_previews(&mut previews);

    let stat_rows: Vec<(String, i32)> = conversations::table
        .filter(conversations::business_id.eq(tenant.business_id))
        .select((conversations::channel, conversations::unread_count))
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    Ok(Json(json!({
        "success": true,
        "conversations": previews,
        "stats": compute_stats(&stat_rows),
    })))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let conversation: Conversation = conversations::table
        .filter(conversations::id.eq(id))
        .filter(conversations::business_id.eq(tenant.business_id))
        .first(&mut conn)
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Conversation not found"))?;

    let history: Vec<Message> = messages::table
        .filter(messages::conversation_id.eq(conversation.id))
        .order(messages::created_at.asc())
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    // Opening a conversation marks it read.
    if conversation.unread_count > 0 {
        if let Err(e) = diesel::update(conversations::table.filter(conversations::id.eq(id)))
            .set(conversations::unread_count.eq(0))
            .execute(&mut conn)
        {
            error!("Failed to mark conversation {} read: {}", id, e);
        }
    }

    Ok(Json(json!({
        "success": true,
        "conversation": ConversationPreview::from(conversation),
        "messages": history,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// Single send interface over every origin channel: resolves which vendor
/// owns the conversation and dispatches through that channel's send path.
async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message is empty"));
    }

    let (conversation, channel, cfg) = {
        let mut conn = state.conn.get().map_err(|e| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}"))
        })?;

        let conversation: Conversation = conversations::table
            .filter(conversations::id.eq(id))
            .filter(conversations::business_id.eq(tenant.business_id))
            .first(&mut conn)
            .map_err(|_| api_error(StatusCode::NOT_FOUND, "Conversation not found"))?;

        let channel: Channel = conversation
            .channel
            .parse()
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Unknown channel"))?;

        if !channel.supports_outbound() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Channel does not support outbound messages",
            ));
        }

        let cfg = load_channel_config(&mut conn, &tenant, channel)
            .map_err(|e| {
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("Query error: {e}"),
                )
            })?
            .filter(|c| c.enabled)
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Channel not configured"))?;

        (conversation, channel, cfg)
    };

    let sender = state
        .senders
        .for_channel(channel)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Channel has no send path"))?;

    sender
        .send_text(&cfg, &conversation.external_id, &req.message)
        .await
        .map_err(|e| {
            error!("Send failed for conversation {}: {}", id, e);
            api_error(StatusCode::BAD_GATEWAY, "Vendor send failed")
        })?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;
    let message = append_outbound(&mut conn, &tenant, conversation.id, channel, &req.message)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Insert error: {e}"),
            )
        })?;

    info!(
        "Outbound message {} sent on {} for conversation {}",
        message.id, channel, conversation.id
    );

    Ok(Json(json!({ "success": true, "message": message })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn preview(channel: &str, updated_at: DateTime<Utc>) -> ConversationPreview {
        ConversationPreview {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            contact_name: None,
            external_id: "x".to_string(),
            last_message_preview: None,
            unread_count: 0,
            updated_at,
        }
    }

    #[test]
    fn test_order_previews_newest_first_across_channels() {
        let now = Utc::now();
        let older = preview("instagram", now - Duration::minutes(5));
        let newer = preview("telegram", now);
        let mut previews = vec![older, newer];

        order_previews(&mut previews);

        assert_eq!(previews[0].channel, "telegram");
        assert_eq!(previews[1].channel, "instagram");
    }

    #[test]
    fn test_compute_stats_aggregates_per_channel() {
        let rows = vec![
            ("telegram".to_string(), 2),
            ("telegram".to_string(), 0),
            ("pbx".to_string(), 1),
        ];
        let stats = compute_stats(&rows);
        assert_eq!(stats["total"], 3);
        assert_eq!(stats["unread"], 3);
        assert_eq!(stats["channels"]["telegram"]["conversations"], 2);
        assert_eq!(stats["channels"]["telegram"]["unread"], 2);
        assert_eq!(stats["channels"]["pbx"]["unread"], 1);
    }

    #[test]
    fn test_compute_stats_empty() {
        let stats = compute_stats(&[]);
        assert_eq!(stats["total"], 0);
        assert_eq!(stats["unread"], 0);
    }
}
