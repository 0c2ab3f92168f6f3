use crate::channels::{CanonicalEvent, Channel};
use crate::responder;
use crate::shared::models::schema::{chatbot_templates, conversations, leads, messages};
use crate::shared::models::{
    Business, ChannelConfig, ChatbotTemplate, Conversation, Lead, Message, DIRECTION_IN,
    DIRECTION_OUT,
};
use crate::shared::state::AppState;
use crate::shared::utils::{truncate_preview, DbConn};
use crate::shared::TenantCtx;
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug)]
pub enum IngestOutcome {
    Created {
        conversation_id: Uuid,
        message_id: Uuid,
        created_conversation: bool,
    },
    /// Same vendor message id already persisted for this tenant; vendors are
    /// known to redeliver webhooks.
    Duplicate,
}

/// Runs one normalized event through the conversation pipeline:
/// dedupe, find-or-create conversation+lead, append the message, side
/// effects, canned reply, optional AI reply. Side-effect and reply failures
/// are logged and never propagate; only storage failures surface to the
/// caller, which logs them per-event without aborting the batch.
pub async fn ingest_event(
    state: &Arc<AppState>,
    tenant: &TenantCtx,
    business: &Business,
    cfg: &ChannelConfig,
    event: &CanonicalEvent,
) -> Result<IngestOutcome, IngestError> {
    let mut conn = state.conn.get().map_err(|e| IngestError::Pool(e.to_string()))?;

    let prior_deliveries = match &event.vendor_message_id {
        Some(vendor_id) => messages::table
            .filter(messages::business_id.eq(tenant.business_id))
            .filter(messages::channel.eq(event.channel.as_str()))
            .filter(messages::vendor_message_id.eq(vendor_id))
            .count()
            .get_result(&mut conn)?,
        None => 0,
    };
    if is_duplicate(event, prior_deliveries) {
        info!(
            "Duplicate {} delivery for vendor message {:?}, skipping",
            event.channel, event.vendor_message_id
        );
        return Ok(IngestOutcome::Duplicate);
    }

    let (conversation, created_conversation) =
        find_or_create_conversation(&mut conn, tenant, event)?;

    let message = Message {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        conversation_id: conversation.id,
        channel: event.channel.as_str().to_string(),
        direction: DIRECTION_IN.to_string(),
        kind: event.kind.as_str().to_string(),
        body: event.text.clone(),
        payload: event.payload.clone(),
        vendor_message_id: event.vendor_message_id.clone(),
        created_at: event.timestamp,
    };
    diesel::insert_into(messages::table)
        .values(&message)
        .execute(&mut conn)?;

    diesel::update(conversations::table.filter(conversations::id.eq(conversation.id)))
        .set((
            conversations::last_message_preview
                .eq(Some(truncate_preview(&event.text, PREVIEW_MAX_CHARS))),
            conversations::unread_count.eq(conversations::unread_count + 1),
            conversations::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    if let Err(e) = crate::notify::record_activity(
        &mut conn,
        tenant,
        "message.received",
        serde_json::json!({
            "channel": event.channel.as_str(),
            "conversation_id": conversation.id,
            "kind": event.kind.as_str(),
        }),
    ) {
        warn!("Failed to record activity for {}: {}", conversation.id, e);
    }

    let wants_notification = business
        .settings
        .get("notify_on_message")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if wants_notification {
        let title = format!("New {} message", event.channel);
        let body = truncate_preview(&event.text, PREVIEW_MAX_CHARS);
        if let Err(e) = crate::notify::notify(&mut conn, tenant, "inbound_message", &title, &body) {
            warn!("Failed to write notification for {}: {}", conversation.id, e);
        }
    }

    let message_id = message.id;
    let conversation_id = conversation.id;

    // Replies only make sense for textual events on channels with a send path.
    if event.kind.is_textual() && event.channel.supports_outbound() {
        let template_reply = match load_templates(&mut conn, tenant, event.channel) {
            Ok(templates) => match_template(&templates, &event.text).cloned(),
            Err(e) => {
                warn!("Failed to load chatbot templates: {}", e);
                None
            }
        };
        drop(conn);

        if let Some(template) = template_reply {
            send_and_persist_reply(state, tenant, cfg, &conversation, &template.response).await;
        } else if cfg.ai_enabled {
            if let Err(e) =
                responder::auto_reply(state, tenant, business, cfg, &conversation, &event.text)
                    .await
            {
                error!(
                    "AI auto-reply failed for conversation {}: {}",
                    conversation.id, e
                );
            }
        }
    }

    Ok(IngestOutcome::Created {
        conversation_id,
        message_id,
        created_conversation,
    })
}

/// Vendors redeliver webhooks, so a second delivery of a vendor message id
/// already stored for this tenant and channel is dropped. Events that carry
/// no vendor id are never treated as duplicates.
pub fn is_duplicate(event: &CanonicalEvent, prior_deliveries: i64) -> bool {
    event.vendor_message_id.is_some() && prior_deliveries > 0
}

fn find_or_create_conversation(
    conn: &mut DbConn,
    tenant: &TenantCtx,
    event: &CanonicalEvent,
) -> Result<(Conversation, bool), diesel::result::Error> {
    let existing: Option<Conversation> = conversations::table
        .filter(conversations::business_id.eq(tenant.business_id))
        .filter(conversations::channel.eq(event.channel.as_str()))
        .filter(conversations::external_id.eq(&event.external_sender_id))
        .first(conn)
        .optional()?;

    if let Some(mut conversation) = existing {
        if conversation.contact_name.is_none() && event.contact_name.is_some() {
            diesel::update(conversations::table.filter(conversations::id.eq(conversation.id)))
                .set(conversations::contact_name.eq(event.contact_name.clone()))
                .execute(conn)?;
            conversation.contact_name = event.contact_name.clone();
        }
        return Ok((conversation, false));
    }

    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        channel: event.channel.as_str().to_string(),
        external_id: event.external_sender_id.clone(),
        contact_name: event.contact_name.clone(),
        status: "open".to_string(),
        unread_count: 0,
        last_message_preview: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(conversations::table)
        .values(&conversation)
        .execute(conn)?;

    let lead = Lead {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        conversation_id: Some(conversation.id),
        name: event
            .contact_name
            .clone()
            .unwrap_or_else(|| event.external_sender_id.clone()),
        external_id: Some(event.external_sender_id.clone()),
        channel: Some(event.channel.as_str().to_string()),
        status: crate::crm::LeadStatus::New.as_str().to_string(),
        score: 0,
        estimated_value: None,
        source: Some(event.channel.default_lead_source().to_string()),
        first_contact_at: None,
        converted_at: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(leads::table)
        .values(&lead)
        .execute(conn)?;

    info!(
        "Created conversation {} and lead {} for {}:{}",
        conversation.id, lead.id, event.channel, event.external_sender_id
    );

    Ok((conversation, true))
}

fn load_templates(
    conn: &mut DbConn,
    tenant: &TenantCtx,
    channel: Channel,
) -> Result<Vec<ChatbotTemplate>, diesel::result::Error> {
    chatbot_templates::table
        .filter(chatbot_templates::business_id.eq(tenant.business_id))
        .filter(chatbot_templates::channel.eq(channel.as_str()))
        .order(chatbot_templates::created_at.asc())
        .load(conn)
}

/// Keyword triggers are matched case-insensitively as substrings; the first
/// configured match wins.
pub fn match_template<'a>(
    templates: &'a [ChatbotTemplate],
    text: &str,
) -> Option<&'a ChatbotTemplate> {
    let haystack = text.to_lowercase();
    templates.iter().find(|t| {
        let trigger = t.trigger.to_lowercase();
        !trigger.is_empty() && haystack.contains(&trigger)
    })
}

async fn send_and_persist_reply(
    state: &Arc<AppState>,
    tenant: &TenantCtx,
    cfg: &ChannelConfig,
    conversation: &Conversation,
    text: &str,
) {
    let channel = match conversation.channel.parse::<Channel>() {
        Ok(c) => c,
        Err(_) => {
            warn!("Conversation {} has unknown channel", conversation.id);
            return;
        }
    };

    let sender = match state.senders.for_channel(channel) {
        Some(s) => s,
        None => return,
    };

    if let Err(e) = sender.send_text(cfg, &conversation.external_id, text).await {
        error!(
            "Failed to send canned reply for conversation {}: {}",
            conversation.id, e
        );
        return;
    }

    match state.conn.get() {
        Ok(mut conn) => {
            if let Err(e) = append_outbound(&mut conn, tenant, conversation.id, channel, text) {
                error!("Failed to persist canned reply: {}", e);
            }
        }
        Err(e) => error!("Failed to persist canned reply: {}", e),
    }
}

/// Appends an outbound text message and refreshes the conversation preview.
/// Shared by the canned-reply path, the AI responder and the inbox send API.
pub fn append_outbound(
    conn: &mut DbConn,
    tenant: &TenantCtx,
    conversation_id: Uuid,
    channel: Channel,
    text: &str,
) -> Result<Message, diesel::result::Error> {
    let message = Message {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        conversation_id,
        channel: channel.as_str().to_string(),
        direction: DIRECTION_OUT.to_string(),
        kind: "text".to_string(),
        body: text.to_string(),
        payload: serde_json::json!({ "text": text }),
        vendor_message_id: None,
        created_at: Utc::now(),
    };

    diesel::insert_into(messages::table)
        .values(&message)
        .execute(conn)?;

    diesel::update(conversations::table.filter(conversations::id.eq(conversation_id)))
        .set((
            conversations::last_message_preview
                .eq(Some(truncate_preview(text, PREVIEW_MAX_CHARS))),
            conversations::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

    Ok(message)
}
