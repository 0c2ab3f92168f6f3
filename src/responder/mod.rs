use crate::channels::Channel;
use crate::ingest::append_outbound;
use crate::shared::models::schema::messages;
use crate::shared::models::{Business, ChannelConfig, Conversation, Message, DIRECTION_IN};
use crate::shared::state::AppState;
use crate::shared::TenantCtx;
use diesel::prelude::*;
use log::{info, warn};
use std::sync::Arc;

const HISTORY_WINDOW: i64 = 10;

/// Generates and sends an AI reply to an inbound text. Every failure path is
/// reported to the caller, which logs and swallows it; a webhook never fails
/// because the AI or the vendor send API did.
pub async fn auto_reply(
    state: &Arc<AppState>,
    tenant: &TenantCtx,
    business: &Business,
    cfg: &ChannelConfig,
    conversation: &Conversation,
    inbound_text: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let channel: Channel = conversation
        .channel
        .parse()
        .map_err(|_| "conversation has unknown channel")?;
    let sender = state
        .senders
        .for_channel(channel)
        .ok_or("channel has no outbound send path")?;

    let history = {
        let mut conn = state.conn.get()?;
        load_history(&mut conn, conversation)?
    };

    let prompt = build_prompt(business, cfg, &history, inbound_text);

    let reply = match state
        .llm_provider
        .generate(&prompt, &serde_json::json!({}))
        .await
    {
        Ok(text) => text,
        Err(e) => {
            // Fall back to the configured template when the LLM is down.
            warn!("LLM call failed for conversation {}: {}", conversation.id, e);
            match &cfg.fallback {
                Some(fallback) if !fallback.is_empty() => fallback.clone(),
                _ => return Err(e),
            }
        }
    };

    sender
        .send_text(cfg, &conversation.external_id, &reply)
        .await?;

    let mut conn = state.conn.get()?;
    append_outbound(&mut conn, tenant, conversation.id, channel, &reply)?;

    info!("AI reply sent for conversation {}", conversation.id);
    Ok(())
}

fn load_history(
    conn: &mut crate::shared::utils::DbConn,
    conversation: &Conversation,
) -> Result<Vec<Message>, diesel::result::Error> {
    let mut history: Vec<Message> = messages::table
        .filter(messages::conversation_id.eq(conversation.id))
        .order(messages::created_at.desc())
        .limit(HISTORY_WINDOW)
        .load(conn)?;
    history.reverse();
    Ok(history)
}

/// Prompt layout: persona/greeting, optional business context, then the
/// recent exchange with the new inbound line last.
pub fn build_prompt(
    business: &Business,
    cfg: &ChannelConfig,
    history: &[Message],
    inbound_text: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are a helpful assistant answering customers of the business \"");
    prompt.push_str(&business.name);
    prompt.push_str("\".\n");

    if let Some(greeting) = &cfg.greeting {
        if !greeting.is_empty() {
            prompt.push_str("Tone and greeting guidance: ");
            prompt.push_str(greeting);
            prompt.push('\n');
        }
    }

    let use_context = business
        .settings
        .get("ai_use_business_context")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if use_context {
        if let Some(dream_buyer) = business.settings.get("dream_buyer").and_then(|v| v.as_str()) {
            prompt.push_str("Ideal customer profile: ");
            prompt.push_str(dream_buyer);
            prompt.push('\n');
        }
        if let Some(offer) = business.settings.get("offer").and_then(|v| v.as_str()) {
            prompt.push_str("Current offer: ");
            prompt.push_str(offer);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nConversation so far:\n");
    for message in history {
        let role = if message.direction == DIRECTION_IN {
            "Customer"
        } else {
            "Assistant"
        };
        prompt.push_str(role);
        prompt.push_str(": ");
        prompt.push_str(&message.body);
        prompt.push('\n');
    }

    prompt.push_str("Customer: ");
    prompt.push_str(inbound_text);
    prompt.push_str("\nAssistant:");

    prompt
}
