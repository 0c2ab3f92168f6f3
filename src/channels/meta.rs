use super::{CanonicalEvent, Channel, EventKind};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

/// Webhook body shared by the Meta-family channels (Instagram and Facebook
/// Messenger): a list of entries, each carrying a `messaging` array.
#[derive(Debug, Deserialize, Serialize)]
pub struct MetaWebhook {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<MetaEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub messaging: Vec<MetaMessaging>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaMessaging {
    #[serde(default)]
    pub sender: Option<MetaParty>,
    #[serde(default)]
    pub recipient: Option<MetaParty>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<MetaMessage>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaParty {
    pub id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaMessage {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub quick_reply: Option<MetaQuickReply>,
    #[serde(default)]
    pub reply_to: Option<MetaReplyTo>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaQuickReply {
    pub payload: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaReplyTo {
    #[serde(default)]
    pub story: Option<MetaStory>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaStory {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

pub fn normalize(channel: Channel, payload: &MetaWebhook) -> Vec<CanonicalEvent> {
    let mut events = Vec::new();

    for entry in &payload.entry {
        for messaging in &entry.messaging {
            match normalize_messaging(channel, messaging) {
                Some(event) => events.push(event),
                None => warn!(
                    "{} messaging event in entry {:?} is malformed, skipping",
                    channel, entry.id
                ),
            }
        }
    }

    events
}

fn normalize_messaging(channel: Channel, messaging: &MetaMessaging) -> Option<CanonicalEvent> {
    let sender_id = messaging.sender.as_ref().map(|p| p.id.clone())?;
    let message = messaging.message.as_ref()?;

    let (kind, text, payload) = if let Some(quick_reply) = &message.quick_reply {
        (
            EventKind::QuickReply,
            quick_reply.payload.clone(),
            serde_json::json!({ "quick_reply": quick_reply.payload }),
        )
    } else if let Some(story) = message.reply_to.as_ref().and_then(|r| r.story.as_ref()) {
        (
            EventKind::StoryReply,
            message.text.clone().unwrap_or_default(),
            serde_json::json!({ "story_id": story.id, "story_url": story.url }),
        )
    } else if let Some(text) = &message.text {
        (
            EventKind::Text,
            text.clone(),
            serde_json::json!({ "text": text }),
        )
    } else {
        return None;
    };

    if text.is_empty() && kind != EventKind::StoryReply {
        return None;
    }

    let timestamp = messaging
        .timestamp
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Some(CanonicalEvent {
        channel,
        external_sender_id: sender_id,
        contact_name: None,
        kind,
        text,
        payload,
        vendor_message_id: message.mid.clone(),
        timestamp,
    })
}
