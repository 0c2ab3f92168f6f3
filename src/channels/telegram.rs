use super::{CanonicalEvent, Channel, EventKind};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub edited_message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub chat: Option<TelegramChat>,
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TelegramUser {
    pub id: serde_json::Value,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub chat_type: Option<String>,
}

impl TelegramUser {
    /// Telegram sends numeric ids; tests and some proxies send strings.
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn display_name(&self) -> Option<String> {
        let mut name = self.first_name.clone()?;
        if let Some(last) = &self.last_name {
            name.push(' ');
            name.push_str(last);
        }
        Some(name)
    }
}

pub fn normalize(update: &TelegramUpdate) -> Vec<CanonicalEvent> {
    let mut events = Vec::new();

    let message = match update.message.as_ref().or(update.edited_message.as_ref()) {
        Some(m) => m,
        None => return events,
    };

    let sender_id = message
        .from
        .as_ref()
        .and_then(|u| u.id_string())
        .or_else(|| message.chat.as_ref().map(|c| c.id.to_string()));

    let sender_id = match sender_id {
        Some(id) => id,
        None => {
            warn!(
                "Telegram update {} has no sender or chat id, skipping",
                update.update_id
            );
            return events;
        }
    };

    let text = message
        .text
        .clone()
        .or_else(|| message.caption.clone())
        .unwrap_or_default();
    if text.is_empty() {
        warn!(
            "Telegram update {} has no text content, skipping",
            update.update_id
        );
        return events;
    }

    let timestamp = message
        .date
        .and_then(|d| DateTime::<Utc>::from_timestamp(d, 0))
        .unwrap_or_else(Utc::now);

    events.push(CanonicalEvent {
        channel: Channel::Telegram,
        external_sender_id: sender_id,
        contact_name: message.from.as_ref().and_then(|u| u.display_name()),
        kind: EventKind::Text,
        text,
        payload: serde_json::to_value(message).unwrap_or_default(),
        vendor_message_id: Some(match message.message_id {
            Some(id) => format!("tg-{}", id),
            None => format!("tg-upd-{}", update.update_id),
        }),
        timestamp,
    });

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_message() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 77,
                "from": {"id": "u1", "first_name": "Ada"},
                "chat": {"id": 99, "type": "private"},
                "date": 1700000000,
                "text": "hi"
            }
        }))
        .unwrap();

        let events = normalize(&update);
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.channel, Channel::Telegram);
        assert_eq!(ev.external_sender_id, "u1");
        assert_eq!(ev.kind, EventKind::Text);
        assert_eq!(ev.text, "hi");
        assert_eq!(ev.vendor_message_id.as_deref(), Some("tg-77"));
        assert_eq!(ev.contact_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_normalize_numeric_sender_id() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 1,
                "from": {"id": 123456, "first_name": "Bo"},
                "text": "hello"
            }
        }))
        .unwrap();

        let events = normalize(&update);
        assert_eq!(events[0].external_sender_id, "123456");
    }

    #[test]
    fn test_normalize_caption_fallback() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 3,
            "message": {
                "message_id": 2,
                "from": {"id": 5},
                "caption": "photo caption"
            }
        }))
        .unwrap();

        assert_eq!(normalize(&update)[0].text, "photo caption");
    }

    #[test]
    fn test_normalize_skips_empty_update() {
        let update: TelegramUpdate =
            serde_json::from_value(serde_json::json!({ "update_id": 4 })).unwrap();
        assert!(normalize(&update).is_empty());
    }

    #[test]
    fn test_normalize_skips_message_without_sender() {
        let update: TelegramUpdate = serde_json::from_value(serde_json::json!({
            "update_id": 5,
            "message": {"message_id": 3, "text": "orphan"}
        }))
        .unwrap();
        assert!(normalize(&update).is_empty());
    }
}
