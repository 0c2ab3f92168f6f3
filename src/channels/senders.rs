use super::Channel;
use crate::shared::models::ChannelConfig;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

pub type SendResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Outbound text dispatch for one vendor API. The per-tenant credentials come
/// in with the config on every call; senders themselves hold no tenant state.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_text(&self, cfg: &ChannelConfig, to: &str, text: &str) -> SendResult;
}

pub struct TelegramSender {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSender {
    pub fn new() -> Self {
        Self::with_base_url("https://api.telegram.org".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    async fn send_text(&self, cfg: &ChannelConfig, to: &str, text: &str) -> SendResult {
        let token = cfg
            .access_token
            .as_deref()
            .ok_or("Telegram bot token not configured")?;

        let url = format!("{}/bot{}/sendMessage", self.base_url, token);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": to, "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body: TelegramApiResponse = response.json().await?;
        if !body.ok {
            return Err(format!(
                "Telegram API error ({}): {}",
                status,
                body.description.unwrap_or_else(|| "unknown".to_string())
            )
            .into());
        }

        debug!("Telegram message sent to {}", to);
        Ok(())
    }
}

/// Sends through the Meta Graph API; shared by Instagram and Facebook
/// Messenger, which use the same `me/messages` endpoint.
pub struct MetaSender {
    client: reqwest::Client,
    base_url: String,
}

impl MetaSender {
    pub fn new() -> Self {
        Self::with_base_url("https://graph.facebook.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

impl Default for MetaSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for MetaSender {
    async fn send_text(&self, cfg: &ChannelConfig, to: &str, text: &str) -> SendResult {
        let token = cfg
            .access_token
            .as_deref()
            .ok_or("Meta access token not configured")?;

        let url = format!("{}/v19.0/me/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(&json!({
                "recipient": { "id": to },
                "message": { "text": text },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Graph API error ({}): {}", status, body).into());
        }

        debug!("Meta message sent to {}", to);
        Ok(())
    }
}

/// Static registry over the fixed channel set. Call providers have no
/// outbound path and resolve to `None`.
pub struct ChannelSenders {
    pub telegram: TelegramSender,
    pub meta: MetaSender,
}

impl ChannelSenders {
    pub fn new() -> Self {
        Self {
            telegram: TelegramSender::new(),
            meta: MetaSender::new(),
        }
    }

    pub fn for_channel(&self, channel: Channel) -> Option<&dyn ChannelSender> {
        match channel {
            Channel::Telegram => Some(&self.telegram),
            Channel::Instagram | Channel::Facebook => Some(&self.meta),
            Channel::Pbx | Channel::Utel | Channel::MoiZvonki => None,
        }
    }
}

impl Default for ChannelSenders {
    fn default() -> Self {
        let senders = Self::new();
        info!("Channel senders initialized for telegram and meta-family");
        senders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_config(token: Option<&str>) -> ChannelConfig {
        let now = Utc::now();
        ChannelConfig {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            channel: "telegram".to_string(),
            enabled: true,
            access_token: token.map(|t| t.to_string()),
            verify_token: None,
            webhook_secret: None,
            ai_enabled: false,
            greeting: None,
            fallback: None,
            business_hours: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_registry_resolution() {
        let senders = ChannelSenders::new();
        assert!(senders.for_channel(Channel::Telegram).is_some());
        assert!(senders.for_channel(Channel::Instagram).is_some());
        assert!(senders.for_channel(Channel::Facebook).is_some());
        assert!(senders.for_channel(Channel::Pbx).is_none());
        assert!(senders.for_channel(Channel::MoiZvonki).is_none());
    }

    #[tokio::test]
    async fn test_telegram_send_ok() {
        crate::tests::test_util::setup();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botsecret-token/sendMessage")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"chat_id": "u1", "text": "Hello!"}),
            ))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {}}"#)
            .create_async()
            .await;

        let sender = TelegramSender::with_base_url(server.url());
        let cfg = test_config(Some("secret-token"));
        sender.send_text(&cfg, "u1", "Hello!").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_telegram_send_api_error() {
        crate::tests::test_util::setup();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botbad/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": false, "description": "Unauthorized"}"#)
            .create_async()
            .await;

        let sender = TelegramSender::with_base_url(server.url());
        let cfg = test_config(Some("bad"));
        let err = sender.send_text(&cfg, "u1", "hi").await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_telegram_send_missing_token() {
        crate::tests::test_util::setup();
        let sender = TelegramSender::new();
        let cfg = test_config(None);
        assert!(sender.send_text(&cfg, "u1", "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_meta_send_ok() {
        crate::tests::test_util::setup();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v19.0/me/messages")
            .match_query(mockito::Matcher::UrlEncoded(
                "access_token".into(),
                "page-token".into(),
            ))
            .with_status(200)
            .with_body(r#"{"message_id": "m.out"}"#)
            .create_async()
            .await;

        let sender = MetaSender::with_base_url(server.url());
        let cfg = test_config(Some("page-token"));
        sender.send_text(&cfg, "ig-1", "reply").await.unwrap();
        mock.assert_async().await;
    }
}
