pub mod calls;
pub mod meta;
pub mod senders;
pub mod telegram;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of messaging/telephony integrations. Inbound routing,
/// normalization and outbound dispatch all branch over this enum rather than
/// over free-form channel strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Telegram,
    Instagram,
    Facebook,
    Pbx,
    Utel,
    MoiZvonki,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Telegram,
        Channel::Instagram,
        Channel::Facebook,
        Channel::Pbx,
        Channel::Utel,
        Channel::MoiZvonki,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Telegram => "telegram",
            Channel::Instagram => "instagram",
            Channel::Facebook => "facebook",
            Channel::Pbx => "pbx",
            Channel::Utel => "utel",
            Channel::MoiZvonki => "moizvonki",
        }
    }

    /// Instagram and Facebook share Meta's GET verification handshake and
    /// entry/messaging payload shape.
    pub fn is_meta_family(&self) -> bool {
        matches!(self, Channel::Instagram | Channel::Facebook)
    }

    /// Call providers deliver events only; there is no outbound text path.
    pub fn supports_outbound(&self) -> bool {
        matches!(
            self,
            Channel::Telegram | Channel::Instagram | Channel::Facebook
        )
    }

    /// Inbound messaging channels require a vendor access token before any
    /// webhook processing proceeds. Call providers only need the enabled flag.
    pub fn requires_access_token(&self) -> bool {
        self.supports_outbound()
    }

    /// Header carrying the HMAC-SHA256 signature for providers that sign
    /// their deliveries.
    pub fn signature_header(&self) -> Option<&'static str> {
        match self {
            Channel::Pbx => Some("X-PBX-Signature"),
            Channel::Utel => Some("X-Utel-Signature"),
            Channel::MoiZvonki => Some("X-Webhook-Signature"),
            _ => None,
        }
    }

    /// Default lead source recorded when ingestion creates a lead.
    pub fn default_lead_source(&self) -> &'static str {
        match self {
            Channel::Telegram => "telegram",
            Channel::Instagram => "instagram",
            Channel::Facebook => "facebook",
            Channel::Pbx | Channel::Utel | Channel::MoiZvonki => "phone",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Channel::Telegram),
            "instagram" => Ok(Channel::Instagram),
            "facebook" => Ok(Channel::Facebook),
            "pbx" | "onlinepbx" => Ok(Channel::Pbx),
            "utel" => Ok(Channel::Utel),
            "moizvonki" => Ok(Channel::MoiZvonki),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    QuickReply,
    StoryReply,
    Call,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Text => "text",
            EventKind::QuickReply => "quick_reply",
            EventKind::StoryReply => "story_reply",
            EventKind::Call => "call",
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, EventKind::Text | EventKind::QuickReply)
    }
}

/// Channel-agnostic shape every vendor event is mapped into before it touches
/// the conversation pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalEvent {
    pub channel: Channel,
    pub external_sender_id: String,
    pub contact_name: Option<String>,
    pub kind: EventKind,
    pub text: String,
    pub payload: serde_json::Value,
    pub vendor_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Parses a raw vendor body and maps it to canonical events. A parse failure
/// here means the payload was not syntactically acceptable; malformed
/// sub-events inside an otherwise valid payload are skipped by the
/// per-channel normalizers with a warning instead.
pub fn normalize(channel: Channel, body: &[u8]) -> Result<Vec<CanonicalEvent>, serde_json::Error> {
    match channel {
        Channel::Telegram => {
            let update: telegram::TelegramUpdate = serde_json::from_slice(body)?;
            Ok(telegram::normalize(&update))
        }
        Channel::Instagram | Channel::Facebook => {
            let payload: meta::MetaWebhook = serde_json::from_slice(body)?;
            Ok(meta::normalize(channel, &payload))
        }
        Channel::Pbx => {
            let event: calls::PbxCallEvent = serde_json::from_slice(body)?;
            Ok(calls::normalize_pbx(&event))
        }
        Channel::Utel => {
            let event: calls::UtelCallEvent = serde_json::from_slice(body)?;
            Ok(calls::normalize_utel(&event))
        }
        Channel::MoiZvonki => {
            let event: calls::MoiZvonkiCallEvent = serde_json::from_slice(body)?;
            Ok(calls::normalize_moizvonki(&event))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_str(channel.as_str()), Ok(channel));
        }
    }

    #[test]
    fn test_unknown_channel_rejected() {
        assert!(Channel::from_str("viber").is_err());
        assert!(Channel::from_str("").is_err());
    }

    #[test]
    fn test_meta_family() {
        assert!(Channel::Instagram.is_meta_family());
        assert!(Channel::Facebook.is_meta_family());
        assert!(!Channel::Telegram.is_meta_family());
        assert!(!Channel::Pbx.is_meta_family());
    }

    #[test]
    fn test_signature_headers() {
        assert_eq!(Channel::Pbx.signature_header(), Some("X-PBX-Signature"));
        assert_eq!(Channel::Utel.signature_header(), Some("X-Utel-Signature"));
        assert_eq!(
            Channel::MoiZvonki.signature_header(),
            Some("X-Webhook-Signature")
        );
        assert_eq!(Channel::Telegram.signature_header(), None);
    }

    #[test]
    fn test_outbound_support() {
        assert!(Channel::Telegram.supports_outbound());
        assert!(!Channel::Utel.supports_outbound());
        assert!(!Channel::MoiZvonki.supports_outbound());
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize(Channel::Telegram, b"not json").is_err());
        assert!(normalize(Channel::Instagram, b"{").is_err());
    }
}
