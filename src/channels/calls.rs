use super::{CanonicalEvent, Channel, EventKind};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

/// OnlinePBX call notification.
#[derive(Debug, Deserialize, Serialize)]
pub struct PbxCallEvent {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub disposition: Option<String>,
    #[serde(default)]
    pub recording: Option<String>,
    #[serde(default)]
    pub start_stamp: Option<i64>,
}

/// UTEL telephony callback.
#[derive(Debug, Deserialize, Serialize)]
pub struct UtelCallEvent {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub record_url: Option<String>,
    #[serde(default)]
    pub started_at: Option<i64>,
}

/// MoiZvonki call report.
#[derive(Debug, Deserialize, Serialize)]
pub struct MoiZvonkiCallEvent {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub client_number: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<i64>,
    #[serde(default)]
    pub call_result: Option<String>,
    #[serde(default)]
    pub record_link: Option<String>,
    #[serde(default)]
    pub call_time: Option<i64>,
}

struct CallFields<'a> {
    call_id: Option<&'a str>,
    caller: Option<&'a str>,
    duration: Option<i64>,
    disposition: Option<&'a str>,
    recording_url: Option<&'a str>,
    started_at: Option<i64>,
}

pub fn normalize_pbx(event: &PbxCallEvent) -> Vec<CanonicalEvent> {
    normalize_call(
        Channel::Pbx,
        CallFields {
            call_id: event.uuid.as_deref(),
            caller: event.caller_id.as_deref(),
            duration: event.duration,
            disposition: event.disposition.as_deref(),
            recording_url: event.recording.as_deref(),
            started_at: event.start_stamp,
        },
    )
}

pub fn normalize_utel(event: &UtelCallEvent) -> Vec<CanonicalEvent> {
    normalize_call(
        Channel::Utel,
        CallFields {
            call_id: event.call_id.as_deref(),
            caller: event.phone.as_deref(),
            duration: event.duration,
            disposition: event.status.as_deref(),
            recording_url: event.record_url.as_deref(),
            started_at: event.started_at,
        },
    )
}

pub fn normalize_moizvonki(event: &MoiZvonkiCallEvent) -> Vec<CanonicalEvent> {
    normalize_call(
        Channel::MoiZvonki,
        CallFields {
            call_id: event.call_id.as_deref(),
            caller: event.client_number.as_deref(),
            duration: event.duration_sec,
            disposition: event.call_result.as_deref(),
            recording_url: event.record_link.as_deref(),
            started_at: event.call_time,
        },
    )
}

fn normalize_call(channel: Channel, fields: CallFields<'_>) -> Vec<CanonicalEvent> {
    let caller = match fields.caller {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => {
            warn!("{} call event has no caller number, skipping", channel);
            return Vec::new();
        }
    };

    let disposition = fields.disposition.unwrap_or("unknown");
    let duration = fields.duration.unwrap_or(0);

    let text = format!("[Call from {}: {} ({}s)]", caller, disposition, duration);

    let timestamp = fields
        .started_at
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .unwrap_or_else(Utc::now);

    vec![CanonicalEvent {
        channel,
        external_sender_id: caller,
        contact_name: None,
        kind: EventKind::Call,
        text,
        payload: serde_json::json!({
            "call_id": fields.call_id,
            "duration": duration,
            "disposition": disposition,
            "recording_url": fields.recording_url,
        }),
        vendor_message_id: fields.call_id.map(|id| format!("call-{}", id)),
        timestamp,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pbx_call() {
        let event: PbxCallEvent = serde_json::from_value(serde_json::json!({
            "uuid": "abc-123",
            "caller_id": "+79001234567",
            "duration": 42,
            "disposition": "answered",
            "recording": "https://pbx.example/rec/abc-123.mp3"
        }))
        .unwrap();

        let events = normalize_pbx(&event);
        assert_eq!(events.len(), 1);
        let ev = &events[0];
        assert_eq!(ev.channel, Channel::Pbx);
        assert_eq!(ev.kind, EventKind::Call);
        assert_eq!(ev.external_sender_id, "+79001234567");
        assert_eq!(ev.vendor_message_id.as_deref(), Some("call-abc-123"));
        assert_eq!(ev.payload["disposition"], "answered");
        assert_eq!(
            ev.payload["recording_url"],
            "https://pbx.example/rec/abc-123.mp3"
        );
    }

    #[test]
    fn test_normalize_utel_call() {
        let event: UtelCallEvent = serde_json::from_value(serde_json::json!({
            "call_id": "u-9",
            "phone": "+15550001",
            "duration": 0,
            "status": "missed"
        }))
        .unwrap();

        let events = normalize_utel(&event);
        assert_eq!(events[0].channel, Channel::Utel);
        assert!(events[0].text.contains("missed"));
        assert_eq!(events[0].payload["recording_url"], serde_json::Value::Null);
    }

    #[test]
    fn test_normalize_moizvonki_call() {
        let event: MoiZvonkiCallEvent = serde_json::from_value(serde_json::json!({
            "call_id": "mz-1",
            "client_number": "+15550002",
            "duration_sec": 95,
            "call_result": "success",
            "record_link": "https://moizvonki.example/r/mz-1"
        }))
        .unwrap();

        let events = normalize_moizvonki(&event);
        assert_eq!(events[0].channel, Channel::MoiZvonki);
        assert_eq!(events[0].external_sender_id, "+15550002");
    }

    #[test]
    fn test_call_without_caller_skipped() {
        let event: PbxCallEvent =
            serde_json::from_value(serde_json::json!({ "uuid": "no-caller" })).unwrap();
        assert!(normalize_pbx(&event).is_empty());
    }

    #[test]
    fn test_call_without_id_has_no_vendor_message_id() {
        let event: UtelCallEvent =
            serde_json::from_value(serde_json::json!({ "phone": "+1555" })).unwrap();
        let events = normalize_utel(&event);
        assert!(events[0].vendor_message_id.is_none());
    }
}
