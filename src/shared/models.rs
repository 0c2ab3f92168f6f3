use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod schema {
    diesel::table! {
        businesses (id) {
            id -> Uuid,
            name -> Text,
            settings -> Jsonb,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        channel_configs (id) {
            id -> Uuid,
            business_id -> Uuid,
            channel -> Text,
            enabled -> Bool,
            access_token -> Nullable<Text>,
            verify_token -> Nullable<Text>,
            webhook_secret -> Nullable<Text>,
            ai_enabled -> Bool,
            greeting -> Nullable<Text>,
            fallback -> Nullable<Text>,
            business_hours -> Nullable<Text>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        chatbot_templates (id) {
            id -> Uuid,
            business_id -> Uuid,
            channel -> Text,
            trigger -> Text,
            response -> Text,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        conversations (id) {
            id -> Uuid,
            business_id -> Uuid,
            channel -> Text,
            external_id -> Text,
            contact_name -> Nullable<Text>,
            status -> Text,
            unread_count -> Int4,
            last_message_preview -> Nullable<Text>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        messages (id) {
            id -> Uuid,
            business_id -> Uuid,
            conversation_id -> Uuid,
            channel -> Text,
            direction -> Text,
            kind -> Text,
            body -> Text,
            payload -> Jsonb,
            vendor_message_id -> Nullable<Text>,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        leads (id) {
            id -> Uuid,
            business_id -> Uuid,
            conversation_id -> Nullable<Uuid>,
            name -> Text,
            external_id -> Nullable<Text>,
            channel -> Nullable<Text>,
            status -> Text,
            score -> Int4,
            estimated_value -> Nullable<Float8>,
            source -> Nullable<Text>,
            first_contact_at -> Nullable<Timestamptz>,
            converted_at -> Nullable<Timestamptz>,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        activity_log (id) {
            id -> Uuid,
            business_id -> Uuid,
            user_id -> Nullable<Uuid>,
            action -> Text,
            detail -> Jsonb,
            created_at -> Timestamptz,
        }
    }

    diesel::table! {
        notifications (id) {
            id -> Uuid,
            business_id -> Uuid,
            user_id -> Nullable<Uuid>,
            kind -> Text,
            title -> Text,
            body -> Text,
            read -> Bool,
            created_at -> Timestamptz,
        }
    }
}

use schema::*;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = businesses)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = channel_configs)]
#[diesel(treat_none_as_null = true)]
pub struct ChannelConfig {
    pub id: Uuid,
    pub business_id: Uuid,
    pub channel: String,
    pub enabled: bool,
    pub access_token: Option<String>,
    pub verify_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub ai_enabled: bool,
    pub greeting: Option<String>,
    pub fallback: Option<String>,
    pub business_hours: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = chatbot_templates)]
pub struct ChatbotTemplate {
    pub id: Uuid,
    pub business_id: Uuid,
    pub channel: String,
    pub trigger: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub business_id: Uuid,
    pub channel: String,
    pub external_id: String,
    pub contact_name: Option<String>,
    pub status: String,
    pub unread_count: i32,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub business_id: Uuid,
    pub conversation_id: Uuid,
    pub channel: String,
    pub direction: String,
    pub kind: String,
    pub body: String,
    pub payload: serde_json::Value,
    pub vendor_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: Uuid,
    pub business_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub name: String,
    pub external_id: Option<String>,
    pub channel: Option<String>,
    pub status: String,
    pub score: i32,
    pub estimated_value: Option<f64>,
    pub source: Option<String>,
    pub first_contact_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = activity_log)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Option<Uuid>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Message direction values stored in `messages.direction`.
pub const DIRECTION_IN: &str = "in";
pub const DIRECTION_OUT: &str = "out";
