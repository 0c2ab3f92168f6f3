use axum::http::StatusCode;
use axum::Json;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::PgConnection;
use serde_json::{json, Value};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

pub fn create_conn() -> Result<DbPool, anyhow::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://opsuser:@localhost:5432/opsserver".to_string());
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))
}

/// JSON error envelope used by every handler: `{"success": false, "error": ...}`.
pub fn api_error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "success": false, "error": message })),
    )
}

pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_preview_short() {
        assert_eq!(truncate_preview("hello", 80), "hello");
    }

    #[test]
    fn test_truncate_preview_long() {
        let long = "a".repeat(100);
        let preview = truncate_preview(&long, 80);
        assert_eq!(preview.chars().count(), 81);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_truncate_preview_multibyte() {
        let text = "привет, как дела? это длинное сообщение";
        let preview = truncate_preview(text, 10);
        assert!(preview.starts_with("привет"));
    }
}
