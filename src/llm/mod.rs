use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        config: &Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// Chat-completions client for any OpenAI-compatible hosted endpoint.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(
        &self,
        prompt: &str,
        config: &Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let model = config
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("gpt-4o-mini");
        let max_tokens = config
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(500);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": max_tokens,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("LLM API error ({}): {}", status, body).into());
        }

        let result: Value = response.json().await?;
        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if content.is_empty() {
            return Err("LLM returned an empty completion".into());
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_ok() {
        crate::tests::test_util::setup();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant", "content": "Hello!"}}]}"#,
            )
            .create_async()
            .await;

        let client = OpenAIClient::new("test-key".to_string(), Some(server.url()));
        let reply = client
            .generate("say hello", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(reply, "Hello!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_http_error() {
        crate::tests::test_util::setup();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": "rate limited"}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("k".to_string(), Some(server.url()));
        let err = client
            .generate("hi", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_generate_empty_completion_is_error() {
        crate::tests::test_util::setup();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": ""}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("k".to_string(), Some(server.url()));
        assert!(client.generate("hi", &serde_json::json!({})).await.is_err());
    }
}
