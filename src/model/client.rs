//! Chat-completion client for OpenAI-compatible vision-language models.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ModelError {
    /// Transport failures, rate limits and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::RequestFailed(_) => true,
            ModelError::ApiError { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
            }
            ModelError::UnexpectedResponse(_) | ModelError::MaxRetriesExceeded { .. } => false,
        }
    }
}

/// Configuration for the model endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub timeout_secs: u64,
    /// Extra fields merged into the request body.
    pub extra_body: Map<String, Value>,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "ui-tars-1.5-7b".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
            seed: Some(1234),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            extra_body: Map::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl ModelConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between retry attempts in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Add a field to every request body.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_body.insert(key.into(), value);
        self
    }

    /// Chat-completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completion endpoint.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Request body for a message list.
    pub fn build_body(&self, messages: &[Value]) -> Value {
        let mut body = json!({
            "model": self.config.model_name,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": false,
        });

        if let Value::Object(ref mut map) = body {
            if let Some(seed) = self.config.seed {
                map.insert("seed".to_string(), json!(seed));
            }
            for (key, value) in &self.config.extra_body {
                map.insert(key.clone(), value.clone());
            }
        }
        body
    }

    /// Send messages and return the reply text, retrying transient failures.
    pub async fn request(&self, messages: &[Value]) -> Result<String, ModelError> {
        let url = self.config.endpoint();
        let body = self.build_body(messages);
        let max_attempts = self.config.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.send_request(&url, &body).await {
                Ok(content) => return Ok(content),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            "Model request failed (attempt {}/{}): {}. Retrying in {}s",
                            attempt,
                            max_attempts,
                            e,
                            self.config.retry_delay_secs
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ModelError::MaxRetriesExceeded {
            attempts: max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    async fn send_request(&self, url: &str, body: &Value) -> Result<String, ModelError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::UnexpectedResponse("no choices in response".to_string()))
    }
}

/// Builders for OpenAI multimodal messages.
pub struct MessageBuilder;

impl MessageBuilder {
    pub fn create_system_message(content: &str) -> Value {
        json!({
            "role": "system",
            "content": content
        })
    }

    pub fn create_user_text_message(text: &str) -> Value {
        json!({
            "role": "user",
            "content": [{ "type": "text", "text": text }]
        })
    }

    /// A user message carrying only a PNG screenshot.
    pub fn create_user_image_message(image_base64: &str) -> Value {
        json!({
            "role": "user",
            "content": [{
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{}", image_base64) }
            }]
        })
    }

    pub fn create_assistant_message(text: &str) -> Value {
        json!({
            "role": "assistant",
            "content": [{ "type": "text", "text": text }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let config = ModelConfig::default().with_base_url("http://host:9000/v1/");
        assert_eq!(config.endpoint(), "http://host:9000/v1/chat/completions");
    }

    #[test]
    fn test_build_body_merges_extra() {
        let config = ModelConfig::default()
            .with_model_name("tars")
            .with_extra("skip_special_tokens", json!(false))
            .with_extra("max_tokens", json!(512));
        let client = ModelClient::new(config);
        let body = client.build_body(&[MessageBuilder::create_user_text_message("hi")]);

        assert_eq!(body["model"], "tars");
        assert_eq!(body["stream"], false);
        assert_eq!(body["seed"], 1234);
        assert_eq!(body["skip_special_tokens"], false);
        // Extra fields win over defaults.
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["content"][0]["text"], "hi");
    }

    #[test]
    fn test_build_body_without_seed() {
        let mut config = ModelConfig::default();
        config.seed = None;
        let body = ModelClient::new(config).build_body(&[]);
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn test_retryable_errors() {
        let api = |status| ModelError::ApiError {
            status,
            body: String::new(),
        };
        assert!(api(429).is_retryable());
        assert!(api(503).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(!ModelError::UnexpectedResponse("x".into()).is_retryable());
    }

    #[test]
    fn test_message_builder() {
        let system_msg = MessageBuilder::create_system_message("You are an assistant");
        assert_eq!(system_msg["role"], "system");
        assert_eq!(system_msg["content"], "You are an assistant");

        let image_msg = MessageBuilder::create_user_image_message("abc");
        assert_eq!(image_msg["content"][0]["type"], "image_url");
        assert_eq!(
            image_msg["content"][0]["image_url"]["url"],
            "data:image/png;base64,abc"
        );
        assert_eq!(image_msg["content"].as_array().map(Vec::len), Some(1));

        let reply = MessageBuilder::create_assistant_message("Thought: x");
        assert_eq!(reply["role"], "assistant");
        assert_eq!(reply["content"][0]["text"], "Thought: x");
    }

    #[tokio::test]
    async fn test_request_unreachable_exhausts_retries() {
        let config = ModelConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .with_max_retries(1)
            .with_retry_delay(0)
            .with_timeout(2);
        let err = ModelClient::new(config)
            .request(&[MessageBuilder::create_user_text_message("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MaxRetriesExceeded { attempts: 2, .. }));
    }

    /// Serve `statuses` in order, then completions, and count the hits.
    async fn flaky_server(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        use axum::{extract::State, http::StatusCode, routing::post, Router};

        let hits = Arc::new(AtomicUsize::new(0));
        let state = (Arc::new(statuses), hits.clone());
        let router = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    |State((statuses, hits)): State<(Arc<Vec<u16>>, Arc<AtomicUsize>)>| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        match statuses.get(n) {
                            Some(&status) => (
                                StatusCode::from_u16(status).unwrap(),
                                "busy".to_string(),
                            ),
                            None => (
                                StatusCode::OK,
                                json!({"choices": [{"message": {"content": "Action: wait()"}}]})
                                    .to_string(),
                            ),
                        }
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        (base_url, hits)
    }

    #[tokio::test]
    async fn test_request_recovers_after_transient_errors() {
        let (base_url, hits) = flaky_server(vec![503, 429]).await;
        let config = ModelConfig::default()
            .with_base_url(base_url)
            .with_max_retries(2)
            .with_retry_delay(0);

        let reply = ModelClient::new(config)
            .request(&[MessageBuilder::create_user_text_message("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "Action: wait()");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_request_gives_up_after_retries() {
        let (base_url, hits) = flaky_server(vec![503, 503]).await;
        let config = ModelConfig::default()
            .with_base_url(base_url)
            .with_max_retries(1)
            .with_retry_delay(0);

        let err = ModelClient::new(config)
            .request(&[MessageBuilder::create_user_text_message("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MaxRetriesExceeded { attempts: 2, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
