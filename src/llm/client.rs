use crate::config::LlmConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Free-text generation: prompt in, text out, explicit failure
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Collaborator name used in logs and errors
    fn name(&self) -> &str;
}

/// Retry schedule with multiplicative backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl From<&LlmConfig> for RetryPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

/// Chat client for an Ollama-compatible server
#[derive(Clone)]
pub struct OllamaClient {
    pub(crate) client: Client,
    chat_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Create a new client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            chat_url: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            retry: RetryPolicy::from(config),
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn post_once(&self, prompt: &str) -> Result<Value> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self.client.post(&self.chat_url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Network(format!(
                "text generation returned HTTP {}",
                status
            )));
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.post_once(prompt).await {
                Ok(body) => {
                    debug!(attempt, "Text generation succeeded");
                    return Ok(extract_text(&body));
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Text generation attempt failed");
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        Err(AppError::Collaborator {
            collaborator: self.name().to_string(),
            message: format!("failed after {} attempts: {}", max_attempts, last_error),
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Pull the generated text out of the response shapes servers return
pub fn extract_text(body: &Value) -> String {
    if let Some(message) = body.get("message") {
        return message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }
    if let Some(text) = body.get("response").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(choice) = body.get("choices").and_then(|c| c.get(0)) {
        if let Some(message) = choice.get("message") {
            return message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
        }
        return choice
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }
    body.to_string()
}
