use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::GenerationOptions;
use super::RagError;

/// Chat-completion client abstraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, RagError>;

    fn model(&self) -> &str;
}

// ═══════════════════════════════════════════════════════════
// OpenAI-compatible `/chat/completions`
// ═══════════════════════════════════════════════════════════

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RagError::LlmConnection(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::LlmConnection(format!("Request timed out after {}s", self.timeout_secs))
                } else {
                    RagError::LlmConnection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::LlmProvider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(RagError::EmptyResponse)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ═══════════════════════════════════════════════════════════
// Mock client for tests
// ═══════════════════════════════════════════════════════════

/// Scripted LLM. Queued replies are served first, then the default reply.
/// Clones share the script and the prompt log.
#[derive(Clone)]
pub struct MockLlmClient {
    default_reply: Result<String, String>,
    queued: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            default_reply: Ok(response.to_string()),
            queued: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A client whose every call fails with a connection error.
    pub fn failing(message: &str) -> Self {
        Self {
            default_reply: Err(message.to_string()),
            ..Self::new("")
        }
    }

    pub fn then_reply(self, response: &str) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Ok(response.to_string()));
        }
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Err(message.to_string()));
        }
        self
    }

    /// User prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        _system: &str,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, RagError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let reply = self
            .queued
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default_reply.clone());
        reply.map_err(RagError::LlmConnection)
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_serves_queue_then_default() {
        let llm = MockLlmClient::new("default").then_reply("first").then_fail("down");
        let opts = GenerationOptions::default();

        assert_eq!(llm.complete("s", "a", &opts).await.unwrap(), "first");
        assert!(matches!(
            llm.complete("s", "b", &opts).await.unwrap_err(),
            RagError::LlmConnection(ref m) if m == "down"
        ));
        assert_eq!(llm.complete("s", "c", &opts).await.unwrap(), "default");
        assert_eq!(llm.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn clones_share_prompt_log() {
        let llm = MockLlmClient::new("ok");
        let handle = llm.clone();
        llm.complete("s", "hello", &GenerationOptions::default()).await.unwrap();
        assert_eq!(handle.prompts(), vec!["hello"]);
    }

    #[tokio::test]
    async fn failing_client_always_errors() {
        let llm = MockLlmClient::failing("no key");
        assert!(llm.complete("s", "p", &GenerationOptions::default()).await.is_err());
    }

    #[test]
    fn chat_request_omits_unset_options() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            max_tokens: None,
            temperature: Some(0.2),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn openai_client_trims_base_url() {
        let client = OpenAiClient::new("http://localhost:1234/v1/", "k", "gpt", 5).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/v1");
        assert_eq!(client.model(), "gpt");
    }
}
