//! Shopping assistant client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. The route
//! layer adds store context; this module owns the prompt shape, the retry
//! on oversized payloads and the canned fallbacks.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::AssistantConfig;

const SYSTEM_PROMPT: &str = "You are Matrix Assistant for Matrix Commerce, a sports equipment \
marketplace. Be helpful, friendly, and concise. Focus on marketplace features, products, \
orders, and seller information.";

const MINIMAL_PROMPT: &str = "You are Matrix Assistant. Be brief.";

/// Turns of history forwarded with each request
pub const HISTORY_TURNS: usize = 5;

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const FALLBACK_OVERSIZED: &str = "I'm sorry, I'm having trouble processing your request \
right now. Could you try asking a simpler question or try again later?";

pub const FALLBACK_UNAVAILABLE: &str =
    "I'm sorry, I'm having trouble connecting to my knowledge base. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request too large for the model")]
    PayloadTooLarge,

    #[error("Completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Completion API returned no choices")]
    EmptyReply,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Store areas a question touches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Topics {
    pub products: bool,
    pub orders: bool,
    pub sellers: bool,
}

fn mentions(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Keyword match on the latest user message
pub fn detect_topics(message: &str) -> Topics {
    let text = message.to_lowercase();

    Topics {
        products: mentions(&text, &["product", "item", "buy", "purchase", "price"]),
        orders: mentions(&text, &["order", "shipping", "delivery", "track"]),
        sellers: mentions(&text, &["seller", "vendor", "sell"]),
    }
}

pub const ORDER_CONTEXT: &str = "Orders include an order number, the items bought, the \
shipping address, payment status and a tracking history. Orders can be tracked by number.";

pub const SELLER_CONTEXT: &str =
    "To become a seller: register, complete your profile, then submit a seller application for review.";

/// Content of the last user turn
pub fn latest_user_message(turns: &[ChatTurn]) -> Option<&str> {
    turns
        .iter()
        .rev()
        .find(|t| t.role == "user")
        .map(|t| t.content.as_str())
}

/// System prompt, optional context, then the last few turns
pub fn build_messages(context: &str, turns: &[ChatTurn]) -> Vec<ChatTurn> {
    let mut messages = vec![ChatTurn::new("system", SYSTEM_PROMPT)];

    if !context.is_empty() {
        messages.push(ChatTurn::new("system", format!("Context: {}", context)));
    }

    let start = turns.len().saturating_sub(HISTORY_TURNS);
    messages.extend(turns[start..].iter().cloned());
    messages
}

fn minimal_messages(user_message: &str) -> Vec<ChatTurn> {
    vec![
        ChatTurn::new("system", MINIMAL_PROMPT),
        ChatTurn::new("user", user_message),
    ]
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatTurn,
}

#[derive(Clone)]
pub struct AssistantClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for AssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantClient")
            .field("endpoint", &self.inner.endpoint)
            .field("model", &self.inner.model)
            .finish()
    }
}

impl AssistantClient {
    /// Builds a client, or None when the assistant is not configured
    pub fn from_config(config: &AssistantConfig) -> Result<Option<Self>, AssistantError> {
        let (Some(url), Some(key)) = (&config.api_url, &config.api_key) else {
            return Ok(None);
        };

        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Some(Self {
            inner: Arc::new(Inner {
                http,
                endpoint: format!("{}/chat/completions", url.trim_end_matches('/')),
                api_key: key.clone(),
                model: config.model.clone(),
            }),
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// One completion call
    #[instrument(skip(self, messages), fields(model = %self.inner.model, turns = messages.len()))]
    pub async fn complete(&self, messages: &[ChatTurn]) -> Result<String, AssistantError> {
        let request = CompletionRequest {
            model: &self.inner.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .bearer_auth(&self.inner.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE
                || body.to_lowercase().contains("too large")
            {
                return Err(AssistantError::PayloadTooLarge);
            }
            return Err(AssistantError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AssistantError::EmptyReply)
    }

    /// Answers the conversation, never failing
    ///
    /// An oversized request is retried once with only the latest question.
    /// Anything else falls back to a canned apology.
    pub async fn reply(&self, context: &str, turns: &[ChatTurn], user_message: &str) -> String {
        match self.complete(&build_messages(context, turns)).await {
            Ok(text) => text,
            Err(AssistantError::PayloadTooLarge) => {
                tracing::warn!("Assistant request too large, retrying with minimal context");
                match self.complete(&minimal_messages(user_message)).await {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Assistant retry failed");
                        FALLBACK_OVERSIZED.to_string()
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Assistant request failed");
                FALLBACK_UNAVAILABLE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, content: &str) -> ChatTurn {
        ChatTurn::new(role, content)
    }

    #[test]
    fn test_detect_topics() {
        let topics = detect_topics("What's the PRICE of running shoes and when will my order ship?");
        assert!(topics.products);
        assert!(topics.orders);
        assert!(!topics.sellers);

        assert_eq!(detect_topics("hello"), Topics::default());
        assert!(detect_topics("How do I start selling?").sellers);
    }

    #[test]
    fn test_latest_user_message() {
        let turns = vec![
            turn("user", "first"),
            turn("assistant", "hi"),
            turn("user", "second"),
            turn("assistant", "ok"),
        ];
        assert_eq!(latest_user_message(&turns), Some("second"));
        assert_eq!(latest_user_message(&[turn("assistant", "x")]), None);
    }

    #[test]
    fn test_build_messages_keeps_last_turns() {
        let turns: Vec<ChatTurn> = (0..8).map(|i| turn("user", &i.to_string())).collect();

        let messages = build_messages("Products: []", &turns);

        assert_eq!(messages.len(), 2 + HISTORY_TURNS);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "Context: Products: []");
        assert_eq!(messages[2].content, "3");
        assert_eq!(messages.last().unwrap().content, "7");

        let without_context = build_messages("", &turns[..2]);
        assert_eq!(without_context.len(), 3);
    }

    #[test]
    fn test_client_requires_url_and_key() {
        let mut config = AssistantConfig {
            api_url: Some("https://api.example.com/v1/".to_string()),
            api_key: None,
            model: "test-model".to_string(),
        };
        assert!(AssistantClient::from_config(&config).unwrap().is_none());

        config.api_key = Some("key".to_string());
        let client = AssistantClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_reply_falls_back_when_unreachable() {
        let config = AssistantConfig {
            api_url: Some("http://127.0.0.1:1".to_string()),
            api_key: Some("key".to_string()),
            model: "test-model".to_string(),
        };
        let client = AssistantClient::from_config(&config).unwrap().unwrap();

        let reply = client.reply("", &[turn("user", "hi")], "hi").await;
        assert_eq!(reply, FALLBACK_UNAVAILABLE);
    }
}
