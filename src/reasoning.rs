// 🧠 Reasoning Service - Text-completion collaborator for the anomaly path
// A chat-completions style HTTP backend behind a narrow trait; the resolver
// only sees free text and must tolerate prose and code fences around it.

use crate::config::ReasoningConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reaching or reading the reasoning service
///
/// These never abort the cleaning pipeline; the resolver treats them as the
/// failed step's absence and continues best-effort.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("reasoning service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("reasoning service returned an empty response")]
    EmptyResponse,
}

// ============================================================================
// SERVICE CONTRACT
// ============================================================================

/// Text-completion interface: an instruction plus context in, free text out
pub trait ReasoningService {
    fn complete(&self, system: Option<&str>, user: &str) -> Result<String, ReasoningError>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Blocking chat-completions client with a bounded per-call timeout
pub struct HttpReasoningClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpReasoningClient {
    pub fn new(config: &ReasoningConfig) -> Result<Self, ReasoningError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HttpReasoningClient {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

impl ReasoningService for HttpReasoningClient {
    fn complete(&self, system: Option<&str>, user: &str) -> Result<String, ReasoningError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            // Deterministic output for data cleaning
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint);
        debug!(model = %self.model, "calling reasoning service");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            return Err(ReasoningError::Status(response.status()));
        }

        let parsed: ChatResponse = response.json()?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ReasoningError::EmptyResponse);
        }

        Ok(content)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "you clean addresses",
                },
                ChatMessage {
                    role: "user",
                    content: "fix this",
                },
            ],
            temperature: 0.0,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "fix this");
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "  hello  "}}
            ]
        }"#;

        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "  hello  ");
    }
}
