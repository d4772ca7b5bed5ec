//! OpenAI-compatible LLM client for the answer-generation step.
//!
//! Answer generation is an external collaborator from the harness's point of
//! view: the harness hands it a question plus retrieved contexts and gets an
//! answer string back. Works with any OpenAI-compatible endpoint.

use crate::config::LlmConfig;
use crate::error::{RankfuseError, Result};
use crate::retry::{retryable_status, with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Seam for the answer-generation step, so the harness can run against any
/// generator (or a canned one in tests).
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce an answer to `question` grounded in `contexts`.
    async fn answer(&self, question: &str, contexts: &[String]) -> Result<String>;
}

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Prompt template for answering from retrieved contexts.
const RAG_ANSWER_PROMPT: &str = r#"Answer the question using ONLY the provided context passages.
If the context does not contain enough information, say so explicitly.

Question: {question}

Context:
{context}

Answer concisely."#;

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            retry: RetryPolicy::default(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    async fn chat_once(&self, messages: &[Message]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            if retryable_status(status) {
                return Err(RankfuseError::Http(format!(
                    "LLM API error ({}): {}",
                    status, detail
                )));
            }
            return Err(RankfuseError::LlmApi(format!(
                "LLM API error ({}): {}",
                status, detail
            )));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RankfuseError::LlmApi("No choices in response".to_string()))
    }

    /// Send a chat completion request, retrying transient failures.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        with_retry(&self.retry, "llm", || self.chat_once(&messages)).await
    }

    /// Convenience method: single user message with optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));
        self.chat(messages).await
    }

    /// Generate an answer to `question` from retrieved context passages.
    pub async fn generate_answer(&self, question: &str, contexts: &[String]) -> Result<String> {
        let prompt = RAG_ANSWER_PROMPT
            .replace("{question}", question)
            .replace("{context}", &contexts.join("\n\n---\n\n"));

        let answer = self.complete(None, &prompt).await?;
        Ok(answer.trim().to_string())
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let response = self
            .chat(vec![Message::user("Say 'hello' and nothing else.")])
            .await?;

        if response.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(RankfuseError::LlmApi(format!(
                "Unexpected response: {}",
                response
            )))
        }
    }
}

#[async_trait]
impl AnswerGenerator for LlmClient {
    async fn answer(&self, question: &str, contexts: &[String]) -> Result<String> {
        self.generate_answer(question, contexts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_construction() {
        let config = LlmConfig {
            api_base: "https://api.example.com/".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4o-mini".to_string(),
            ..Default::default()
        };
        let client = LlmClient::new(config);
        assert_eq!(
            client.endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_rag_prompt_substitution() {
        let prompt = RAG_ANSWER_PROMPT
            .replace("{question}", "What is churn?")
            .replace("{context}", "passage one");
        assert!(prompt.contains("What is churn?"));
        assert!(prompt.contains("passage one"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::system("hi")).unwrap();
        assert!(json.contains("\"system\""));
    }
}
