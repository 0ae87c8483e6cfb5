//! Groq chat-completions client.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{prompt, response, Evaluator, GatewayError, GatewayEvaluation, MalformedResponse};
use crate::config::GatewayConfig;
use crate::models::{EvaluationMode, Rubric};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`Evaluator`] backed by the Groq API.
#[derive(Debug, Clone)]
pub struct GroqGateway {
    client: Client,
    config: GatewayConfig,
}

impl GroqGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Sends one chat completion and returns the reply text.
    ///
    /// The whole exchange, including reading the body, is bounded by the
    /// configured timeout.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        json: bool,
    ) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            response_format: json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.timeout, self.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.timeout)),
        };

        match &result {
            Ok(_) => tracing::debug!(
                model = %self.config.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "LLM call completed"
            ),
            Err(e) => tracing::warn!(
                model = %self.config.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "LLM call failed"
            ),
        }

        result
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| MalformedResponse::NotJson(format!("chat completion envelope: {}", e)))?;
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Evaluator for GroqGateway {
    async fn evaluate(
        &self,
        question: &str,
        rubric: &Rubric,
        answer: &str,
        mode: EvaluationMode,
    ) -> Result<GatewayEvaluation, GatewayError> {
        tracing::debug!(mode = mode.as_str(), criteria = rubric.len(), "Evaluating answer");
        let (system, user) = prompt::evaluation_messages(question, rubric, answer, mode);
        let reply = self
            .complete(&system, &user, prompt::temperature(mode), true)
            .await?;
        Ok(response::parse_evaluation(&reply, rubric)?)
    }

    async fn generate_rubric(&self, questions: &[String]) -> Result<Rubric, GatewayError> {
        let (system, user) = prompt::rubric_messages(questions);
        let reply = self
            .complete(&system, &user, prompt::temperature(EvaluationMode::Moderate), true)
            .await?;
        Ok(response::parse_rubric(&reply)?)
    }

    async fn generate_model_answer(
        &self,
        question: &str,
        rubric: &Rubric,
    ) -> Result<String, GatewayError> {
        let (system, user) = prompt::model_answer_messages(question, rubric);
        let reply = self
            .complete(&system, &user, prompt::temperature(EvaluationMode::Moderate), false)
            .await?;
        Ok(response::parse_text(&reply)?)
    }
}
