//! Evaluation gateway.
//!
//! The [`Evaluator`] trait is the boundary to the external LLM. [`GroqGateway`]
//! implements it over the OpenAI-compatible chat-completions API; tests and
//! offline tools substitute their own implementation.
//!
//! Every response is parsed into typed records by [`response`]. Anything that
//! does not fit the rubric surfaces as [`GatewayError::Malformed`] with the
//! specific [`MalformedResponse`] reason, and marks are never clamped.

mod client;
pub mod prompt;
pub mod response;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CriterionScore, EvaluationMode, Rubric};

pub use client::GroqGateway;
pub use response::MalformedResponse;

/// Errors from a gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("LLM request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed LLM response: {0}")]
    Malformed(#[from] MalformedResponse),
}

impl GatewayError {
    /// Whether the same call could succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// A validated evaluation returned by the LLM.
///
/// `scores` holds one entry per rubric criterion, in rubric order, under the
/// rubric's own criterion names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvaluation {
    pub scores: Vec<CriterionScore>,
    pub feedback: Vec<String>,
    pub confidence: Option<String>,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Scores one answer against the rubric.
    async fn evaluate(
        &self,
        question: &str,
        rubric: &Rubric,
        answer: &str,
        mode: EvaluationMode,
    ) -> Result<GatewayEvaluation, GatewayError>;

    /// Proposes a rubric for a set of questions.
    async fn generate_rubric(&self, questions: &[String]) -> Result<Rubric, GatewayError>;

    /// Writes a full-marks reference answer.
    async fn generate_model_answer(
        &self,
        question: &str,
        rubric: &Rubric,
    ) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(GatewayError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(GatewayError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(GatewayError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!GatewayError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!GatewayError::Malformed(MalformedResponse::Empty).is_retryable());
    }
}
