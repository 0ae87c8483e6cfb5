#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rubriq::gateway::{Evaluator, GatewayError, GatewayEvaluation, MalformedResponse};
use rubriq::models::{Criterion, CriterionScore, EvaluationMode, Rubric};

pub const ASSIGNMENT_CSV: &str = "\
CRITERIA,TOTAL MARKS
Understanding,5
Accuracy,5

QUESTIONS
1,What is photosynthesis?
2,Name the pigment that absorbs light.

STUDENTS
Ana,Plants turn light water and carbon dioxide into glucose,Chlorophyll
Ben,Plants eat soil,TIMEOUT
";

/// Evaluator that never leaves the process.
///
/// Awards 80% of every criterion in moderate mode, 100% in lenient mode and
/// 40% in strict mode. Answers containing `TIMEOUT` or `GARBAGE` fail with
/// the matching gateway error.
#[derive(Default)]
pub struct ScriptedEvaluator {
    pub calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _question: &str,
        rubric: &Rubric,
        answer: &str,
        mode: EvaluationMode,
    ) -> Result<GatewayEvaluation, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if answer.contains("TIMEOUT") {
            return Err(GatewayError::Timeout(Duration::from_secs(60)));
        }
        if answer.contains("GARBAGE") {
            return Err(GatewayError::Malformed(MalformedResponse::NotJson(
                "not json".to_string(),
            )));
        }

        let share = match mode {
            EvaluationMode::Strict => 0.4,
            EvaluationMode::Moderate => 0.8,
            EvaluationMode::Lenient => 1.0,
        };

        Ok(GatewayEvaluation {
            scores: rubric
                .criteria
                .iter()
                .map(|c| CriterionScore {
                    criterion: c.name.clone(),
                    awarded: c.max_marks * share,
                    max_marks: c.max_marks,
                    reason: format!("{} looks fine", c.name),
                })
                .collect(),
            feedback: vec!["Mention the role of chlorophyll".to_string()],
            confidence: Some("high".to_string()),
        })
    }

    async fn generate_rubric(&self, questions: &[String]) -> Result<Rubric, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Rubric::new(vec![
            Criterion::new("Understanding", 2.0 * questions.len() as f64),
            Criterion::new("Clarity", 2.0),
        ]))
    }

    async fn generate_model_answer(
        &self,
        question: &str,
        _rubric: &Rubric,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Model answer: {}", question))
    }
}
