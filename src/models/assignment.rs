use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rubric::Rubric;

/// A question of an assignment.
///
/// Questions are numbered from 1 in the order they were given. The number is
/// what submissions and CSV rows refer to; the rubric is the assignment's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub number: u32,
    pub text: String,
}

/// A named collection of questions graded against one shared rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub name: String,
    pub rubric: Rubric,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn question(&self, number: u32) -> Option<&Question> {
        self.questions.iter().find(|q| q.number == number)
    }

    /// Maximum marks across all questions.
    pub fn total_marks(&self) -> f64 {
        self.rubric.total() * self.questions.len() as f64
    }
}

/// Input for creating a new assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignmentInput {
    pub name: String,
    pub rubric: Rubric,
    /// Question texts, in order. They are numbered 1..=n.
    pub questions: Vec<String>,
}

/// Input for renaming an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameAssignmentInput {
    pub name: String,
}

/// List view of an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub id: Uuid,
    pub name: String,
    pub question_count: u32,
    pub marks_per_question: f64,
    pub total_marks: f64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over the current evaluations of an assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStatistics {
    pub total_evaluations: u32,
    pub avg_percentage: f64,
    pub min_percentage: f64,
    pub max_percentage: f64,
    pub avg_score: f64,
}

impl CreateAssignmentInput {
    /// Checks the name, the rubric and that every question has text.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::validation("name must not be blank"));
        }
        self.rubric.validate()?;
        if self.questions.is_empty() {
            return Err(crate::Error::validation(
                "questions must contain at least one question",
            ));
        }
        if let Some(i) = self.questions.iter().position(|q| q.trim().is_empty()) {
            return Err(crate::Error::validation(format!(
                "questions[{}] must not be blank",
                i
            )));
        }
        Ok(())
    }
}
