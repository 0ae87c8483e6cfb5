use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How strictly the evaluator grades.
///
/// - `Strict`: full marks only for complete answers, heavy deductions
/// - `Moderate`: proportional partial credit
/// - `Lenient`: generous partial credit for evident understanding
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    Strict,
    #[default]
    Moderate,
    Lenient,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
            Self::Lenient => "lenient",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "moderate" => Some(Self::Moderate),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

/// Performance bucket derived from a percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Good,
    Average,
    BelowAverage,
    Poor,
}

impl Grade {
    pub const ALL: [Grade; 5] = [
        Grade::Excellent,
        Grade::Good,
        Grade::Average,
        Grade::BelowAverage,
        Grade::Poor,
    ];

    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Self::Excellent
        } else if percentage >= 75.0 {
            Self::Good
        } else if percentage >= 60.0 {
            Self::Average
        } else if percentage >= 40.0 {
            Self::BelowAverage
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Average => "average",
            Self::BelowAverage => "below_average",
            Self::Poor => "poor",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Average => "Average",
            Self::BelowAverage => "Below Average",
            Self::Poor => "Poor",
        }
    }
}

/// Marks awarded for one rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub awarded: f64,
    pub max_marks: f64,
    #[serde(default)]
    pub reason: String,
}

/// A recorded evaluation of one student's answer to one question.
///
/// Results are never updated in place. Re-evaluating the same answer writes
/// a new result, and the newest one per (student, question) is current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_name: String,
    pub question_number: u32,
    pub scores: Vec<CriterionScore>,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub grade: Grade,
    pub feedback: Vec<String>,
    pub mode: EvaluationMode,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn score_for(&self, criterion: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.criterion == criterion)
            .map(|s| s.awarded)
    }
}

/// Input for recording an evaluation. Totals are computed by the store
/// against the assignment's rubric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub assignment_id: Uuid,
    pub student_name: String,
    pub question_number: u32,
    pub scores: Vec<CriterionScore>,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub mode: EvaluationMode,
}

/// A student's combined result across all evaluated questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentTotal {
    pub student_name: String,
    pub questions_evaluated: u32,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub grade: Grade,
}
