use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A student's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSubmission {
    pub student_name: String,
    pub question_number: u32,
    pub answer_text: String,
}

/// A submission as stored, keyed by (assignment, student, question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_name: String,
    pub question_number: u32,
    pub answer_text: String,
    /// Live test the answer came in through, if any.
    pub test_code: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// One student's answers, keyed by question number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnswers {
    pub student_name: String,
    pub answers: Vec<(u32, String)>,
}

impl StudentAnswers {
    pub fn answer(&self, question_number: u32) -> Option<&str> {
        self.answers
            .iter()
            .find(|(n, _)| *n == question_number)
            .map(|(_, a)| a.as_str())
    }

    /// Groups flat submissions by student, keeping first-seen student order.
    pub fn group(submissions: &[Submission]) -> Vec<StudentAnswers> {
        let mut grouped: Vec<StudentAnswers> = Vec::new();
        for s in submissions {
            match grouped.iter_mut().find(|g| g.student_name == s.student_name) {
                Some(g) => g.answers.push((s.question_number, s.answer_text.clone())),
                None => grouped.push(StudentAnswers {
                    student_name: s.student_name.clone(),
                    answers: vec![(s.question_number, s.answer_text.clone())],
                }),
            }
        }
        for g in &mut grouped {
            g.answers.sort_by_key(|(n, _)| *n);
        }
        grouped
    }
}

/// Evaluation state of one (student, question) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EvaluationState {
    Pending,
    Evaluated {
        evaluation_id: Uuid,
        percentage: f64,
        evaluated_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub student_name: String,
    pub question_number: u32,
    #[serde(flatten)]
    pub state: EvaluationState,
}
