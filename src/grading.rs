//! Assignment manager: builds assignments and drives their evaluation.
//!
//! The manager owns no state of its own beyond its collaborators. The store
//! and the evaluator are injected, so the same manager runs against SQLite
//! and Groq in production and an in-memory database with a scripted
//! evaluator in tests.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::csv_import;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::gateway::Evaluator;
use crate::models::*;
use crate::scoring;

/// Result of a CSV import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub assignment: Assignment,
    pub students: u32,
    pub submissions: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default)]
    pub mode: EvaluationMode,
    /// Evaluate answers that already have a current evaluation as well.
    #[serde(default)]
    pub reevaluate: bool,
}

/// One answer the batch could not evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub student_name: String,
    pub question_number: u32,
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub evaluated: Vec<EvaluationResult>,
    pub skipped: u32,
    pub failures: Vec<BatchFailure>,
    /// Totals per student over all current evaluations after the batch.
    pub student_totals: Vec<StudentTotal>,
}

/// Imports an assignment CSV without going through an evaluator.
pub fn import_csv(db: &Database, content: &str, name: &str) -> Result<ImportOutcome> {
    let parsed = csv_import::parse(content)?;
    let submissions = parsed.submissions();
    let input = CreateAssignmentInput {
        name: name.to_string(),
        rubric: parsed.rubric,
        questions: parsed.questions,
    };
    let (assignment, stored) = db.import_assignment(input, submissions)?;
    Ok(ImportOutcome {
        assignment,
        students: parsed.students.len() as u32,
        submissions: stored.len() as u32,
    })
}

#[derive(Clone)]
pub struct AssignmentManager {
    db: Database,
    evaluator: Arc<dyn Evaluator>,
}

impl AssignmentManager {
    pub fn new(db: Database, evaluator: Arc<dyn Evaluator>) -> Self {
        Self { db, evaluator }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // ============================================================
    // Assignment lifecycle
    // ============================================================

    pub fn create_assignment(&self, input: CreateAssignmentInput) -> Result<Assignment> {
        input.validate()?;
        let assignment = self.db.save_assignment(input)?;
        tracing::info!(id = %assignment.id, name = %assignment.name, "Created assignment");
        Ok(assignment)
    }

    /// Parses an assignment CSV and stores it with its answers in one step.
    pub fn import_csv(&self, content: &str, name: &str) -> Result<ImportOutcome> {
        import_csv(&self.db, content, name)
    }

    pub fn load_assignment(&self, id: Uuid) -> Result<Assignment> {
        self.db.load_assignment(id)
    }

    pub fn list_assignments(&self) -> Result<Vec<AssignmentSummary>> {
        self.db.list_assignments()
    }

    pub fn rename_assignment(&self, id: Uuid, name: &str) -> Result<Assignment> {
        self.db.rename_assignment(id, name)
    }

    pub fn delete_assignment(&self, id: Uuid) -> Result<()> {
        self.db.delete_assignment(id)
    }

    // ============================================================
    // Evaluation
    // ============================================================

    /// Evaluates a stored answer and records the result.
    pub async fn evaluate_submission(
        &self,
        assignment_id: Uuid,
        student_name: &str,
        question_number: u32,
        mode: EvaluationMode,
    ) -> Result<EvaluationResult> {
        let assignment = self.db.load_assignment(assignment_id)?;
        let submission = self
            .db
            .get_submission(assignment_id, student_name.trim(), question_number)?
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Answer from {} to question {}",
                    student_name, question_number
                ))
            })?;
        self.evaluate_stored(&assignment, &submission, mode).await
    }

    /// Stores a new answer, then evaluates it.
    pub async fn evaluate_answer(
        &self,
        assignment_id: Uuid,
        question_number: u32,
        student_name: &str,
        answer_text: &str,
        mode: EvaluationMode,
    ) -> Result<EvaluationResult> {
        let assignment = self.db.load_assignment(assignment_id)?;
        let submission = self.db.add_submission(
            assignment_id,
            StudentSubmission {
                student_name: student_name.to_string(),
                question_number,
                answer_text: answer_text.to_string(),
            },
            None,
        )?;
        self.evaluate_stored(&assignment, &submission, mode).await
    }

    /// Evaluates every pending answer of an assignment, or every answer when
    /// `reevaluate` is set. A failing answer is reported and skipped; it
    /// never stops the rest of the batch.
    pub async fn evaluate_all(
        &self,
        assignment_id: Uuid,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        let assignment = self.db.load_assignment(assignment_id)?;
        let submissions = self.db.list_submissions(assignment_id)?;
        let current = self.current_keys(assignment_id)?;

        let mut evaluated = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = 0;

        for submission in &submissions {
            let key = (submission.student_name.clone(), submission.question_number);
            if !options.reevaluate && current.contains_key(&key) {
                skipped += 1;
                continue;
            }

            match self.evaluate_stored(&assignment, submission, options.mode).await {
                Ok(result) => evaluated.push(result),
                Err(e) => {
                    tracing::warn!(
                        student = %submission.student_name,
                        question = submission.question_number,
                        error = %e,
                        "Evaluation failed, continuing batch"
                    );
                    failures.push(batch_failure(submission, &e));
                }
            }
        }

        tracing::info!(
            assignment = %assignment.id,
            evaluated = evaluated.len(),
            failed = failures.len(),
            skipped,
            "Batch evaluation finished"
        );

        let student_totals = scoring::combine(&self.db.list_evaluations(assignment_id)?);
        Ok(BatchReport {
            evaluated,
            skipped,
            failures,
            student_totals,
        })
    }

    /// Evaluation state of every stored answer, in submission order.
    pub fn evaluation_status(&self, assignment_id: Uuid) -> Result<Vec<SubmissionStatus>> {
        let submissions = self.db.list_submissions(assignment_id)?;
        let current = self.current_keys(assignment_id)?;

        Ok(submissions
            .into_iter()
            .map(|s| {
                let state = match current.get(&(s.student_name.clone(), s.question_number)) {
                    Some(result) => EvaluationState::Evaluated {
                        evaluation_id: result.id,
                        percentage: result.percentage,
                        evaluated_at: result.evaluated_at,
                    },
                    None => EvaluationState::Pending,
                };
                SubmissionStatus {
                    student_name: s.student_name,
                    question_number: s.question_number,
                    state,
                }
            })
            .collect())
    }

    pub fn student_totals(&self, assignment_id: Uuid) -> Result<Vec<StudentTotal>> {
        Ok(scoring::combine(&self.db.list_evaluations(assignment_id)?))
    }

    // ============================================================
    // Generation helpers
    // ============================================================

    pub async fn suggest_rubric(&self, questions: &[String]) -> Result<Rubric> {
        if questions.iter().all(|q| q.trim().is_empty()) {
            return Err(Error::validation("questions must contain at least one question"));
        }
        Ok(self.evaluator.generate_rubric(questions).await?)
    }

    pub async fn model_answer(&self, assignment_id: Uuid, question_number: u32) -> Result<String> {
        let assignment = self.db.load_assignment(assignment_id)?;
        let question = assignment.question(question_number).ok_or_else(|| {
            Error::not_found(format!(
                "Question {} of assignment {}",
                question_number, assignment.name
            ))
        })?;
        Ok(self
            .evaluator
            .generate_model_answer(&question.text, &assignment.rubric)
            .await?)
    }

    async fn evaluate_stored(
        &self,
        assignment: &Assignment,
        submission: &Submission,
        mode: EvaluationMode,
    ) -> Result<EvaluationResult> {
        let question = assignment.question(submission.question_number).ok_or_else(|| {
            Error::not_found(format!(
                "Question {} of assignment {}",
                submission.question_number, assignment.name
            ))
        })?;

        let evaluation = self
            .evaluator
            .evaluate(&question.text, &assignment.rubric, &submission.answer_text, mode)
            .await?;

        self.db.record_evaluation(NewEvaluation {
            assignment_id: assignment.id,
            student_name: submission.student_name.clone(),
            question_number: submission.question_number,
            scores: evaluation.scores,
            feedback: evaluation.feedback,
            mode,
        })
    }

    fn current_keys(&self, assignment_id: Uuid) -> Result<HashMap<(String, u32), EvaluationResult>> {
        Ok(self
            .db
            .list_evaluations(assignment_id)?
            .into_iter()
            .map(|e| ((e.student_name.clone(), e.question_number), e))
            .collect())
    }
}

fn batch_failure(submission: &Submission, error: &Error) -> BatchFailure {
    let (kind, retryable) = match error {
        Error::Gateway(e) => (e.kind(), e.is_retryable()),
        Error::Validation(_) => ("validation", false),
        Error::NotFound(_) => ("not_found", false),
        _ => ("internal", false),
    };
    BatchFailure {
        student_name: submission.student_name.clone(),
        question_number: submission.question_number,
        kind: kind.to_string(),
        message: error.to_string(),
        retryable,
    }
}
