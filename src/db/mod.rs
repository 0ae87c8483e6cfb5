mod schema;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::csv_import;
use crate::error::{Error, Result};
use crate::models::*;
use crate::scoring;

pub struct Database {
    conn: std::sync::Arc<std::sync::Mutex<Connection>>,
}

const EVALUATION_COLUMNS: &str = "id, assignment_id, student_name, question_number, scores, \
     total_score, max_score, percentage, feedback, mode, evaluated_at";

const SUBMISSION_COLUMNS: &str =
    "id, assignment_id, student_name, question_number, answer_text, test_code, submitted_at";

const LIVE_TEST_COLUMNS: &str = "code, assignment_id, status, created_at, closes_at, closed_at";

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "rubriq")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("rubriq.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: std::sync::Arc::new(std::sync::Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Assignment operations
    // ============================================================

    pub fn save_assignment(&self, input: CreateAssignmentInput) -> Result<Assignment> {
        input.validate()?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let assignment = insert_assignment(&tx, input)?;
        tx.commit()?;

        tracing::debug!(id = %assignment.id, name = %assignment.name, "Saved assignment");
        Ok(assignment)
    }

    /// Saves an assignment together with answers collected outside the app.
    /// Either everything is written or nothing is.
    pub fn import_assignment(
        &self,
        input: CreateAssignmentInput,
        answers: Vec<StudentSubmission>,
    ) -> Result<(Assignment, Vec<Submission>)> {
        input.validate()?;

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let assignment = insert_assignment(&tx, input)?;

        let mut submissions = Vec::with_capacity(answers.len());
        for answer in answers {
            submissions.push(insert_submission(&tx, &assignment, answer, None)?);
        }
        tx.commit()?;

        tracing::info!(
            id = %assignment.id,
            submissions = submissions.len(),
            "Imported assignment"
        );
        Ok((assignment, submissions))
    }

    pub fn get_assignment(&self, id: Uuid) -> Result<Option<Assignment>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        read_assignment(&conn, id)
    }

    pub fn load_assignment(&self, id: Uuid) -> Result<Assignment> {
        self.get_assignment(id)?
            .ok_or_else(|| Error::not_found(format!("Assignment {}", id)))
    }

    /// All assignments, newest first.
    pub fn list_assignments(&self) -> Result<Vec<AssignmentSummary>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, a.created_at,
                    (SELECT COUNT(*) FROM questions q WHERE q.assignment_id = a.id),
                    (SELECT COALESCE(SUM(c.max_marks), 0) FROM criteria c WHERE c.assignment_id = a.id)
             FROM assignments a ORDER BY a.created_at DESC, a.rowid DESC",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                let question_count: u32 = row.get(3)?;
                let marks_per_question: f64 = row.get(4)?;
                Ok(AssignmentSummary {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    question_count,
                    marks_per_question,
                    total_marks: marks_per_question * question_count as f64,
                    created_at: parse_datetime(row.get::<_, String>(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    pub fn rename_assignment(&self, id: Uuid, name: &str) -> Result<Assignment> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("name must not be blank"));
        }

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE assignments SET name = ?, updated_at = ? WHERE id = ?",
            (name, Utc::now().to_rfc3339(), id.to_string()),
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("Assignment {}", id)));
        }
        let assignment = read_assignment(&tx, id)?
            .ok_or_else(|| Error::not_found(format!("Assignment {}", id)))?;
        tx.commit()?;

        Ok(assignment)
    }

    /// Deletes an assignment with its questions, rubric, submissions,
    /// evaluations and live tests.
    pub fn delete_assignment(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM assignments WHERE id = ?", [id.to_string()])?;
        if rows == 0 {
            return Err(Error::not_found(format!("Assignment {}", id)));
        }
        tracing::info!(%id, "Deleted assignment");
        Ok(())
    }

    // ============================================================
    // Submission operations
    // ============================================================

    pub fn add_submission(
        &self,
        assignment_id: Uuid,
        answer: StudentSubmission,
        test_code: Option<&str>,
    ) -> Result<Submission> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let assignment = read_assignment(&tx, assignment_id)?
            .ok_or_else(|| Error::not_found(format!("Assignment {}", assignment_id)))?;
        let submission = insert_submission(&tx, &assignment, answer, test_code)?;
        tx.commit()?;

        Ok(submission)
    }

    /// Stores a live-test answer. The open check and the insert share one
    /// transaction, so a test closed concurrently never gains a submission.
    pub fn add_test_submission(
        &self,
        code: &str,
        answer: StudentSubmission,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let test = tx
            .query_row(
                &format!("SELECT {} FROM live_tests WHERE code = ?", LIVE_TEST_COLUMNS),
                [code],
                live_test_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found(format!("Test {}", code)))?;

        if test.is_expired(now) {
            tx.execute(
                "UPDATE live_tests SET status = 'closed', closed_at = ? WHERE code = ? AND status = 'open'",
                (test.closes_at.unwrap_or(now).to_rfc3339(), code),
            )?;
            tx.commit()?;
            return Err(Error::Closed(test.code));
        }
        if !test.is_open() {
            return Err(Error::Closed(test.code));
        }

        let assignment = read_assignment(&tx, test.assignment_id)?
            .ok_or_else(|| Error::not_found(format!("Assignment {}", test.assignment_id)))?;
        let submission = insert_submission(&tx, &assignment, answer, Some(&test.code))?;
        tx.commit()?;

        Ok(submission)
    }

    pub fn get_submission(
        &self,
        assignment_id: Uuid,
        student_name: &str,
        question_number: u32,
    ) -> Result<Option<Submission>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let submission = conn
            .query_row(
                &format!(
                    "SELECT {} FROM submissions
                     WHERE assignment_id = ? AND student_name = ? AND question_number = ?",
                    SUBMISSION_COLUMNS
                ),
                (assignment_id.to_string(), student_name, question_number),
                submission_from_row,
            )
            .optional()?;
        Ok(submission)
    }

    /// Submissions of an assignment in the order they arrived.
    pub fn list_submissions(&self, assignment_id: Uuid) -> Result<Vec<Submission>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM submissions WHERE assignment_id = ? ORDER BY rowid",
            SUBMISSION_COLUMNS
        ))?;
        let submissions = stmt
            .query_map([assignment_id.to_string()], submission_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(submissions)
    }

    pub fn list_test_submissions(&self, code: &str) -> Result<Vec<Submission>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM submissions WHERE test_code = ? ORDER BY rowid",
            SUBMISSION_COLUMNS
        ))?;
        let submissions = stmt
            .query_map([code], submission_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(submissions)
    }

    // ============================================================
    // Evaluation operations
    // ============================================================

    /// Records an evaluation. Totals are recomputed against the stored rubric;
    /// marks outside a criterion's range are rejected and nothing is written.
    pub fn record_evaluation(&self, input: NewEvaluation) -> Result<EvaluationResult> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        let assignment = read_assignment(&tx, input.assignment_id)?
            .ok_or_else(|| Error::not_found(format!("Assignment {}", input.assignment_id)))?;
        if assignment.question(input.question_number).is_none() {
            return Err(Error::not_found(format!(
                "Question {} of assignment {}",
                input.question_number, assignment.id
            )));
        }
        if input.student_name.trim().is_empty() {
            return Err(Error::validation("student_name must not be blank"));
        }

        let scores = canonical_scores(&assignment.rubric, &input.scores)?;
        let awarded: HashMap<String, f64> = scores
            .iter()
            .map(|s| (s.criterion.clone(), s.awarded))
            .collect();
        let summary = scoring::aggregate(&awarded, &assignment.rubric)?;

        let result = EvaluationResult {
            id: Uuid::new_v4(),
            assignment_id: assignment.id,
            student_name: input.student_name.trim().to_string(),
            question_number: input.question_number,
            scores,
            total_score: summary.total_score,
            max_score: summary.max_score,
            percentage: summary.percentage,
            grade: summary.grade,
            feedback: input.feedback,
            mode: input.mode,
            evaluated_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO evaluations (id, assignment_id, student_name, question_number, scores,
                 total_score, max_score, percentage, feedback, mode, evaluated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                result.id.to_string(),
                result.assignment_id.to_string(),
                &result.student_name,
                result.question_number,
                serde_json::to_string(&result.scores)?,
                result.total_score,
                result.max_score,
                result.percentage,
                serde_json::to_string(&result.feedback)?,
                result.mode.as_str(),
                result.evaluated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(
            student = %result.student_name,
            question = result.question_number,
            percentage = result.percentage,
            "Recorded evaluation"
        );
        Ok(result)
    }

    /// Current evaluations of an assignment: the newest one per
    /// (student, question), ordered by student then question.
    pub fn list_evaluations(&self, assignment_id: Uuid) -> Result<Vec<EvaluationResult>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        ensure_assignment(&conn, assignment_id)?;
        current_evaluations(&conn, assignment_id, None)
    }

    /// Current evaluations whose student name contains `fragment`, ignoring case.
    pub fn search_evaluations(
        &self,
        assignment_id: Uuid,
        fragment: &str,
    ) -> Result<Vec<EvaluationResult>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        ensure_assignment(&conn, assignment_id)?;
        current_evaluations(&conn, assignment_id, Some(fragment.trim()))
    }

    /// Every evaluation ever recorded for one answer, oldest first.
    pub fn evaluation_history(
        &self,
        assignment_id: Uuid,
        student_name: &str,
        question_number: u32,
    ) -> Result<Vec<EvaluationResult>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM evaluations
             WHERE assignment_id = ? AND student_name = ? AND question_number = ?
             ORDER BY rowid",
            EVALUATION_COLUMNS
        ))?;
        let history = stmt
            .query_map(
                (assignment_id.to_string(), student_name, question_number),
                evaluation_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(history)
    }

    pub fn assignment_statistics(&self, assignment_id: Uuid) -> Result<AssignmentStatistics> {
        let evaluations = self.list_evaluations(assignment_id)?;
        if evaluations.is_empty() {
            return Ok(AssignmentStatistics::default());
        }

        let count = evaluations.len() as f64;
        let percentages = evaluations.iter().map(|e| e.percentage);

        Ok(AssignmentStatistics {
            total_evaluations: evaluations.len() as u32,
            avg_percentage: scoring::round2(percentages.clone().sum::<f64>() / count),
            min_percentage: percentages.clone().fold(f64::INFINITY, f64::min),
            max_percentage: percentages.fold(f64::NEG_INFINITY, f64::max),
            avg_score: scoring::round2(
                evaluations.iter().map(|e| e.total_score).sum::<f64>() / count,
            ),
        })
    }

    /// Current evaluations as CSV, one row per (student, question).
    pub fn export_csv(&self, assignment_id: Uuid) -> Result<Vec<u8>> {
        let assignment = self.load_assignment(assignment_id)?;
        let evaluations = self.list_evaluations(assignment_id)?;
        csv_import::write_evaluations_csv(&assignment.rubric, &evaluations)
    }

    // ============================================================
    // Live test operations
    // ============================================================

    pub fn insert_live_test(&self, test: &LiveTest) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        ensure_assignment(&conn, test.assignment_id)?;
        conn.execute(
            &format!("INSERT INTO live_tests ({}) VALUES (?, ?, ?, ?, ?, ?)", LIVE_TEST_COLUMNS),
            (
                &test.code,
                test.assignment_id.to_string(),
                test.status.as_str(),
                test.created_at.to_rfc3339(),
                test.closes_at.map(|t| t.to_rfc3339()),
                test.closed_at.map(|t| t.to_rfc3339()),
            ),
        )?;
        Ok(())
    }

    pub fn get_live_test(&self, code: &str) -> Result<Option<LiveTest>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let test = conn
            .query_row(
                &format!("SELECT {} FROM live_tests WHERE code = ?", LIVE_TEST_COLUMNS),
                [code],
                live_test_from_row,
            )
            .optional()?;
        Ok(test)
    }

    pub fn list_live_tests(&self) -> Result<Vec<LiveTest>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM live_tests ORDER BY created_at DESC, rowid DESC",
            LIVE_TEST_COLUMNS
        ))?;
        let tests = stmt
            .query_map([], live_test_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    /// Marks an open test closed. Returns false if the test was not open.
    pub fn close_live_test(&self, code: &str, closed_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE live_tests SET status = 'closed', closed_at = ? WHERE code = ? AND status = 'open'",
            (closed_at.to_rfc3339(), code),
        )?;
        Ok(rows > 0)
    }

    pub fn live_test_code_exists(&self, code: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM live_tests WHERE code = ?",
            [code],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_test_submissions(&self, code: &str) -> Result<u32> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE test_code = ?",
            [code],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// ============================================================
// Row helpers
// ============================================================

fn insert_assignment(conn: &Connection, input: CreateAssignmentInput) -> Result<Assignment> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO assignments (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        (id.to_string(), input.name.trim(), now.to_rfc3339(), now.to_rfc3339()),
    )?;

    for (position, criterion) in input.rubric.criteria.iter().enumerate() {
        conn.execute(
            "INSERT INTO criteria (assignment_id, position, name, max_marks) VALUES (?, ?, ?, ?)",
            (id.to_string(), position as i64, criterion.name.trim(), criterion.max_marks),
        )?;
    }

    let mut questions = Vec::with_capacity(input.questions.len());
    for (i, text) in input.questions.into_iter().enumerate() {
        let question = Question {
            id: Uuid::new_v4(),
            number: i as u32 + 1,
            text: text.trim().to_string(),
        };
        conn.execute(
            "INSERT INTO questions (id, assignment_id, number, text) VALUES (?, ?, ?, ?)",
            (question.id.to_string(), id.to_string(), question.number, &question.text),
        )?;
        questions.push(question);
    }

    Ok(Assignment {
        id,
        name: input.name.trim().to_string(),
        rubric: Rubric::new(
            input
                .rubric
                .criteria
                .into_iter()
                .map(|c| Criterion::new(c.name.trim(), c.max_marks))
                .collect(),
        ),
        questions,
        created_at: now,
        updated_at: now,
    })
}

fn insert_submission(
    conn: &Connection,
    assignment: &Assignment,
    answer: StudentSubmission,
    test_code: Option<&str>,
) -> Result<Submission> {
    let student_name = answer.student_name.trim();
    if student_name.is_empty() {
        return Err(Error::validation("student_name must not be blank"));
    }
    if answer.answer_text.trim().is_empty() {
        return Err(Error::validation("answer_text must not be blank"));
    }
    if assignment.question(answer.question_number).is_none() {
        return Err(Error::not_found(format!(
            "Question {} of assignment {}",
            answer.question_number, assignment.name
        )));
    }

    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM submissions
         WHERE assignment_id = ? AND student_name = ? AND question_number = ?",
        (assignment.id.to_string(), student_name, answer.question_number),
        |row| row.get(0),
    )?;
    if exists > 0 {
        return Err(Error::Duplicate(format!(
            "{} already answered question {}",
            student_name, answer.question_number
        )));
    }

    let submission = Submission {
        id: Uuid::new_v4(),
        assignment_id: assignment.id,
        student_name: student_name.to_string(),
        question_number: answer.question_number,
        answer_text: answer.answer_text,
        test_code: test_code.map(str::to_string),
        submitted_at: Utc::now(),
    };

    conn.execute(
        &format!(
            "INSERT INTO submissions ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            SUBMISSION_COLUMNS
        ),
        (
            submission.id.to_string(),
            submission.assignment_id.to_string(),
            &submission.student_name,
            submission.question_number,
            &submission.answer_text,
            &submission.test_code,
            submission.submitted_at.to_rfc3339(),
        ),
    )?;

    Ok(submission)
}

fn read_assignment(conn: &Connection, id: Uuid) -> Result<Option<Assignment>> {
    let row = conn
        .query_row(
            "SELECT name, created_at, updated_at FROM assignments WHERE id = ?",
            [id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((name, created_at, updated_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT name, max_marks FROM criteria WHERE assignment_id = ? ORDER BY position",
    )?;
    let criteria = stmt
        .query_map([id.to_string()], |row| {
            Ok(Criterion::new(row.get::<_, String>(0)?, row.get(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, number, text FROM questions WHERE assignment_id = ? ORDER BY number",
    )?;
    let questions = stmt
        .query_map([id.to_string()], |row| {
            Ok(Question {
                id: parse_uuid(row.get::<_, String>(0)?),
                number: row.get(1)?,
                text: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(Assignment {
        id,
        name,
        rubric: Rubric::new(criteria),
        questions,
        created_at: parse_datetime(created_at),
        updated_at: parse_datetime(updated_at),
    }))
}

fn ensure_assignment(conn: &Connection, id: Uuid) -> Result<()> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM assignments WHERE id = ?",
        [id.to_string()],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(Error::not_found(format!("Assignment {}", id)));
    }
    Ok(())
}

fn current_evaluations(
    conn: &Connection,
    assignment_id: Uuid,
    name_fragment: Option<&str>,
) -> Result<Vec<EvaluationResult>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM evaluations e
         WHERE e.assignment_id = ?1
           AND e.rowid = (SELECT MAX(rowid) FROM evaluations
                          WHERE assignment_id = e.assignment_id
                            AND student_name = e.student_name
                            AND question_number = e.question_number)
           AND (?2 IS NULL OR instr(lower(e.student_name), lower(?2)) > 0)
         ORDER BY e.student_name COLLATE NOCASE, e.question_number",
        EVALUATION_COLUMNS
    ))?;
    let evaluations = stmt
        .query_map((assignment_id.to_string(), name_fragment), evaluation_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(evaluations)
}

/// Maps raw scores onto the rubric's canonical criterion names, in rubric
/// order. Unknown or repeated criteria are rejected.
fn canonical_scores(rubric: &Rubric, scores: &[CriterionScore]) -> Result<Vec<CriterionScore>> {
    let mut by_name: HashMap<String, &CriterionScore> = HashMap::new();
    for score in scores {
        let criterion = rubric.find(&score.criterion).ok_or_else(|| {
            Error::validation(format!("criterion '{}' is not in the rubric", score.criterion))
        })?;
        if by_name.insert(criterion.name.clone(), score).is_some() {
            return Err(Error::validation(format!(
                "criterion '{}' is scored more than once",
                criterion.name
            )));
        }
    }

    Ok(rubric
        .criteria
        .iter()
        .filter_map(|c| {
            by_name.get(&c.name).map(|s| CriterionScore {
                criterion: c.name.clone(),
                awarded: s.awarded,
                max_marks: c.max_marks,
                reason: s.reason.clone(),
            })
        })
        .collect())
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn evaluation_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationResult> {
    let scores: Vec<CriterionScore> = json_column(row, 4)?;
    let feedback: Vec<String> = json_column(row, 8)?;
    let percentage: f64 = row.get(7)?;

    Ok(EvaluationResult {
        id: parse_uuid(row.get::<_, String>(0)?),
        assignment_id: parse_uuid(row.get::<_, String>(1)?),
        student_name: row.get(2)?,
        question_number: row.get(3)?,
        scores,
        total_score: row.get(5)?,
        max_score: row.get(6)?,
        percentage,
        grade: Grade::from_percentage(percentage),
        feedback,
        mode: EvaluationMode::from_str(&row.get::<_, String>(9)?).unwrap_or_default(),
        evaluated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: parse_uuid(row.get::<_, String>(0)?),
        assignment_id: parse_uuid(row.get::<_, String>(1)?),
        student_name: row.get(2)?,
        question_number: row.get(3)?,
        answer_text: row.get(4)?,
        test_code: row.get(5)?,
        submitted_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn live_test_from_row(row: &Row<'_>) -> rusqlite::Result<LiveTest> {
    Ok(LiveTest {
        code: row.get(0)?,
        assignment_id: parse_uuid(row.get::<_, String>(1)?),
        status: TestStatus::from_str(&row.get::<_, String>(2)?).unwrap_or(TestStatus::Closed),
        created_at: parse_datetime(row.get::<_, String>(3)?),
        closes_at: row.get::<_, Option<String>>(4)?.map(parse_datetime),
        closed_at: row.get::<_, Option<String>>(5)?.map(parse_datetime),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
