//! Live test hosting.
//!
//! A live test gives students a short code to submit answers with. Tests
//! start open and close either on request or once `closes_at` passes; a
//! closed test never reopens. Expiry is applied lazily whenever a test is
//! read.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::csv_import;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::*;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_SUFFIX_LEN: usize = 4;
const MAX_CODE_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct TestRegistry {
    db: Database,
}

impl TestRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_test(
        &self,
        assignment_id: Uuid,
        closes_at: Option<DateTime<Utc>>,
    ) -> Result<LiveTest> {
        let now = Utc::now();
        if closes_at.is_some_and(|t| t <= now) {
            return Err(Error::validation("closes_at must be in the future"));
        }

        let code = self.unused_code(now)?;
        let test = LiveTest {
            code,
            assignment_id,
            status: TestStatus::Open,
            created_at: now,
            closes_at,
            closed_at: None,
        };
        self.db.insert_live_test(&test)?;

        tracing::info!(code = %test.code, assignment = %assignment_id, "Opened live test");
        Ok(test)
    }

    /// Looks up a test, closing it first if its scheduled time has passed.
    pub fn get_test(&self, code: &str) -> Result<LiveTest> {
        let code = normalize_code(code);
        let test = self
            .db
            .get_live_test(&code)?
            .ok_or_else(|| Error::not_found(format!("Test {}", code)))?;
        self.expire(test)
    }

    pub fn list_tests(&self) -> Result<Vec<LiveTest>> {
        self.db
            .list_live_tests()?
            .into_iter()
            .map(|t| self.expire(t))
            .collect()
    }

    /// Accepts one answer while the test is open.
    pub fn submit(&self, input: SubmitAnswerInput) -> Result<Submission> {
        let code = normalize_code(&input.code);
        let submission = self.db.add_test_submission(
            &code,
            StudentSubmission {
                student_name: input.student_name,
                question_number: input.question_id,
                answer_text: input.answer_text,
            },
            Utc::now(),
        )?;

        tracing::debug!(
            code = %code,
            student = %submission.student_name,
            question = submission.question_number,
            "Accepted submission"
        );
        Ok(submission)
    }

    /// Closes a test. Closing an already closed test returns it unchanged.
    pub fn close_test(&self, code: &str) -> Result<LiveTest> {
        let test = self.get_test(code)?;
        if !test.is_open() {
            return Ok(test);
        }

        self.db.close_live_test(&test.code, Utc::now())?;
        tracing::info!(code = %test.code, "Closed live test");
        self.get_test(&test.code)
    }

    pub fn submissions(&self, code: &str) -> Result<Vec<Submission>> {
        let test = self.get_test(code)?;
        self.db.list_test_submissions(&test.code)
    }

    /// What the student portal shows for a code.
    pub fn status(&self, code: &str) -> Result<TestStatusResponse> {
        let test = self.get_test(code)?;
        let assignment = self.db.load_assignment(test.assignment_id)?;

        let questions = if test.is_open() {
            assignment
                .questions
                .iter()
                .map(|q| PortalQuestion {
                    question_id: q.number,
                    text: q.text.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(TestStatusResponse {
            submission_count: self.db.count_test_submissions(&test.code)?,
            code: test.code,
            assignment_name: assignment.name,
            status: test.status,
            closes_at: test.closes_at,
            questions,
        })
    }

    /// The test's assignment and collected answers in the import CSV format.
    pub fn export_csv(&self, code: &str) -> Result<Vec<u8>> {
        let test = self.get_test(code)?;
        let assignment = self.db.load_assignment(test.assignment_id)?;
        let submissions = self.db.list_test_submissions(&test.code)?;
        csv_import::write_import_csv(&assignment, &StudentAnswers::group(&submissions))
    }

    fn expire(&self, test: LiveTest) -> Result<LiveTest> {
        let now = Utc::now();
        if !test.is_expired(now) {
            return Ok(test);
        }

        let closed_at = test.closes_at.unwrap_or(now);
        self.db.close_live_test(&test.code, closed_at)?;
        tracing::info!(code = %test.code, "Live test reached its closing time");
        Ok(LiveTest {
            status: TestStatus::Closed,
            closed_at: Some(closed_at),
            ..test
        })
    }

    fn unused_code(&self, now: DateTime<Utc>) -> Result<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_code(now.year());
            if !self.db.live_test_code_exists(&code)? {
                return Ok(code);
            }
            tracing::debug!(%code, "Test code collision, retrying");
        }
        Err(Error::Duplicate(
            "could not generate an unused test code".to_string(),
        ))
    }
}

/// A code of the form `TEST-2025-7K3Q`.
pub fn generate_code(year: i32) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("TEST-{}-{}", year, suffix)
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TestRegistry, Assignment) {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        let assignment = db
            .save_assignment(CreateAssignmentInput {
                name: "Biology quiz".into(),
                rubric: Rubric::new(vec![Criterion::new("Accuracy", 5.0)]),
                questions: vec!["What is osmosis?".into(), "What is a cell?".into()],
            })
            .unwrap();
        (TestRegistry::new(db), assignment)
    }

    fn answer(code: &str, student: &str, question: u32) -> SubmitAnswerInput {
        SubmitAnswerInput {
            code: code.to_string(),
            student_name: student.to_string(),
            question_id: question,
            answer_text: "Water moves across a membrane".to_string(),
        }
    }

    #[test]
    fn generated_codes_have_the_expected_shape() {
        let code = generate_code(2025);
        assert!(code.starts_with("TEST-2025-"));
        let suffix = &code["TEST-2025-".len()..];
        assert_eq!(suffix.len(), 4);
        assert!(suffix.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn new_test_is_open() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();
        assert!(test.is_open());
        assert_eq!(registry.get_test(&test.code).unwrap().status, TestStatus::Open);
    }

    #[test]
    fn code_lookup_ignores_case_and_whitespace() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();
        let lookup = format!("  {} ", test.code.to_lowercase());
        assert_eq!(registry.get_test(&lookup).unwrap().code, test.code);
    }

    #[test]
    fn unknown_assignment_cannot_host_a_test() {
        let (registry, _) = setup();
        assert!(matches!(
            registry.create_test(Uuid::new_v4(), None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn submission_after_close_is_rejected_and_earlier_ones_remain() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();

        registry.submit(answer(&test.code, "Ana", 1)).unwrap();
        let closed = registry.close_test(&test.code).unwrap();
        assert_eq!(closed.status, TestStatus::Closed);
        assert!(closed.closed_at.is_some());

        assert!(matches!(
            registry.submit(answer(&test.code, "Ben", 1)),
            Err(Error::Closed(_))
        ));
        assert_eq!(registry.submissions(&test.code).unwrap().len(), 1);
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();
        let first = registry.close_test(&test.code).unwrap();
        let second = registry.close_test(&test.code).unwrap();
        assert_eq!(first.closed_at, second.closed_at);
    }

    #[test]
    fn duplicate_and_unknown_question_are_rejected() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();

        registry.submit(answer(&test.code, "Ana", 1)).unwrap();
        assert!(matches!(
            registry.submit(answer(&test.code, "Ana", 1)),
            Err(Error::Duplicate(_))
        ));
        assert!(matches!(
            registry.submit(answer(&test.code, "Ana", 9)),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            registry.submit(answer(&test.code, "  ", 2)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn past_closing_time_is_rejected_at_creation() {
        let (registry, assignment) = setup();
        let past = Utc::now() - chrono::Duration::minutes(5);
        assert!(matches!(
            registry.create_test(assignment.id, Some(past)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn expired_test_closes_on_read() {
        let (registry, assignment) = setup();
        let test = LiveTest {
            code: "TEST-2020-AAAA".into(),
            assignment_id: assignment.id,
            status: TestStatus::Open,
            created_at: Utc::now() - chrono::Duration::hours(2),
            closes_at: Some(Utc::now() - chrono::Duration::hours(1)),
            closed_at: None,
        };
        registry.db.insert_live_test(&test).unwrap();

        let read = registry.get_test(&test.code).unwrap();
        assert_eq!(read.status, TestStatus::Closed);
        assert!(matches!(
            registry.submit(answer(&test.code, "Ana", 1)),
            Err(Error::Closed(_))
        ));
    }

    #[test]
    fn submission_after_close_is_rejected_without_a_row() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();
        registry.db.close_live_test(&test.code, Utc::now()).unwrap();

        let err = registry
            .db
            .add_test_submission(
                &test.code,
                StudentSubmission {
                    student_name: "Ana".into(),
                    question_number: 1,
                    answer_text: "Water moves across a membrane".into(),
                },
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Closed(_)));
        assert_eq!(registry.db.count_test_submissions(&test.code).unwrap(), 0);
    }

    #[test]
    fn submission_past_closing_time_closes_the_test() {
        let (registry, assignment) = setup();
        let closes_at = Utc::now() + chrono::Duration::minutes(5);
        let test = registry.create_test(assignment.id, Some(closes_at)).unwrap();

        let err = registry
            .db
            .add_test_submission(
                &test.code,
                StudentSubmission {
                    student_name: "Ana".into(),
                    question_number: 1,
                    answer_text: "Water moves across a membrane".into(),
                },
                closes_at + chrono::Duration::seconds(1),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Closed(_)));
        let stored = registry.db.get_live_test(&test.code).unwrap().unwrap();
        assert_eq!(stored.status, TestStatus::Closed);
        assert_eq!(stored.closed_at, Some(closes_at));
        assert_eq!(registry.db.count_test_submissions(&test.code).unwrap(), 0);
    }

    #[test]
    fn status_hides_questions_once_closed() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();
        registry.submit(answer(&test.code, "Ana", 2)).unwrap();

        let open = registry.status(&test.code).unwrap();
        assert_eq!(open.questions.len(), 2);
        assert_eq!(open.submission_count, 1);

        registry.close_test(&test.code).unwrap();
        let closed = registry.status(&test.code).unwrap();
        assert!(closed.questions.is_empty());
        assert_eq!(closed.submission_count, 1);
    }

    #[test]
    fn export_round_trips_through_the_import_format() {
        let (registry, assignment) = setup();
        let test = registry.create_test(assignment.id, None).unwrap();
        registry.submit(answer(&test.code, "Ana", 1)).unwrap();
        registry.submit(answer(&test.code, "Ben", 2)).unwrap();

        let csv = registry.export_csv(&test.code).unwrap();
        let parsed = csv_import::parse(std::str::from_utf8(&csv).unwrap()).unwrap();

        assert_eq!(parsed.questions.len(), 2);
        assert_eq!(parsed.rubric, assignment.rubric);
        let names: Vec<_> = parsed.students.iter().map(|s| s.student_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben"]);
    }
}
