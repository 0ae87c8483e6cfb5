//! Domain models for Rubriq.
//!
//! # Core Concepts
//!
//! - [`Assignment`]: A named set of [`Question`]s graded against one shared [`Rubric`].
//! - [`Submission`]: A student's answer to one question, unique per (student, question).
//! - [`EvaluationResult`]: Per-criterion marks and feedback for one submission.
//!   Results are append-only; the newest result for a (student, question) is current.
//! - [`LiveTest`]: A code students use to submit answers while the test is open.

mod assignment;
mod evaluation;
mod rubric;
mod submission;

pub use assignment::*;
pub use evaluation::*;
pub use live_test::*;
pub use rubric::*;
pub use submission::*;
