//! Score aggregation.
//!
//! Everything here is pure: the same marks and rubric always produce the same
//! summary, and nothing is clamped. A mark outside its criterion's range is a
//! [`Error::Validation`], never silently corrected.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{EvaluationResult, Grade, Rubric, StudentTotal};

/// Totals for one evaluated answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub grade: Grade,
}

/// Aggregates per-criterion marks against a rubric.
///
/// `awarded` may cover a subset of the rubric; criteria without an entry
/// contribute nothing to the total but still count towards the maximum.
pub fn aggregate(awarded: &HashMap<String, f64>, rubric: &Rubric) -> Result<ScoreSummary> {
    if rubric.is_empty() {
        return Err(Error::validation("rubric has no criteria"));
    }

    let mut seen = HashSet::new();
    let mut total = 0.0;
    for (name, &marks) in awarded {
        let criterion = rubric
            .find(name)
            .ok_or_else(|| Error::validation(format!("criterion '{}' is not in the rubric", name)))?;
        if !seen.insert(criterion.name.as_str()) {
            return Err(Error::validation(format!(
                "criterion '{}' is scored more than once",
                criterion.name
            )));
        }

        if !marks.is_finite() || marks < 0.0 {
            return Err(Error::validation(format!(
                "criterion '{}' awarded {} marks, expected a value between 0 and {}",
                criterion.name, marks, criterion.max_marks
            )));
        }
        if marks > criterion.max_marks {
            return Err(Error::validation(format!(
                "criterion '{}' awarded {} marks, exceeds maximum of {}",
                criterion.name, marks, criterion.max_marks
            )));
        }
        total += marks;
    }

    let max = rubric.total();
    let percentage = percentage(total, max);

    Ok(ScoreSummary {
        total_score: round2(total),
        max_score: round2(max),
        percentage,
        grade: Grade::from_percentage(percentage),
    })
}

/// `score / max * 100`, rounded to two decimals. Zero when `max` is zero.
pub fn percentage(score: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    round2(score / max * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Combines per-question results into one total per student.
///
/// Students are returned in the order they first appear in `results`.
pub fn combine(results: &[EvaluationResult]) -> Vec<StudentTotal> {
    let mut totals: Vec<StudentTotal> = Vec::new();

    for result in results {
        let index = match totals
            .iter()
            .position(|t| t.student_name == result.student_name)
        {
            Some(i) => i,
            None => {
                totals.push(StudentTotal {
                    student_name: result.student_name.clone(),
                    questions_evaluated: 0,
                    total_score: 0.0,
                    max_score: 0.0,
                    percentage: 0.0,
                    grade: Grade::Poor,
                });
                totals.len() - 1
            }
        };

        let entry = &mut totals[index];
        entry.questions_evaluated += 1;
        entry.total_score += result.total_score;
        entry.max_score += result.max_score;
    }

    for total in &mut totals {
        total.total_score = round2(total.total_score);
        total.max_score = round2(total.max_score);
        total.percentage = percentage(total.total_score, total.max_score);
        total.grade = Grade::from_percentage(total.percentage);
    }

    totals
}

/// Formats a score for display, e.g. `8/10` or `8.5/10`.
pub fn format_score(score: f64, max: f64) -> String {
    if score.fract() == 0.0 && max.fract() == 0.0 {
        format!("{}/{}", score as i64, max as i64)
    } else {
        format!("{}/{}", score, max)
    }
}
