//! Class performance statistics over evaluation results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{EvaluationResult, Grade, StudentTotal};
use crate::scoring::round2;

pub const PASS_PERCENTAGE: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPerformance {
    pub students: u32,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Share of students at or above the pass mark, as a percentage.
    pub pass_rate: f64,
    pub distribution: BTreeMap<Grade, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionAverage {
    pub criterion: String,
    pub average_percentage: f64,
    pub full_marks: u32,
    pub struggled: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
    VeryHard,
}

impl Difficulty {
    pub fn from_percentage(average: f64) -> Self {
        if average >= 80.0 {
            Self::Easy
        } else if average >= 60.0 {
            Self::Moderate
        } else if average >= 40.0 {
            Self::Hard
        } else {
            Self::VeryHard
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionBreakdown {
    pub question_number: u32,
    pub answers: u32,
    pub average_score: f64,
    pub average_percentage: f64,
    pub full_marks: u32,
    pub below_half: u32,
    pub difficulty: Difficulty,
}

/// Summary statistics over per-student percentages. `None` for an empty class.
pub fn class_performance(totals: &[StudentTotal]) -> Option<ClassPerformance> {
    if totals.is_empty() {
        return None;
    }

    let mut percentages: Vec<f64> = totals.iter().map(|t| t.percentage).collect();
    percentages.sort_by(f64::total_cmp);

    let n = percentages.len() as f64;
    let mean = percentages.iter().sum::<f64>() / n;
    let variance = percentages.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    let mid = percentages.len() / 2;
    let median = if percentages.len() % 2 == 0 {
        (percentages[mid - 1] + percentages[mid]) / 2.0
    } else {
        percentages[mid]
    };

    let mut distribution: BTreeMap<Grade, u32> = Grade::ALL.iter().map(|g| (*g, 0)).collect();
    for total in totals {
        *distribution.entry(total.grade).or_insert(0) += 1;
    }

    let passed = percentages.iter().filter(|p| **p >= PASS_PERCENTAGE).count() as f64;

    Some(ClassPerformance {
        students: totals.len() as u32,
        mean: round2(mean),
        median: round2(median),
        std_dev: round2(variance.sqrt()),
        min: percentages[0],
        max: percentages[percentages.len() - 1],
        pass_rate: round2(passed / n * 100.0),
        distribution,
    })
}

/// Average percentage per criterion, in first-seen order.
pub fn criterion_averages(results: &[EvaluationResult]) -> Vec<CriterionAverage> {
    let mut order: Vec<String> = Vec::new();
    let mut percentages: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for score in results.iter().flat_map(|r| &r.scores) {
        if score.max_marks <= 0.0 {
            continue;
        }
        if !percentages.contains_key(&score.criterion) {
            order.push(score.criterion.clone());
        }
        percentages
            .entry(score.criterion.clone())
            .or_default()
            .push(score.awarded / score.max_marks * 100.0);
    }

    order
        .into_iter()
        .map(|criterion| {
            let values = &percentages[&criterion];
            CriterionAverage {
                average_percentage: round2(values.iter().sum::<f64>() / values.len() as f64),
                full_marks: values.iter().filter(|p| **p >= 99.0).count() as u32,
                struggled: values.iter().filter(|p| **p < 50.0).count() as u32,
                criterion,
            }
        })
        .collect()
}

/// Per-question statistics, ordered by question number.
pub fn question_breakdown(results: &[EvaluationResult]) -> Vec<QuestionBreakdown> {
    let mut by_question: BTreeMap<u32, Vec<&EvaluationResult>> = BTreeMap::new();
    for result in results {
        by_question.entry(result.question_number).or_default().push(result);
    }

    by_question
        .into_iter()
        .map(|(question_number, results)| {
            let n = results.len() as f64;
            let average_percentage =
                round2(results.iter().map(|r| r.percentage).sum::<f64>() / n);
            QuestionBreakdown {
                question_number,
                answers: results.len() as u32,
                average_score: round2(results.iter().map(|r| r.total_score).sum::<f64>() / n),
                average_percentage,
                full_marks: results
                    .iter()
                    .filter(|r| r.max_score > 0.0 && r.total_score >= r.max_score)
                    .count() as u32,
                below_half: results.iter().filter(|r| r.percentage < 50.0).count() as u32,
                difficulty: Difficulty::from_percentage(average_percentage),
            }
        })
        .collect()
}

/// Students below `threshold`, weakest first.
pub fn struggling_students(totals: &[StudentTotal], threshold: f64) -> Vec<StudentTotal> {
    let mut struggling: Vec<StudentTotal> = totals
        .iter()
        .filter(|t| t.percentage < threshold)
        .cloned()
        .collect();
    struggling.sort_by(|a, b| a.percentage.total_cmp(&b.percentage));
    struggling
}

/// Students at or above `threshold`, strongest first.
pub fn top_performers(totals: &[StudentTotal], threshold: f64) -> Vec<StudentTotal> {
    let mut top: Vec<StudentTotal> = totals
        .iter()
        .filter(|t| t.percentage >= threshold)
        .cloned()
        .collect();
    top.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    top
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CriterionScore, EvaluationMode};
    use chrono::Utc;
    use uuid::Uuid;

    fn total(name: &str, percentage: f64) -> StudentTotal {
        StudentTotal {
            student_name: name.to_string(),
            questions_evaluated: 1,
            total_score: percentage / 10.0,
            max_score: 10.0,
            percentage,
            grade: Grade::from_percentage(percentage),
        }
    }

    fn result(question: u32, understanding: f64, accuracy: f64) -> EvaluationResult {
        let total = understanding + accuracy;
        EvaluationResult {
            id: Uuid::new_v4(),
            assignment_id: Uuid::nil(),
            student_name: "Ana".into(),
            question_number: question,
            scores: vec![
                CriterionScore {
                    criterion: "Understanding".into(),
                    awarded: understanding,
                    max_marks: 5.0,
                    reason: String::new(),
                },
                CriterionScore {
                    criterion: "Accuracy".into(),
                    awarded: accuracy,
                    max_marks: 5.0,
                    reason: String::new(),
                },
            ],
            total_score: total,
            max_score: 10.0,
            percentage: total * 10.0,
            grade: Grade::from_percentage(total * 10.0),
            feedback: vec![],
            mode: EvaluationMode::Moderate,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_class_has_no_statistics() {
        assert!(class_performance(&[]).is_none());
    }

    #[test]
    fn class_statistics() {
        let stats = class_performance(&[
            total("Ana", 90.0),
            total("Ben", 70.0),
            total("Cy", 50.0),
            total("Di", 30.0),
        ])
        .unwrap();

        assert_eq!(stats.students, 4);
        assert_eq!(stats.mean, 60.0);
        assert_eq!(stats.median, 60.0);
        assert_eq!(stats.std_dev, 22.36);
        assert_eq!(stats.min, 30.0);
        assert_eq!(stats.max, 90.0);
        assert_eq!(stats.pass_rate, 50.0);
        assert_eq!(stats.distribution[&Grade::Excellent], 1);
        assert_eq!(stats.distribution[&Grade::Good], 0);
        assert_eq!(stats.distribution[&Grade::Poor], 1);
    }

    #[test]
    fn criterion_averages_keep_first_seen_order() {
        let averages = criterion_averages(&[result(1, 5.0, 2.0), result(2, 3.0, 2.0)]);
        assert_eq!(averages[0].criterion, "Understanding");
        assert_eq!(averages[0].average_percentage, 80.0);
        assert_eq!(averages[0].full_marks, 1);
        assert_eq!(averages[1].criterion, "Accuracy");
        assert_eq!(averages[1].struggled, 2);
    }

    #[test]
    fn question_breakdown_rates_difficulty() {
        let breakdown = question_breakdown(&[result(2, 1.0, 1.0), result(1, 5.0, 5.0), result(1, 4.0, 4.0)]);
        assert_eq!(breakdown[0].question_number, 1);
        assert_eq!(breakdown[0].answers, 2);
        assert_eq!(breakdown[0].average_percentage, 90.0);
        assert_eq!(breakdown[0].full_marks, 1);
        assert_eq!(breakdown[0].difficulty, Difficulty::Easy);
        assert_eq!(breakdown[1].difficulty, Difficulty::VeryHard);
    }

    #[test]
    fn struggling_and_top_students_are_sorted() {
        let totals = [total("Ana", 55.0), total("Ben", 92.0), total("Cy", 40.0), total("Di", 88.0)];
        let struggling: Vec<_> = struggling_students(&totals, 60.0).into_iter().map(|t| t.student_name).collect();
        let top: Vec<_> = top_performers(&totals, 85.0).into_iter().map(|t| t.student_name).collect();
        assert_eq!(struggling, vec!["Cy", "Ana"]);
        assert_eq!(top, vec!["Ben", "Di"]);
    }
}
