//! Parsing of LLM replies into validated records.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::GatewayEvaluation;
use crate::models::{Criterion, CriterionScore, Rubric};

/// Why an LLM reply could not be accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedResponse {
    #[error("response was empty")]
    Empty,

    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    #[error("response is missing field '{0}'")]
    MissingField(String),

    #[error("criterion '{0}' is not in the rubric")]
    UnknownCriterion(String),

    #[error("criterion '{0}' is scored more than once")]
    DuplicateCriterion(String),

    #[error("criterion '{0}' was not scored")]
    MissingCriterion(String),

    #[error("criterion '{criterion}' has invalid mark {value}")]
    InvalidMark { criterion: String, value: String },

    #[error("criterion '{criterion}' awarded {awarded}, above its maximum of {max}")]
    MarkAboveMax {
        criterion: String,
        awarded: f64,
        max: f64,
    },

    #[error("suggested rubric is invalid: {0}")]
    InvalidRubric(String),
}

#[derive(Deserialize)]
struct RawEvaluation {
    scores: Option<Vec<RawScore>>,
    #[serde(default)]
    feedback: Option<RawFeedback>,
    #[serde(default)]
    confidence: Option<Value>,
}

#[derive(Deserialize)]
struct RawScore {
    criterion: Option<String>,
    awarded: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFeedback {
    List(Vec<String>),
    One(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRubric {
    Wrapped { criteria: Vec<RawCriterion> },
    Bare(Vec<RawCriterion>),
}

#[derive(Deserialize)]
struct RawCriterion {
    criterion: Option<String>,
    #[serde(alias = "max_marks")]
    marks: Option<Value>,
}

/// Parses an evaluation reply and checks it against the rubric.
pub fn parse_evaluation(
    content: &str,
    rubric: &Rubric,
) -> Result<GatewayEvaluation, MalformedResponse> {
    let raw: RawEvaluation = parse_json(content)?;
    let raw_scores = raw
        .scores
        .ok_or_else(|| MalformedResponse::MissingField("scores".into()))?;

    let mut seen = HashSet::new();
    let mut scored: Vec<(&Criterion, f64, String)> = Vec::with_capacity(raw_scores.len());

    for (i, score) in raw_scores.into_iter().enumerate() {
        let name = score
            .criterion
            .ok_or_else(|| MalformedResponse::MissingField(format!("scores[{}].criterion", i)))?;
        let criterion = rubric
            .find(&name)
            .ok_or_else(|| MalformedResponse::UnknownCriterion(name.clone()))?;
        if !seen.insert(criterion.name.clone()) {
            return Err(MalformedResponse::DuplicateCriterion(criterion.name.clone()));
        }

        let value = score
            .awarded
            .ok_or_else(|| MalformedResponse::MissingField(format!("scores[{}].awarded", i)))?;
        let awarded = mark(&criterion.name, &value)?;
        if awarded < 0.0 {
            return Err(MalformedResponse::InvalidMark {
                criterion: criterion.name.clone(),
                value: value.to_string(),
            });
        }
        if awarded > criterion.max_marks {
            return Err(MalformedResponse::MarkAboveMax {
                criterion: criterion.name.clone(),
                awarded,
                max: criterion.max_marks,
            });
        }

        scored.push((criterion, awarded, score.reason.unwrap_or_default()));
    }

    let mut scores = Vec::with_capacity(rubric.len());
    for criterion in &rubric.criteria {
        let (_, awarded, reason) = scored
            .iter()
            .find(|(c, _, _)| c.name == criterion.name)
            .ok_or_else(|| MalformedResponse::MissingCriterion(criterion.name.clone()))?;
        scores.push(CriterionScore {
            criterion: criterion.name.clone(),
            awarded: *awarded,
            max_marks: criterion.max_marks,
            reason: reason.trim().to_string(),
        });
    }

    let feedback = match raw.feedback {
        Some(RawFeedback::List(items)) => items,
        Some(RawFeedback::One(item)) => vec![item],
        None => Vec::new(),
    }
    .into_iter()
    .map(|f| f.trim().to_string())
    .filter(|f| !f.is_empty())
    .collect();

    let confidence = match raw.confidence {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_lowercase()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(GatewayEvaluation {
        scores,
        feedback,
        confidence,
    })
}

/// Parses a suggested rubric.
pub fn parse_rubric(content: &str) -> Result<Rubric, MalformedResponse> {
    let raw: RawRubric = parse_json(content)?;
    let items = match raw {
        RawRubric::Wrapped { criteria } => criteria,
        RawRubric::Bare(criteria) => criteria,
    };

    let mut criteria = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let name = item
            .criterion
            .ok_or_else(|| MalformedResponse::MissingField(format!("criteria[{}].criterion", i)))?;
        let value = item
            .marks
            .ok_or_else(|| MalformedResponse::MissingField(format!("criteria[{}].marks", i)))?;
        let marks = mark(&name, &value)?;
        criteria.push(Criterion::new(name.trim(), marks));
    }

    let rubric = Rubric::new(criteria);
    rubric
        .validate()
        .map_err(|e| MalformedResponse::InvalidRubric(e.to_string()))?;
    Ok(rubric)
}

/// Trims a plain-text reply, rejecting an empty one.
pub fn parse_text(content: &str) -> Result<String, MalformedResponse> {
    let text = strip_fences(content).trim();
    if text.is_empty() {
        return Err(MalformedResponse::Empty);
    }
    Ok(text.to_string())
}

fn parse_json<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, MalformedResponse> {
    let body = strip_fences(content).trim();
    if body.is_empty() {
        return Err(MalformedResponse::Empty);
    }

    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => {
            // Models sometimes wrap the object in prose.
            let embedded = match (body.find('{'), body.rfind('}')) {
                (Some(start), Some(end)) if start < end => &body[start..=end],
                _ => return Err(MalformedResponse::NotJson(first.to_string())),
            };
            serde_json::from_str(embedded).map_err(|_| MalformedResponse::NotJson(first.to_string()))
        }
    }
}

fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) up to the first newline.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest)
}

fn mark(criterion: &str, value: &Value) -> Result<f64, MalformedResponse> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(MalformedResponse::InvalidMark {
            criterion: criterion.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric() -> Rubric {
        Rubric::new(vec![
            Criterion::new("Understanding", 5.0),
            Criterion::new("Accuracy", 5.0),
        ])
    }

    #[test]
    fn parses_well_formed_reply_in_rubric_order() {
        let reply = r#"{
            "scores": [
                {"criterion": "accuracy", "awarded": 5, "reason": "All correct"},
                {"criterion": "Understanding", "awarded": "4", "reason": "Mostly there"}
            ],
            "feedback": ["Explain the second step"],
            "confidence": "High"
        }"#;

        let evaluation = parse_evaluation(reply, &rubric()).unwrap();
        assert_eq!(evaluation.scores[0].criterion, "Understanding");
        assert_eq!(evaluation.scores[0].awarded, 4.0);
        assert_eq!(evaluation.scores[1].criterion, "Accuracy");
        assert_eq!(evaluation.scores[1].max_marks, 5.0);
        assert_eq!(evaluation.feedback, vec!["Explain the second step"]);
        assert_eq!(evaluation.confidence.as_deref(), Some("high"));
    }

    #[test]
    fn tolerates_code_fences_and_surrounding_prose() {
        let fenced = "```json\n{\"scores\": [{\"criterion\": \"Understanding\", \"awarded\": 1}, {\"criterion\": \"Accuracy\", \"awarded\": 2}]}\n```";
        assert!(parse_evaluation(fenced, &rubric()).is_ok());

        let prose = "Here is the grade: {\"scores\": [{\"criterion\": \"Understanding\", \"awarded\": 1}, {\"criterion\": \"Accuracy\", \"awarded\": 2}]} Thanks";
        assert!(parse_evaluation(prose, &rubric()).is_ok());
    }

    #[test]
    fn rejects_empty_and_non_json() {
        assert_eq!(parse_evaluation("  ", &rubric()), Err(MalformedResponse::Empty));
        assert!(matches!(
            parse_evaluation("I cannot grade this.", &rubric()),
            Err(MalformedResponse::NotJson(_))
        ));
    }

    #[test]
    fn rejects_missing_scores() {
        assert_eq!(
            parse_evaluation(r#"{"feedback": []}"#, &rubric()),
            Err(MalformedResponse::MissingField("scores".into()))
        );
    }

    #[test]
    fn rejects_mark_above_max_without_clamping() {
        let reply = r#"{"scores": [{"criterion": "Understanding", "awarded": 6}, {"criterion": "Accuracy", "awarded": 5}]}"#;
        assert_eq!(
            parse_evaluation(reply, &rubric()),
            Err(MalformedResponse::MarkAboveMax {
                criterion: "Understanding".into(),
                awarded: 6.0,
                max: 5.0
            })
        );
    }

    #[test]
    fn rejects_unknown_duplicate_and_missing_criteria() {
        let unknown = r#"{"scores": [{"criterion": "Style", "awarded": 1}]}"#;
        assert!(matches!(
            parse_evaluation(unknown, &rubric()),
            Err(MalformedResponse::UnknownCriterion(_))
        ));

        let duplicate = r#"{"scores": [{"criterion": "Accuracy", "awarded": 1}, {"criterion": "ACCURACY", "awarded": 2}]}"#;
        assert_eq!(
            parse_evaluation(duplicate, &rubric()),
            Err(MalformedResponse::DuplicateCriterion("Accuracy".into()))
        );

        let missing = r#"{"scores": [{"criterion": "Accuracy", "awarded": 1}]}"#;
        assert_eq!(
            parse_evaluation(missing, &rubric()),
            Err(MalformedResponse::MissingCriterion("Understanding".into()))
        );
    }

    #[test]
    fn rejects_negative_and_non_numeric_marks() {
        let negative = r#"{"scores": [{"criterion": "Understanding", "awarded": -1}, {"criterion": "Accuracy", "awarded": 1}]}"#;
        assert!(matches!(
            parse_evaluation(negative, &rubric()),
            Err(MalformedResponse::InvalidMark { .. })
        ));

        let text = r#"{"scores": [{"criterion": "Understanding", "awarded": "four"}, {"criterion": "Accuracy", "awarded": 1}]}"#;
        assert!(matches!(
            parse_evaluation(text, &rubric()),
            Err(MalformedResponse::InvalidMark { .. })
        ));
    }

    #[test]
    fn parses_wrapped_and_bare_rubrics() {
        let wrapped = r#"{"criteria": [{"criterion": "Clarity", "marks": 3}, {"criterion": "Depth", "marks": 7}]}"#;
        assert_eq!(parse_rubric(wrapped).unwrap().total(), 10.0);

        let bare = r#"[{"criterion": "Clarity", "marks": 2}]"#;
        assert_eq!(parse_rubric(bare).unwrap().len(), 1);
    }

    #[test]
    fn rejects_rubric_with_zero_marks() {
        let reply = r#"{"criteria": [{"criterion": "Clarity", "marks": 0}]}"#;
        assert!(matches!(parse_rubric(reply), Err(MalformedResponse::InvalidRubric(_))));
    }

    #[test]
    fn plain_text_must_not_be_empty() {
        assert_eq!(parse_text("  A full answer. ").unwrap(), "A full answer.");
        assert_eq!(parse_text(""), Err(MalformedResponse::Empty));
    }
}
