use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single gradeable dimension within a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub max_marks: f64,
}

impl Criterion {
    pub fn new(name: impl Into<String>, max_marks: f64) -> Self {
        Self {
            name: name.into(),
            max_marks,
        }
    }
}

/// An ordered list of criteria shared by every question of an assignment.
///
/// The rubric total is the maximum score of a single question. Criterion
/// names are matched case-insensitively, ignoring surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rubric {
    pub criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn total(&self) -> f64 {
        self.criteria.iter().map(|c| c.max_marks).sum()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Criterion> {
        let wanted = normalize(name);
        self.criteria.iter().find(|c| normalize(&c.name) == wanted)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }

    /// Checks the structural invariants: at least one criterion, non-blank
    /// unique names, and strictly positive finite maximum marks.
    pub fn validate(&self) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(Error::validation("rubric must have at least one criterion"));
        }

        let mut seen = std::collections::HashSet::new();
        for criterion in &self.criteria {
            if criterion.name.trim().is_empty() {
                return Err(Error::validation("rubric criterion name must not be blank"));
            }
            if !criterion.max_marks.is_finite() || criterion.max_marks <= 0.0 {
                return Err(Error::validation(format!(
                    "criterion '{}' max_marks must be greater than zero, got {}",
                    criterion.name, criterion.max_marks
                )));
            }
            if !seen.insert(normalize(&criterion.name)) {
                return Err(Error::validation(format!(
                    "criterion '{}' appears more than once",
                    criterion.name
                )));
            }
        }

        Ok(())
    }
}

pub(crate) fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
