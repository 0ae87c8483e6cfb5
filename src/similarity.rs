//! Answer similarity analysis.
//!
//! Pure functions over answer text, used to flag pairs of students whose
//! answers look copied. Scores are percentages in `[0, 100]`. Three signals
//! are blended: word 1-3 gram TF-IDF cosine (0.4), character 3-5 gram TF-IDF
//! cosine (0.3) and the overlap coefficient of content words (0.3). The
//! blend is then stretched so that close pairs stand out, capped at 95.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::models::StudentAnswers;

pub const DEFAULT_SUSPICIOUS_THRESHOLD: f64 = 70.0;

const WORD_NGRAMS: RangeInclusive<usize> = 1..=3;
const CHAR_NGRAMS: RangeInclusive<usize> = 3..=5;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
];

/// Pairwise similarity between students, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    pub students: Vec<String>,
    pub scores: Vec<Vec<f64>>,
}

impl SimilarityMatrix {
    pub fn get(&self, first: &str, second: &str) -> Option<f64> {
        let i = self.students.iter().position(|s| s == first)?;
        let j = self.students.iter().position(|s| s == second)?;
        Some(self.scores[i][j])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousPair {
    pub first: String,
    pub second: String,
    /// Percentage, rounded to one decimal.
    pub similarity: f64,
}

/// Word-level comparison of two answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerComparison {
    pub similarity: f64,
    /// Shared words longer than three characters, sorted, at most ten.
    pub common_words: Vec<String>,
    pub unique_to_first: usize,
    pub unique_to_second: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLevel {
    VerySuspicious,
    Suspicious,
    Moderate,
    Unique,
}

impl SimilarityLevel {
    pub fn from_percentage(similarity: f64) -> Self {
        if similarity >= 80.0 {
            Self::VerySuspicious
        } else if similarity >= 65.0 {
            Self::Suspicious
        } else if similarity >= 50.0 {
            Self::Moderate
        } else {
            Self::Unique
        }
    }
}

/// Overlap coefficient of the content words of two texts, in `[0, 1]`.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let a = content_words(a);
    let b = content_words(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / a.len().min(b.len()) as f64
}

/// Cosine similarity of character `n`-gram counts, in `[0, 1]`.
pub fn char_ngram_cosine(a: &str, b: &str, n: usize) -> f64 {
    let count = |text: &str| {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for gram in char_ngrams(text, n..=n) {
            *counts.entry(gram).or_insert(0.0) += 1.0;
        }
        counts
    };
    cosine(&count(a), &count(b))
}

/// Blended similarity of two answers as a percentage.
pub fn answer_similarity(a: &str, b: &str) -> f64 {
    blended(&[a.to_string(), b.to_string()])[0][1]
}

/// Similarity of every pair of students over all their answers combined.
///
/// Returns `None` for fewer than two students.
pub fn similarity_matrix(students: &[StudentAnswers]) -> Option<SimilarityMatrix> {
    if students.len() < 2 {
        return None;
    }

    let texts: Vec<String> = students
        .iter()
        .map(|s| {
            s.answers
                .iter()
                .map(|(_, a)| a.trim())
                .filter(|a| !a.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    Some(SimilarityMatrix {
        students: students.iter().map(|s| s.student_name.clone()).collect(),
        scores: blended(&texts),
    })
}

/// Word TF-IDF similarity of every pair of students on one question.
///
/// Returns `None` for fewer than two students or when no answer to the
/// question is longer than ten characters.
pub fn question_similarity_matrix(
    students: &[StudentAnswers],
    question_number: u32,
) -> Option<SimilarityMatrix> {
    if students.len() < 2 {
        return None;
    }

    let texts: Vec<String> = students
        .iter()
        .map(|s| s.answer(question_number).unwrap_or_default().trim().to_string())
        .collect();
    if !texts.iter().any(|t| t.chars().count() > 10) {
        return None;
    }

    let docs: Vec<Vec<String>> = texts.iter().map(|t| word_ngrams(t)).collect();
    let mut scores = tfidf_cosine(&docs);
    for (i, row) in scores.iter_mut().enumerate() {
        for (j, score) in row.iter_mut().enumerate() {
            *score = if i == j { 100.0 } else { *score * 100.0 };
        }
    }

    Some(SimilarityMatrix {
        students: students.iter().map(|s| s.student_name.clone()).collect(),
        scores,
    })
}

/// Pairs at or above `threshold`, most similar first.
pub fn suspicious_pairs(matrix: &SimilarityMatrix, threshold: f64) -> Vec<SuspiciousPair> {
    let mut pairs = Vec::new();
    for i in 0..matrix.students.len() {
        for j in (i + 1)..matrix.students.len() {
            let similarity = matrix.scores[i][j];
            if similarity >= threshold {
                pairs.push(SuspiciousPair {
                    first: matrix.students[i].clone(),
                    second: matrix.students[j].clone(),
                    similarity: (similarity * 10.0).round() / 10.0,
                });
            }
        }
    }
    pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    pairs
}

pub fn compare_answers(a: &str, b: &str) -> AnswerComparison {
    if a.trim().is_empty() || b.trim().is_empty() {
        return AnswerComparison {
            similarity: 0.0,
            common_words: Vec::new(),
            unique_to_first: 0,
            unique_to_second: 0,
        };
    }

    let docs = vec![word_ngrams(a), word_ngrams(b)];
    let similarity = (tfidf_cosine(&docs)[0][1] * 1000.0).round() / 10.0;

    let long_words = |text: &str| -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 3)
            .map(str::to_string)
            .collect()
    };
    let first = long_words(a);
    let second = long_words(b);

    let mut common_words: Vec<String> = first.intersection(&second).cloned().collect();
    common_words.sort();
    common_words.truncate(10);

    AnswerComparison {
        similarity,
        common_words,
        unique_to_first: first.difference(&second).count(),
        unique_to_second: second.difference(&first).count(),
    }
}

fn blended(texts: &[String]) -> Vec<Vec<f64>> {
    let words = tfidf_cosine(&texts.iter().map(|t| word_ngrams(t)).collect::<Vec<_>>());
    let chars = tfidf_cosine(
        &texts
            .iter()
            .map(|t| char_ngrams(t, CHAR_NGRAMS))
            .collect::<Vec<_>>(),
    );

    let n = texts.len();
    let mut scores = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                scores[i][j] = 100.0;
                continue;
            }
            let score = words[i][j] * 0.4 + chars[i][j] * 0.3 + word_overlap(&texts[i], &texts[j]) * 0.3;
            let stretched = if score > 0.5 {
                (score * 1.3).min(0.95)
            } else if score > 0.3 {
                score * 1.1
            } else {
                score
            };
            scores[i][j] = stretched * 100.0;
        }
    }
    scores
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn content_words(text: &str) -> HashSet<String> {
    tokens(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn word_ngrams(text: &str) -> Vec<String> {
    let tokens = tokens(text);
    let mut grams = Vec::new();
    for n in WORD_NGRAMS {
        for window in tokens.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}

fn char_ngrams(text: &str, sizes: RangeInclusive<usize>) -> Vec<String> {
    let normalized: Vec<char> = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();
    let mut grams = Vec::new();
    for n in sizes {
        for window in normalized.windows(n) {
            grams.push(window.iter().collect());
        }
    }
    grams
}

/// Cosine similarity of TF-IDF vectors with smoothed IDF, for every pair.
fn tfidf_cosine(docs: &[Vec<String>]) -> Vec<Vec<f64>> {
    let n = docs.len();
    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for doc in docs {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            *document_frequency.entry(term).or_insert(0) += 1;
        }
    }

    let vectors: Vec<HashMap<String, f64>> = docs
        .iter()
        .map(|doc| {
            let mut weights: HashMap<String, f64> = HashMap::new();
            for term in doc {
                *weights.entry(term.clone()).or_insert(0.0) += 1.0;
            }
            for (term, weight) in weights.iter_mut() {
                let df = document_frequency.get(term.as_str()).copied().unwrap_or(0);
                *weight *= ((1 + n) as f64 / (1 + df) as f64).ln() + 1.0;
            }
            weights
        })
        .collect();

    (0..n)
        .map(|i| (0..n).map(|j| cosine(&vectors[i], &vectors[j])).collect())
        .collect()
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let norm = |v: &HashMap<String, f64>| v.values().map(|w| w * w).sum::<f64>().sqrt();
    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(term, w)| b.get(term).map(|v| w * v))
        .sum();
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
