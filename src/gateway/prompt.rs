//! Prompt construction for the chat-completions API.

use crate::models::{EvaluationMode, Rubric};

/// Sampling temperature for a grading mode.
pub fn temperature(mode: EvaluationMode) -> f32 {
    match mode {
        EvaluationMode::Strict => 0.05,
        EvaluationMode::Moderate => 0.3,
        EvaluationMode::Lenient => 0.6,
    }
}

pub fn mode_instructions(mode: EvaluationMode) -> &'static str {
    match mode {
        EvaluationMode::Strict => {
            "GRADING MODE: STRICT
- Award full marks only for complete, precise answers.
- Deduct heavily for missing details or any error.
- A partial answer earns at most half of a criterion's marks.
- Treat ambiguous statements as incorrect.
- Average understanding earns 40-60% of the marks.
In each reason, name every gap and what a complete answer would include."
        }
        EvaluationMode::Moderate => {
            "GRADING MODE: MODERATE
- Award marks when a criterion is reasonably demonstrated.
- Give proportional partial credit for the understanding shown.
- Minor errors cost 10-20% of a criterion, major omissions 30-50%.
- Average understanding earns 60-75% of the marks.
In each reason, cite what the student did well and what is missing."
        }
        EvaluationMode::Lenient => {
            "GRADING MODE: LENIENT
- Award marks for any evidence of understanding.
- Give generous partial credit for incomplete answers.
- Minor errors cost at most 5-10% of a criterion.
- Average understanding earns 75-85% of the marks.
- Give the benefit of the doubt when the answer is unclear.
In each reason, lead with strengths and phrase gaps as next steps."
        }
    }
}

/// Renders the rubric as a bullet list for the prompt.
pub fn format_rubric(rubric: &Rubric) -> String {
    let mut out = String::from("Rubric:\n");
    for criterion in &rubric.criteria {
        out.push_str(&format!(
            "- {} (max {} marks)\n",
            criterion.name, criterion.max_marks
        ));
    }
    out.push_str(&format!("Total: {} marks\n", rubric.total()));
    out
}

/// System and user messages for grading one answer.
pub fn evaluation_messages(
    question: &str,
    rubric: &Rubric,
    answer: &str,
    mode: EvaluationMode,
) -> (String, String) {
    let system = format!(
        "You are an academic evaluator. Grade the student's answer against the rubric.\n\n\
         {}\n\n\
         Arithmetic must be exactly right: an incorrect calculation earns no marks for the \
         criterion it affects.\n\n\
         Respond with a single JSON object and nothing else, no markdown or backticks:\n\
         {{\n  \"scores\": [{{\"criterion\": \"<rubric criterion name>\", \"awarded\": <number>, \
         \"reason\": \"<specific justification>\"}}],\n  \
         \"feedback\": [\"<improvement or strength>\"],\n  \
         \"confidence\": \"high|medium|low\"\n}}\n\
         Include exactly one entry per rubric criterion. \"awarded\" must be between 0 and \
         that criterion's maximum.",
        mode_instructions(mode)
    );

    let user = format!(
        "Question:\n{}\n\n{}\nStudent answer:\n{}",
        question.trim(),
        format_rubric(rubric),
        answer.trim()
    );

    (system, user)
}

pub fn rubric_messages(questions: &[String]) -> (String, String) {
    let system = "You design marking rubrics for teachers. Propose 3 to 5 criteria that \
                  apply to every question below, each with a whole number of marks.\n\
                  Respond with a single JSON object and nothing else:\n\
                  {\"criteria\": [{\"criterion\": \"<name>\", \"marks\": <positive number>}]}"
        .to_string();

    let mut user = String::from("Questions:\n");
    for (i, question) in questions.iter().enumerate() {
        user.push_str(&format!("{}. {}\n", i + 1, question.trim()));
    }

    (system, user)
}

pub fn model_answer_messages(question: &str, rubric: &Rubric) -> (String, String) {
    let system = "You write model answers that would earn full marks on every rubric \
                  criterion. Reply with the answer text only."
        .to_string();
    let user = format!("Question:\n{}\n\n{}", question.trim(), format_rubric(rubric));
    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Criterion;

    #[test]
    fn stricter_modes_sample_colder() {
        assert!(temperature(EvaluationMode::Strict) < temperature(EvaluationMode::Moderate));
        assert!(temperature(EvaluationMode::Moderate) < temperature(EvaluationMode::Lenient));
    }

    #[test]
    fn evaluation_prompt_lists_every_criterion() {
        let rubric = Rubric::new(vec![
            Criterion::new("Understanding", 5.0),
            Criterion::new("Accuracy", 3.0),
        ]);
        let (system, user) =
            evaluation_messages("What is 2+2?", &rubric, "4", EvaluationMode::Strict);

        assert!(system.contains("STRICT"));
        assert!(user.contains("- Understanding (max 5 marks)"));
        assert!(user.contains("- Accuracy (max 3 marks)"));
        assert!(user.contains("Total: 8 marks"));
    }
}
