//! The three-section assignment CSV format.
//!
//! ```text
//! CRITERIA,TOTAL MARKS
//! Understanding,5
//! Accuracy,5
//!
//! QUESTIONS,
//! 1,What is photosynthesis?
//! 2,Name the stages of mitosis.
//!
//! STUDENTS,
//! Ana,"Plants turn light into sugar",Prophase...
//! ```
//!
//! Columns are positional and sections appear in this order. The STUDENTS
//! section is optional. Parsing yields a validated [`ParsedAssignment`] or a
//! [`Error::Structural`] naming the section at fault.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{
    Assignment, Criterion, EvaluationResult, Rubric, StudentAnswers, StudentSubmission,
};

/// A section of the import CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Criteria,
    Questions,
    Students,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Criteria => "CRITERIA",
            Self::Questions => "QUESTIONS",
            Self::Students => "STUDENTS",
        }
    }

    fn from_header(cell: &str) -> Option<Self> {
        match cell.trim().to_uppercase().as_str() {
            "CRITERIA" | "CRITERION" => Some(Self::Criteria),
            "QUESTIONS" | "QUESTION" => Some(Self::Questions),
            "STUDENTS" | "STUDENT" | "ANSWERS" => Some(Self::Students),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structurally valid import.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAssignment {
    pub rubric: Rubric,
    pub questions: Vec<String>,
    pub students: Vec<StudentAnswers>,
}

impl ParsedAssignment {
    /// Non-empty answers as flat submissions.
    pub fn submissions(&self) -> Vec<StudentSubmission> {
        self.students
            .iter()
            .flat_map(|s| {
                s.answers
                    .iter()
                    .filter(|(_, answer)| !answer.trim().is_empty())
                    .map(|(n, answer)| StudentSubmission {
                        student_name: s.student_name.clone(),
                        question_number: *n,
                        answer_text: answer.clone(),
                    })
            })
            .collect()
    }
}

/// Parses the import CSV.
pub fn parse(content: &str) -> Result<ParsedAssignment> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut section: Option<Section> = None;
    let mut criteria = Vec::new();
    let mut questions: Vec<String> = Vec::new();
    let mut students: Vec<StudentAnswers> = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| {
            Error::structural(section.unwrap_or(Section::Criteria), e.to_string())
        })?;
        let cells: Vec<&str> = record.iter().collect();

        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        if let Some(next) = Section::from_header(cells[0]) {
            section = Some(enter_section(section, next)?);
            continue;
        }

        match section {
            None => {
                return Err(Error::structural(
                    Section::Criteria,
                    "file must start with a CRITERIA header",
                ))
            }
            Some(Section::Criteria) => criteria.push(parse_criterion(&cells)?),
            Some(Section::Questions) => questions.push(parse_question(&cells, questions.len())?),
            Some(Section::Students) => {
                let student = parse_student(&cells, questions.len())?;
                if students.iter().any(|s| s.student_name == student.student_name) {
                    return Err(Error::structural(
                        Section::Students,
                        format!("student '{}' appears more than once", student.student_name),
                    ));
                }
                students.push(student);
            }
        }
    }

    let rubric = Rubric::new(criteria);
    if rubric.is_empty() {
        return Err(Error::structural(Section::Criteria, "no criteria found"));
    }
    rubric
        .validate()
        .map_err(|e| Error::structural(Section::Criteria, strip_validation(e)))?;

    if questions.is_empty() {
        return Err(Error::structural(Section::Questions, "no questions found"));
    }

    Ok(ParsedAssignment {
        rubric,
        questions,
        students,
    })
}

fn enter_section(current: Option<Section>, next: Section) -> Result<Section> {
    let expected = match current {
        None => Section::Criteria,
        Some(Section::Criteria) => Section::Questions,
        Some(Section::Questions) => Section::Students,
        Some(Section::Students) => {
            return Err(Error::structural(
                next,
                "sections must appear once, in the order CRITERIA, QUESTIONS, STUDENTS",
            ))
        }
    };

    if next != expected {
        return Err(Error::structural(
            next,
            format!("expected {} section before {}", expected, next),
        ));
    }
    Ok(next)
}

fn parse_criterion(cells: &[&str]) -> Result<Criterion> {
    let name = cells[0];
    let marks = cells.get(1).copied().unwrap_or_default();

    if marks.is_empty() {
        return Err(Error::structural(
            Section::Criteria,
            format!("criterion '{}' is missing its total marks", name),
        ));
    }

    let max_marks: f64 = marks.parse().map_err(|_| {
        Error::structural(
            Section::Criteria,
            format!("criterion '{}' has non-numeric total marks '{}'", name, marks),
        )
    })?;

    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(Error::structural(
            Section::Criteria,
            format!("criterion '{}' total marks must be positive, got {}", name, marks),
        ));
    }

    Ok(Criterion::new(name, max_marks))
}

fn parse_question(cells: &[&str], seen: usize) -> Result<String> {
    let expected = seen as u32 + 1;
    let index: u32 = cells[0].parse().map_err(|_| {
        Error::structural(
            Section::Questions,
            format!("question index '{}' is not a number", cells[0]),
        )
    })?;

    if index != expected {
        return Err(Error::structural(
            Section::Questions,
            format!("expected question {}, found {}", expected, index),
        ));
    }

    match cells.get(1).copied() {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(Error::structural(
            Section::Questions,
            format!("question {} has no text", index),
        )),
    }
}

fn parse_student(cells: &[&str], question_count: usize) -> Result<StudentAnswers> {
    let name = cells[0];
    if name.is_empty() {
        return Err(Error::structural(
            Section::Students,
            "a student row is missing the student name",
        ));
    }
    let answers = &cells[1..];

    if let Some(extra) = answers
        .iter()
        .enumerate()
        .skip(question_count)
        .find(|(_, a)| !a.is_empty())
    {
        return Err(Error::structural(
            Section::Students,
            format!(
                "student '{}' answers question {}, but only {} questions exist",
                name,
                extra.0 + 1,
                question_count
            ),
        ));
    }

    Ok(StudentAnswers {
        student_name: name.to_string(),
        answers: answers
            .iter()
            .take(question_count)
            .enumerate()
            .map(|(i, a)| (i as u32 + 1, a.to_string()))
            .collect(),
    })
}

fn strip_validation(err: Error) -> String {
    match err {
        Error::Validation(msg) => msg,
        other => other.to_string(),
    }
}

/// Writes an assignment and answers back out in the import format.
pub fn write_import_csv(assignment: &Assignment, students: &[StudentAnswers]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(["CRITERIA", "TOTAL MARKS"])?;
    for criterion in &assignment.rubric.criteria {
        writer.write_record([criterion.name.clone(), criterion.max_marks.to_string()])?;
    }

    writer.write_record([""])?;
    writer.write_record(["QUESTIONS", ""])?;
    for question in &assignment.questions {
        writer.write_record([question.number.to_string(), question.text.clone()])?;
    }

    writer.write_record([""])?;
    writer.write_record(["STUDENTS", ""])?;
    for student in students {
        let mut row = vec![student.student_name.clone()];
        for question in &assignment.questions {
            row.push(student.answer(question.number).unwrap_or_default().to_string());
        }
        writer.write_record(&row)?;
    }

    finish(writer)
}

/// Writes one row per (student, question) with per-criterion marks.
pub fn write_evaluations_csv(rubric: &Rubric, results: &[EvaluationResult]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["student_name".to_string(), "question_number".to_string()];
    header.extend(rubric.names().map(str::to_string));
    header.extend(
        ["total_score", "max_score", "percentage", "grade"]
            .iter()
            .map(|s| s.to_string()),
    );
    writer.write_record(&header)?;

    for result in results {
        let mut row = vec![result.student_name.clone(), result.question_number.to_string()];
        for name in rubric.names() {
            row.push(
                result
                    .score_for(name)
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            );
        }
        row.push(result.total_score.to_string());
        row.push(result.max_score.to_string());
        row.push(format!("{:.2}", result.percentage));
        row.push(result.grade.label().to_string());
        writer.write_record(&row)?;
    }

    finish(writer)
}

/// A fillable template with one example row per section.
pub fn template() -> &'static str {
    "CRITERIA,TOTAL MARKS\n\
     Understanding,5\n\
     Accuracy,5\n\
     \n\
     QUESTIONS,\n\
     1,Explain the water cycle.\n\
     2,Why do seasons change?\n\
     \n\
     STUDENTS,\n\
     Student 1,Answer to question 1,Answer to question 2\n"
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| Error::Csv(csv::Error::from(e.into_error())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "CRITERIA,TOTAL MARKS
Understanding,5
Accuracy,5

QUESTIONS,
1,What is 2+2?
2,\"Define gravity, briefly.\"

STUDENTS,
Ana,4,A force that attracts masses
Ben,5,
";

    fn section_of(err: Error) -> Section {
        match err {
            Error::Structural { section, .. } => section,
            other => panic!("expected structural error, got {other:?}"),
        }
    }

    #[test]
    fn parses_all_three_sections() {
        let parsed = parse(VALID).unwrap();

        assert_eq!(parsed.rubric.len(), 2);
        assert_eq!(parsed.rubric.total(), 10.0);
        assert_eq!(parsed.questions, vec!["What is 2+2?", "Define gravity, briefly."]);
        assert_eq!(parsed.students.len(), 2);
        assert_eq!(parsed.students[0].answer(2), Some("A force that attracts masses"));
    }

    #[test]
    fn blank_answers_are_not_submissions() {
        let parsed = parse(VALID).unwrap();
        let submissions = parsed.submissions();

        assert_eq!(submissions.len(), 3);
        assert!(!submissions
            .iter()
            .any(|s| s.student_name == "Ben" && s.question_number == 2));
    }

    #[test]
    fn students_section_is_optional() {
        let parsed = parse("CRITERIA,TOTAL MARKS\nClarity,2\n\nQUESTIONS,\n1,Why?\n").unwrap();
        assert!(parsed.students.is_empty());
    }

    #[test]
    fn negative_marks_are_structural_errors() {
        let err = parse("CRITERIA,TOTAL MARKS\nClarity,-3\n\nQUESTIONS,\n1,Why?\n").unwrap_err();
        assert_eq!(section_of(err), Section::Criteria);
    }

    #[test]
    fn missing_marks_column_names_criteria() {
        let err = parse("CRITERIA\nClarity\n\nQUESTIONS,\n1,Why?\n").unwrap_err();
        assert_eq!(section_of(err), Section::Criteria);
    }

    #[test]
    fn missing_questions_names_questions() {
        let err = parse("CRITERIA,TOTAL MARKS\nClarity,2\n").unwrap_err();
        assert_eq!(section_of(err), Section::Questions);
    }

    #[test]
    fn out_of_order_question_index_names_questions() {
        let err = parse("CRITERIA,TOTAL MARKS\nClarity,2\n\nQUESTIONS,\n1,Why?\n3,How?\n").unwrap_err();
        assert_eq!(section_of(err), Section::Questions);
    }

    #[test]
    fn answer_for_missing_question_names_students() {
        let err = parse("CRITERIA,TOTAL MARKS\nClarity,2\n\nQUESTIONS,\n1,Why?\n\nSTUDENTS,\nAna,because,extra\n")
            .unwrap_err();
        assert_eq!(section_of(err), Section::Students);
    }

    #[test]
    fn sections_out_of_order_are_rejected() {
        let err = parse("QUESTIONS,\n1,Why?\n\nCRITERIA,TOTAL MARKS\nClarity,2\n").unwrap_err();
        assert_eq!(section_of(err), Section::Questions);
    }

    #[test]
    fn data_before_any_header_is_rejected() {
        let err = parse("Clarity,2\n").unwrap_err();
        assert_eq!(section_of(err), Section::Criteria);
    }

    #[test]
    fn duplicate_student_is_rejected() {
        let err = parse("CRITERIA,TOTAL MARKS\nClarity,2\n\nQUESTIONS,\n1,Why?\n\nSTUDENTS,\nAna,a\nAna,b\n")
            .unwrap_err();
        assert_eq!(section_of(err), Section::Students);
    }

    #[test]
    fn student_row_without_a_name_is_rejected() {
        let err = parse("CRITERIA,TOTAL MARKS\nClarity,2\n\nQUESTIONS,\n1,Why?\n\nSTUDENTS,\n ,because\n")
            .unwrap_err();
        match err {
            Error::Structural { section, message } => {
                assert_eq!(section, Section::Students);
                assert!(message.contains("student name"));
            }
            other => panic!("expected structural error, got {other:?}"),
        }
    }

    #[test]
    fn template_parses() {
        let parsed = parse(template()).unwrap();
        assert_eq!(parsed.questions.len(), 2);
        assert_eq!(parsed.students.len(), 1);
    }
}
