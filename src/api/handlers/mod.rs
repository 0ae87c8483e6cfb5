use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;
use crate::analytics::{self, ClassPerformance, CriterionAverage, QuestionBreakdown};
use crate::csv_import;
use crate::grading::{BatchOptions, BatchReport, ImportOutcome};
use crate::models::*;
use crate::similarity::{self, SimilarityMatrix, SuspiciousPair};

type ApiResult<T> = Result<T, ApiError>;

const TOP_PERFORMER_PERCENTAGE: f64 = 85.0;

// ============================================================
// Request / response bodies
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportCsvInput {
    pub name: String,
    pub csv: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateSubmissionInput {
    pub student_name: String,
    pub question_number: u32,
    #[serde(default)]
    pub mode: EvaluationMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateAnswerInput {
    pub student_name: String,
    pub question_number: u32,
    pub answer_text: String,
    #[serde(default)]
    pub mode: EvaluationMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestRubricInput {
    pub questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationQuery {
    pub student: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub student: String,
    pub question: u32,
}

#[derive(Debug, Deserialize)]
pub struct SimilarityQuery {
    pub threshold: Option<f64>,
    pub question: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub matrix: Option<SimilarityMatrix>,
    pub suspicious_pairs: Vec<SuspiciousPair>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub class: Option<ClassPerformance>,
    pub criteria: Vec<CriterionAverage>,
    pub questions: Vec<QuestionBreakdown>,
    pub struggling: Vec<StudentTotal>,
    pub top_performers: Vec<StudentTotal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelAnswer {
    pub question_number: u32,
    pub answer: String,
}

fn csv_response(filename: &str, body: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", filename),
            ),
        ],
        body,
    )
}

fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn template() -> impl IntoResponse {
    csv_response("assignment_template", csv_import::template().as_bytes().to_vec())
}

// ============================================================
// Assignments
// ============================================================

pub async fn list_assignments(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AssignmentSummary>>> {
    Ok(Json(state.manager.list_assignments()?))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    Json(input): Json<CreateAssignmentInput>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let assignment = state.manager.create_assignment(input)?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn import_assignment(
    State(state): State<AppState>,
    Json(input): Json<ImportCsvInput>,
) -> ApiResult<(StatusCode, Json<ImportOutcome>)> {
    let outcome = state.manager.import_csv(&input.csv, &input.name)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Assignment>> {
    Ok(Json(state.manager.load_assignment(id)?))
}

pub async fn rename_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RenameAssignmentInput>,
) -> ApiResult<Json<Assignment>> {
    Ok(Json(state.manager.rename_assignment(id, &input.name)?))
}

pub async fn delete_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.manager.delete_assignment(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_submissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Submission>>> {
    state.db.load_assignment(id)?;
    Ok(Json(state.db.list_submissions(id)?))
}

pub async fn evaluation_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SubmissionStatus>>> {
    state.db.load_assignment(id)?;
    Ok(Json(state.manager.evaluation_status(id)?))
}

pub async fn export_assignment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let assignment = state.db.load_assignment(id)?;
    let body = state.db.export_csv(id)?;
    Ok(csv_response(&format!("{}_results", slug(&assignment.name)), body))
}

// ============================================================
// Evaluation
// ============================================================

pub async fn evaluate_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(options): Json<BatchOptions>,
) -> ApiResult<Json<BatchReport>> {
    Ok(Json(state.manager.evaluate_all(id, options).await?))
}

pub async fn evaluate_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<EvaluateSubmissionInput>,
) -> ApiResult<(StatusCode, Json<EvaluationResult>)> {
    let result = state
        .manager
        .evaluate_submission(id, &input.student_name, input.question_number, input.mode)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn evaluate_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<EvaluateAnswerInput>,
) -> ApiResult<(StatusCode, Json<EvaluationResult>)> {
    let result = state
        .manager
        .evaluate_answer(
            id,
            input.question_number,
            &input.student_name,
            &input.answer_text,
            input.mode,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Records marks entered by hand.
pub async fn record_evaluation(
    State(state): State<AppState>,
    Json(input): Json<NewEvaluation>,
) -> ApiResult<(StatusCode, Json<EvaluationResult>)> {
    let result = state.db.record_evaluation(input)?;
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn list_evaluations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<EvaluationQuery>,
) -> ApiResult<Json<Vec<EvaluationResult>>> {
    let evaluations = match query.student.as_deref().map(str::trim) {
        Some(fragment) if !fragment.is_empty() => state.db.search_evaluations(id, fragment)?,
        _ => state.db.list_evaluations(id)?,
    };
    Ok(Json(evaluations))
}

pub async fn evaluation_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<EvaluationResult>>> {
    state.db.load_assignment(id)?;
    Ok(Json(state.db.evaluation_history(
        id,
        query.student.trim(),
        query.question,
    )?))
}

pub async fn student_totals(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StudentTotal>>> {
    Ok(Json(state.manager.student_totals(id)?))
}

pub async fn statistics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AssignmentStatistics>> {
    Ok(Json(state.db.assignment_statistics(id)?))
}

pub async fn analytics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AnalyticsReport>> {
    let evaluations = state.db.list_evaluations(id)?;
    let totals = crate::scoring::combine(&evaluations);

    Ok(Json(AnalyticsReport {
        class: analytics::class_performance(&totals),
        criteria: analytics::criterion_averages(&evaluations),
        questions: analytics::question_breakdown(&evaluations),
        struggling: analytics::struggling_students(&totals, analytics::PASS_PERCENTAGE),
        top_performers: analytics::top_performers(&totals, TOP_PERFORMER_PERCENTAGE),
    }))
}

pub async fn similarity_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SimilarityQuery>,
) -> ApiResult<Json<SimilarityReport>> {
    state.db.load_assignment(id)?;
    let students = StudentAnswers::group(&state.db.list_submissions(id)?);

    let matrix = match query.question {
        Some(question) => similarity::question_similarity_matrix(&students, question),
        None => similarity::similarity_matrix(&students),
    };
    let threshold = query
        .threshold
        .unwrap_or(similarity::DEFAULT_SUSPICIOUS_THRESHOLD);
    let suspicious_pairs = matrix
        .as_ref()
        .map(|m| similarity::suspicious_pairs(m, threshold))
        .unwrap_or_default();

    Ok(Json(SimilarityReport {
        matrix,
        suspicious_pairs,
    }))
}

// ============================================================
// Generation
// ============================================================

pub async fn suggest_rubric(
    State(state): State<AppState>,
    Json(input): Json<SuggestRubricInput>,
) -> ApiResult<Json<Rubric>> {
    Ok(Json(state.manager.suggest_rubric(&input.questions).await?))
}

pub async fn model_answer(
    State(state): State<AppState>,
    Path((id, question_number)): Path<(Uuid, u32)>,
) -> ApiResult<Json<ModelAnswer>> {
    let answer = state.manager.model_answer(id, question_number).await?;
    Ok(Json(ModelAnswer {
        question_number,
        answer,
    }))
}

// ============================================================
// Live tests
// ============================================================

pub async fn create_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateTestInput>,
) -> ApiResult<(StatusCode, Json<LiveTest>)> {
    let test = state.tests.create_test(id, input.closes_at)?;
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn list_tests(State(state): State<AppState>) -> ApiResult<Json<Vec<LiveTest>>> {
    Ok(Json(state.tests.list_tests()?))
}

pub async fn close_test(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<LiveTest>> {
    Ok(Json(state.tests.close_test(&code)?))
}

pub async fn test_submissions(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<Submission>>> {
    Ok(Json(state.tests.submissions(&code)?))
}

pub async fn export_test(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let body = state.tests.export_csv(&code)?;
    Ok(csv_response(&slug(&code), body))
}

// ============================================================
// Student portal
// ============================================================

pub async fn test_status(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<TestStatusResponse>> {
    Ok(Json(state.tests.status(&code)?))
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Json(input): Json<SubmitAnswerInput>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    let submission = state.tests.submit(input)?;
    Ok((StatusCode::CREATED, Json(submission)))
}
