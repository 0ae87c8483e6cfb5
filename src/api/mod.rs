mod error;
mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;
use crate::gateway::Evaluator;
use crate::grading::AssignmentManager;
use crate::hosting::TestRegistry;

pub use error::ApiError;
pub use handlers::{
    AnalyticsReport, EvaluateAnswerInput, EvaluateSubmissionInput, ImportCsvInput, ModelAnswer,
    SimilarityReport, SuggestRubricInput,
};
pub use middleware::{RateLimiter, SecurityConfig, DEFAULT_SUBMIT_RATE_LIMIT};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub manager: AssignmentManager,
    pub tests: TestRegistry,
}

impl AppState {
    pub fn new(db: Database, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            manager: AssignmentManager::new(db.clone(), evaluator),
            tests: TestRegistry::new(db.clone()),
            db,
        }
    }
}

/// Router with no authentication and no submission limit.
pub fn create_router(state: AppState) -> Router {
    create_router_with_config(state, SecurityConfig::disabled())
}

pub fn create_router_with_config(state: AppState, config: SecurityConfig) -> Router {
    let teacher = Router::new()
        // Assignments
        .route(
            "/assignments",
            get(handlers::list_assignments).post(handlers::create_assignment),
        )
        .route("/assignments/import", post(handlers::import_assignment))
        .route(
            "/assignments/{id}",
            get(handlers::get_assignment)
                .put(handlers::rename_assignment)
                .delete(handlers::delete_assignment),
        )
        .route("/assignments/{id}/submissions", get(handlers::list_submissions))
        .route("/assignments/{id}/status", get(handlers::evaluation_status))
        .route("/assignments/{id}/export", get(handlers::export_assignment))
        // Evaluation
        .route("/assignments/{id}/evaluate", post(handlers::evaluate_all))
        .route("/assignments/{id}/evaluate-one", post(handlers::evaluate_submission))
        .route("/assignments/{id}/answers", post(handlers::evaluate_answer))
        .route("/assignments/{id}/evaluations", get(handlers::list_evaluations))
        .route(
            "/assignments/{id}/evaluations/history",
            get(handlers::evaluation_history),
        )
        .route("/assignments/{id}/totals", get(handlers::student_totals))
        .route("/assignments/{id}/statistics", get(handlers::statistics))
        .route("/assignments/{id}/analytics", get(handlers::analytics))
        .route("/assignments/{id}/similarity", get(handlers::similarity_report))
        .route(
            "/assignments/{id}/questions/{number}/model-answer",
            get(handlers::model_answer),
        )
        .route("/evaluations", post(handlers::record_evaluation))
        .route("/rubrics/suggest", post(handlers::suggest_rubric))
        // Live tests
        .route("/assignments/{id}/tests", post(handlers::create_test))
        .route("/tests", get(handlers::list_tests))
        .route("/tests/{code}/close", post(handlers::close_test))
        .route("/tests/{code}/submissions", get(handlers::test_submissions))
        .route("/tests/{code}/export", get(handlers::export_test))
        .route_layer(from_fn_with_state(config.clone(), middleware::auth_middleware));

    let mut submit = Router::new().route("/submit", post(handlers::submit_answer));
    if let Some(limiter) = config.submit_limiter.clone() {
        submit = submit.route_layer(from_fn_with_state(limiter, middleware::rate_limit_middleware));
    }

    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/template", get(handlers::template))
        .route("/tests/{code}", get(handlers::test_status))
        .merge(submit);

    Router::new()
        .nest("/api/v1", teacher.merge(public))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
        .with_state(state)
}

fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let Some(origins) = &config.cors_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
