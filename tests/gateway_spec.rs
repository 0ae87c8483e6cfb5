use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use rubriq::config::GatewayConfig;
use rubriq::gateway::{Evaluator, GatewayError, GroqGateway, MalformedResponse};
use rubriq::models::{Criterion, EvaluationMode, Rubric};
use serde_json::{json, Value};

/// What the stub replies with.
#[derive(Clone)]
enum Reply {
    Content(String),
    Status(StatusCode, String),
    Stall(Duration),
    Html(String),
}

#[derive(Clone)]
struct Stub {
    reply: Reply,
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn chat_completions(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    stub.requests.lock().unwrap().push((auth, body));

    match stub.reply {
        Reply::Content(content) => Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
        .into_response(),
        Reply::Status(status, body) => (status, body).into_response(),
        Reply::Html(page) => axum::response::Html(page).into_response(),
        Reply::Stall(delay) => {
            tokio::time::sleep(delay).await;
            Json(json!({ "choices": [] })).into_response()
        }
    }
}

/// Starts a chat-completions stub and a gateway pointed at it.
async fn gateway(reply: Reply, timeout: Duration) -> (GroqGateway, Stub) {
    let stub = Stub {
        reply,
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = GatewayConfig::from_lookup(|key| match key {
        "GROQ_API_KEY" => Some("stub-key".to_string()),
        "GROQ_BASE_URL" => Some(format!("http://{}/v1", addr)),
        "GROQ_MODEL" => Some("stub-model".to_string()),
        _ => None,
    })
    .unwrap()
    .with_timeout(timeout);

    (GroqGateway::new(config), stub)
}

fn rubric() -> Rubric {
    Rubric::new(vec![
        Criterion::new("Understanding", 5.0),
        Criterion::new("Accuracy", 5.0),
    ])
}

const QUESTION: &str = "What is photosynthesis?";
const ANSWER: &str = "Plants turn light into chemical energy.";

mod evaluate {
    use super::*;

    #[tokio::test]
    async fn parses_a_well_formed_reply() {
        let content = json!({
            "scores": [
                { "criterion": "Understanding", "awarded": 4, "reason": "Clear" },
                { "criterion": "Accuracy", "awarded": "3.5", "reason": "Mostly right" }
            ],
            "feedback": ["Mention chlorophyll"],
            "confidence": "High"
        })
        .to_string();
        let (gateway, stub) = gateway(Reply::Content(content), Duration::from_secs(5)).await;

        let evaluation = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Strict)
            .await
            .expect("evaluation succeeds");

        assert_eq!(evaluation.scores[0].awarded, 4.0);
        assert_eq!(evaluation.scores[1].awarded, 3.5);
        assert_eq!(evaluation.scores[1].max_marks, 5.0);
        assert_eq!(evaluation.feedback, vec!["Mention chlorophyll"]);
        assert_eq!(evaluation.confidence.as_deref(), Some("high"));

        let requests = stub.requests.lock().unwrap();
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer stub-key"));
        assert_eq!(body["model"], "stub-model");
        assert_eq!(body["response_format"]["type"], "json_object");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains(QUESTION));
        assert!(user.contains(ANSWER));
    }

    #[tokio::test]
    async fn tolerates_code_fences() {
        let content = format!(
            "```json\n{}\n```",
            json!({
                "scores": [
                    { "criterion": "understanding", "awarded": 5 },
                    { "criterion": "ACCURACY", "awarded": 0 }
                ]
            })
        );
        let (gateway, _) = gateway(Reply::Content(content), Duration::from_secs(5)).await;

        let evaluation = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .expect("evaluation succeeds");

        assert_eq!(evaluation.scores[0].criterion, "Understanding");
        assert_eq!(evaluation.scores[1].criterion, "Accuracy");
    }

    #[tokio::test]
    async fn rejects_marks_above_maximum() {
        let content = json!({
            "scores": [
                { "criterion": "Understanding", "awarded": 7 },
                { "criterion": "Accuracy", "awarded": 2 }
            ]
        })
        .to_string();
        let (gateway, _) = gateway(Reply::Content(content), Duration::from_secs(5)).await;

        let err = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Malformed(MalformedResponse::MarkAboveMax { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_a_missing_criterion() {
        let content = json!({
            "scores": [{ "criterion": "Understanding", "awarded": 3 }]
        })
        .to_string();
        let (gateway, _) = gateway(Reply::Content(content), Duration::from_secs(5)).await;

        let err = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Malformed(MalformedResponse::MissingCriterion(ref name)) if name == "Accuracy"
        ));
    }

    #[tokio::test]
    async fn rejects_prose() {
        let (gateway, _) = gateway(
            Reply::Content("I think this answer deserves full marks.".to_string()),
            Duration::from_secs(5),
        )
        .await;

        let err = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Malformed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn rejects_a_success_status_with_an_html_body() {
        let (gateway, _) = gateway(
            Reply::Html("<html>upstream proxy page</html>".to_string()),
            Duration::from_secs(5),
        )
        .await;

        let err = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Malformed(MalformedResponse::NotJson(_))
        ));
        assert_eq!(err.kind(), "malformed");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn reports_server_errors() {
        let (gateway, _) = gateway(
            Reply::Status(StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string()),
            Duration::from_secs(5),
        )
        .await;

        let err = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .unwrap_err();

        match &err {
            GatewayError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn times_out() {
        let (gateway, _) = gateway(
            Reply::Stall(Duration::from_secs(5)),
            Duration::from_millis(100),
        )
        .await;

        let err = gateway
            .evaluate(QUESTION, &rubric(), ANSWER, EvaluationMode::Moderate)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Timeout(d) if d == Duration::from_millis(100)));
        assert_eq!(err.kind(), "timeout");
    }
}

mod generation {
    use super::*;

    #[tokio::test]
    async fn suggests_a_rubric() {
        let content = json!({
            "criteria": [
                { "criterion": "Understanding", "marks": 6 },
                { "criterion": "Examples", "marks": "4" }
            ]
        })
        .to_string();
        let (gateway, _) = gateway(Reply::Content(content), Duration::from_secs(5)).await;

        let rubric = gateway
            .generate_rubric(&[QUESTION.to_string()])
            .await
            .expect("rubric parses");

        assert_eq!(rubric.len(), 2);
        assert_eq!(rubric.total(), 10.0);
    }

    #[tokio::test]
    async fn rejects_a_rubric_with_zero_marks() {
        let content = json!([{ "criterion": "Understanding", "marks": 0 }]).to_string();
        let (gateway, _) = gateway(Reply::Content(content), Duration::from_secs(5)).await;

        let err = gateway.generate_rubric(&[QUESTION.to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Malformed(MalformedResponse::InvalidRubric(_))
        ));
    }

    #[tokio::test]
    async fn writes_a_model_answer_as_plain_text() {
        let (gateway, stub) = gateway(
            Reply::Content("  Photosynthesis converts light energy.  ".to_string()),
            Duration::from_secs(5),
        )
        .await;

        let answer = gateway
            .generate_model_answer(QUESTION, &rubric())
            .await
            .expect("answer");

        assert_eq!(answer, "Photosynthesis converts light energy.");
        let requests = stub.requests.lock().unwrap();
        assert!(requests[0].1.get("response_format").is_none());
    }

    #[tokio::test]
    async fn rejects_an_empty_model_answer() {
        let (gateway, _) = gateway(Reply::Content("   ".to_string()), Duration::from_secs(5)).await;

        let err = gateway
            .generate_model_answer(QUESTION, &rubric())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(MalformedResponse::Empty)));
    }
}
