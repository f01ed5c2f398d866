use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::{json, Value};
use shared::error::ErrorCode;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BackendState {
    quiz_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    submissions: Arc<Mutex<Vec<SubmitQuizRequest>>>,
    submit_message: Arc<Mutex<String>>,
    payment_forms: Arc<Mutex<Vec<PaymentIntentForm>>>,
    registrations: Arc<Mutex<Vec<RegisterRequest>>>,
    interest_updates: Arc<Mutex<Vec<UpdateInterestsRequest>>>,
}

async fn handle_get_quiz(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.quiz_queries.lock().await.push(query);
    Json(json!({
        "quiz": [
            {"question": "2+2?", "options": ["3", "4", "5", "6"], "correct_answer": "B"},
            {"question": "3+3?", "options": ["6", "7", "8", "9"], "correct_answer": "A"}
        ]
    }))
}

async fn handle_submit(
    State(state): State<BackendState>,
    Json(submission): Json<SubmitQuizRequest>,
) -> Json<Value> {
    state.submissions.lock().await.push(submission);
    let message = state.submit_message.lock().await.clone();
    Json(json!({ "message": message }))
}

async fn handle_history() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "User not found" })),
    )
}

async fn handle_login(Json(request): Json<LoginRequest>) -> (StatusCode, Json<Value>) {
    if request.password == "secret" {
        (
            StatusCode::OK,
            Json(json!({
                "message": "Login successful",
                "user": {"username": request.username, "interests": ["algebra"], "isPremium": true}
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid username or password" })),
        )
    }
}

async fn handle_register(
    State(state): State<BackendState>,
    Json(request): Json<RegisterRequest>,
) -> (StatusCode, Json<Value>) {
    if request.username == "alice" {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Username already exists" })),
        );
    }
    state.registrations.lock().await.push(request);
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Registration successful" })),
    )
}

async fn handle_update_interests(
    State(state): State<BackendState>,
    Json(request): Json<UpdateInterestsRequest>,
) -> Json<Value> {
    state.interest_updates.lock().await.push(request);
    Json(json!({ "message": "Interests updated successfully" }))
}

async fn handle_payment_intent(
    State(state): State<BackendState>,
    Form(form): Form<PaymentIntentForm>,
) -> Json<Value> {
    state.payment_forms.lock().await.push(form);
    Json(json!({
        "paymentIntent": "pi_123_secret_456",
        "ephemeralKey": "ek_test",
        "customer": "cus_789",
        "publishableKey": "pk_test"
    }))
}

async fn spawn_backend() -> Result<(String, BackendState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BackendState::default();
    *state.submit_message.lock().await = "Quiz submitted successfully".to_string();
    let app = Router::new()
        .route("/getQuiz", get(handle_get_quiz))
        .route("/submitQuiz", post(handle_submit))
        .route("/getQuizHistory", get(handle_history))
        .route("/login", post(handle_login))
        .route("/register", post(handle_register))
        .route("/updateInterests", post(handle_update_interests))
        .route("/create-payment-intent", post(handle_payment_intent))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn submission() -> SubmitQuizRequest {
    SubmitQuizRequest {
        user_id: "alice".to_string(),
        topic: "math".to_string(),
        score: 1,
        total_questions: 2,
        questions: Vec::new(),
        user_answers: vec!["B".to_string(), String::new()],
    }
}

#[test]
fn base_url_is_normalized() {
    let client = HttpApiClient::new("http://127.0.0.1:5002/").expect("valid url");
    assert_eq!(client.base_url(), "http://127.0.0.1:5002");
    assert_eq!(client.endpoint("getQuiz"), "http://127.0.0.1:5002/getQuiz");
    assert!(HttpApiClient::new("not a url").is_err());
}

#[tokio::test]
async fn fetch_quiz_sends_topic_and_user_id() {
    let (url, state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new(&url).expect("client");

    let quiz = client
        .fetch_quiz(&TopicId::from("math"), &UserId::from("alice"))
        .await
        .expect("quiz");

    assert_eq!(quiz.len(), 2);
    assert_eq!(quiz[0].correct_answer_letter, "B");
    let queries = state.quiz_queries.lock().await;
    assert_eq!(queries[0].get("topic").map(String::as_str), Some("math"));
    assert_eq!(queries[0].get("user_id").map(String::as_str), Some("alice"));
}

#[tokio::test]
async fn submit_quiz_requires_success_message() {
    let (url, state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new(&url).expect("client");

    client.submit_quiz(&submission()).await.expect("accepted");
    assert_eq!(state.submissions.lock().await[0], submission());

    *state.submit_message.lock().await = "Database unavailable".to_string();
    let err = client
        .submit_quiz(&submission())
        .await
        .expect_err("message without success is a failure");
    assert!(err.to_string().contains("Database unavailable"));
}

#[tokio::test]
async fn error_envelope_surfaces_as_api_exception() {
    let (url, _state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new(&url).expect("client");

    let err = client
        .fetch_history(&UserId::from("ghost"))
        .await
        .expect_err("unknown user");
    let exception = err
        .downcast_ref::<ApiException>()
        .expect("api exception in chain");
    assert_eq!(exception.code, ErrorCode::NotFound);
    assert_eq!(exception.message, "User not found");
}

#[tokio::test]
async fn authenticate_returns_user_or_rejection() {
    let (url, _state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new(&url).expect("client");

    let user = client.authenticate("alice", "secret").await.expect("login");
    assert_eq!(user.username, "alice");
    assert!(user.is_premium);

    let err = client
        .authenticate("alice", "wrong")
        .await
        .expect_err("bad password");
    let exception = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(exception.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn register_omits_blank_optionals_and_surfaces_conflicts() {
    let (url, state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new(&url).expect("client");

    let request = RegisterRequest {
        username: "bob".to_string(),
        password: "pw".to_string(),
        email: None,
        phone: Some("555-0100".to_string()),
    };
    client.register(&request).await.expect("registered");
    let registrations = state.registrations.lock().await;
    assert_eq!(registrations[0].username, "bob");
    assert_eq!(registrations[0].email, None);
    assert_eq!(registrations[0].phone.as_deref(), Some("555-0100"));
    drop(registrations);

    let taken = RegisterRequest {
        username: "alice".to_string(),
        ..request
    };
    let err = client.register(&taken).await.expect_err("name taken");
    let exception = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(exception.status, 409);
    assert_eq!(exception.message, "Username already exists");
}

#[tokio::test]
async fn update_interests_posts_user_and_names() {
    let (url, state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new(&url).expect("client");

    client
        .update_interests(&UserId::from("bob"), &["Data Science".to_string()])
        .await
        .expect("saved");

    let updates = state.interest_updates.lock().await;
    assert_eq!(updates[0].user_id, "bob");
    assert_eq!(updates[0].interests, ["Data Science"]);
}

#[tokio::test]
async fn payment_intent_is_posted_as_form_in_whole_units() {
    let (url, state) = spawn_backend().await.expect("spawn backend");
    let client = HttpApiClient::new("http://127.0.0.1:9")
        .and_then(|client| client.with_payment_base_url(&url))
        .expect("client");

    let intent = client
        .create_payment_intent(9.6, "usd")
        .await
        .expect("intent");

    assert_eq!(intent.payment_intent, "pi_123_secret_456");
    assert_eq!(intent.publishable_key, "pk_test");
    let forms = state.payment_forms.lock().await;
    assert_eq!(forms[0].amount, 10);
    assert_eq!(forms[0].currency, "usd");
}

#[tokio::test]
async fn payment_intent_rejects_invalid_amounts_locally() {
    let client = HttpApiClient::new("http://127.0.0.1:9").expect("client");
    assert!(client.create_payment_intent(f64::NAN, "usd").await.is_err());
    assert!(client.create_payment_intent(-1.0, "usd").await.is_err());
    assert!(client.create_payment_intent(0.3, "usd").await.is_err());
}
