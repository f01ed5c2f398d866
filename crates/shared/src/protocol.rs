//! JSON and form payloads exchanged with the quiz backend.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::User;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestionDto {
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "correct_answer")]
    pub correct_answer_letter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizApiResponse {
    pub quiz: Vec<QuizQuestionDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInterestsRequest {
    pub user_id: String,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitQuizRequest {
    pub user_id: String,
    pub topic: String,
    pub score: u32,
    pub total_questions: u32,
    pub questions: Vec<QuizQuestionDto>,
    pub user_answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizHistoryItem {
    #[serde(default)]
    pub id: Option<String>,
    pub topic: String,
    pub score: u32,
    pub total_questions: u32,
    pub questions: Vec<QuizQuestionDto>,
    pub user_answers: Vec<String>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizHistoryResponse {
    pub history: Vec<QuizHistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    pub quizzes_done: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub profile: ProfileData,
}

/// Form body of `POST /create-payment-intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentForm {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub publishable_key: String,
    pub payment_intent: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub ephemeral_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_history_with_python_isoformat_timestamps() {
        let raw = r#"{
            "history": [{
                "topic": "algebra",
                "score": 1,
                "total_questions": 2,
                "questions": [{"question": "1+1?", "options": ["1","2"], "correct_answer": "B"}],
                "user_answers": ["B", ""],
                "timestamp": "2024-05-01T12:34:56.123456"
            }]
        }"#;
        let parsed: QuizHistoryResponse = serde_json::from_str(raw).expect("decode history");
        let item = &parsed.history[0];
        assert_eq!(item.id, None);
        assert_eq!(item.questions[0].correct_answer_letter, "B");
        assert_eq!(item.timestamp.to_string(), "2024-05-01 12:34:56.123456");
    }

    #[test]
    fn payment_intent_uses_camel_case_keys() {
        let raw = r#"{"paymentIntent":"pi_secret","ephemeralKey":"ek","customer":"cus_1","publishableKey":"pk_test"}"#;
        let parsed: PaymentIntentResponse = serde_json::from_str(raw).expect("decode intent");
        assert_eq!(parsed.payment_intent, "pi_secret");
        assert_eq!(parsed.customer.as_deref(), Some("cus_1"));
    }
}
