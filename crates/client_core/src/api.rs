//! Remote capabilities consumed by the controllers and their HTTP
//! implementation against the quiz backend.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{TopicId, User, UserId},
    error::ApiException,
    protocol::{
        LoginRequest, LoginResponse, MessageResponse, PaymentIntentForm, PaymentIntentResponse,
        ProfileData, ProfileResponse, QuizApiResponse, QuizHistoryItem, QuizHistoryResponse,
        QuizQuestionDto, RegisterRequest, SubmitQuizRequest, TopicsResponse,
        UpdateInterestsRequest,
    },
};
use tracing::debug;
use url::Url;

const LOGIN_SUCCESS_MESSAGE: &str = "Login successful";

/// Quiz operations the session, topics, history and results controllers use.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    async fn fetch_quiz(&self, topic: &TopicId, user_id: &UserId) -> Result<Vec<QuizQuestionDto>>;
    async fn fetch_topics(&self, user_id: &UserId) -> Result<Vec<String>>;
    async fn submit_quiz(&self, submission: &SubmitQuizRequest) -> Result<()>;
    async fn fetch_history(&self, user_id: &UserId) -> Result<Vec<QuizHistoryItem>>;
    async fn fetch_profile(&self, user_id: &UserId) -> Result<ProfileData>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<User>;
    async fn register(&self, request: &RegisterRequest) -> Result<()>;
    async fn update_interests(&self, user_id: &UserId, interests: &[String]) -> Result<()>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount: f64,
        currency: &str,
    ) -> Result<PaymentIntentResponse>;
}

pub struct HttpApiClient {
    http: Client,
    base_url: String,
    payment_base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self {
            http: Client::new(),
            payment_base_url: base_url.clone(),
            base_url,
        })
    }

    /// Routes `create-payment-intent` to a separate payment backend.
    pub fn with_payment_base_url(mut self, payment_base_url: &str) -> Result<Self> {
        self.payment_base_url = normalize_base_url(payment_base_url)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim()).with_context(|| format!("invalid base url '{raw}'"))?;
    if parsed.cannot_be_a_base() {
        return Err(anyhow!("base url '{raw}' cannot carry paths"));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiException::from_body(status.as_u16(), &body))
            .with_context(|| format!("{what} rejected by server"));
    }
    response
        .json::<T>()
        .await
        .with_context(|| format!("malformed {what} response"))
}

#[async_trait]
impl QuizRepository for HttpApiClient {
    async fn fetch_quiz(&self, topic: &TopicId, user_id: &UserId) -> Result<Vec<QuizQuestionDto>> {
        debug!(topic = %topic, user_id = %user_id, "fetching quiz");
        let response = self
            .http
            .get(self.endpoint("getQuiz"))
            .query(&[("topic", topic.as_str()), ("user_id", user_id.as_str())])
            .send()
            .await
            .context("failed to fetch quiz")?;
        let body: QuizApiResponse = decode(response, "quiz").await?;
        Ok(body.quiz)
    }

    async fn fetch_topics(&self, user_id: &UserId) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.endpoint("getAvailableTopics"))
            .query(&[("user_id", user_id.as_str())])
            .send()
            .await
            .context("failed to fetch topics")?;
        let body: TopicsResponse = decode(response, "topics").await?;
        Ok(body.topics)
    }

    async fn submit_quiz(&self, submission: &SubmitQuizRequest) -> Result<()> {
        debug!(
            topic = %submission.topic,
            user_id = %submission.user_id,
            score = submission.score,
            "submitting quiz"
        );
        let response = self
            .http
            .post(self.endpoint("submitQuiz"))
            .json(submission)
            .send()
            .await
            .context("failed to submit quiz")?;
        let body: MessageResponse = decode(response, "submission").await?;
        if body.message.to_ascii_lowercase().contains("success") {
            Ok(())
        } else {
            Err(anyhow!("submission not recorded: {}", body.message))
        }
    }

    async fn fetch_history(&self, user_id: &UserId) -> Result<Vec<QuizHistoryItem>> {
        let response = self
            .http
            .get(self.endpoint("getQuizHistory"))
            .query(&[("user_id", user_id.as_str())])
            .send()
            .await
            .context("failed to fetch quiz history")?;
        let body: QuizHistoryResponse = decode(response, "history").await?;
        Ok(body.history)
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<ProfileData> {
        let response = self
            .http
            .get(self.endpoint("profile"))
            .query(&[("user_id", user_id.as_str())])
            .send()
            .await
            .context("failed to fetch profile")?;
        let body: ProfileResponse = decode(response, "profile").await?;
        Ok(body.profile)
    }
}

#[async_trait]
impl AccountRepository for HttpApiClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let response = self
            .http
            .post(self.endpoint("login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .context("failed to reach login endpoint")?;
        let body: LoginResponse = decode(response, "login").await?;
        if body.message != LOGIN_SUCCESS_MESSAGE {
            return Err(anyhow!("login refused: {}", body.message));
        }
        Ok(body.user)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("register"))
            .json(request)
            .send()
            .await
            .context("failed to reach register endpoint")?;
        let _: MessageResponse = decode(response, "registration").await?;
        Ok(())
    }

    async fn update_interests(&self, user_id: &UserId, interests: &[String]) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("updateInterests"))
            .json(&UpdateInterestsRequest {
                user_id: user_id.to_string(),
                interests: interests.to_vec(),
            })
            .send()
            .await
            .context("failed to update interests")?;
        let _: MessageResponse = decode(response, "interests").await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for HttpApiClient {
    async fn create_payment_intent(
        &self,
        amount: f64,
        currency: &str,
    ) -> Result<PaymentIntentResponse> {
        if !amount.is_finite() || amount.round() < 1.0 {
            return Err(anyhow!("invalid payment amount {amount}"));
        }
        // The backend takes whole currency units and converts to cents itself.
        let form = PaymentIntentForm {
            amount: amount.round() as i64,
            currency: currency.to_string(),
        };
        let response = self
            .http
            .post(format!("{}/create-payment-intent", self.payment_base_url))
            .form(&form)
            .send()
            .await
            .context("failed to create payment intent")?;
        decode(response, "payment intent").await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
