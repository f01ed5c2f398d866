use super::*;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{TopicId, UserId},
    protocol::{ProfileData, QuizQuestionDto, SubmitQuizRequest},
};
use tokio::sync::Mutex;

struct TestHistory {
    history: Vec<QuizHistoryItem>,
    fetches: Arc<Mutex<u32>>,
}

impl TestHistory {
    fn new(history: Vec<QuizHistoryItem>) -> Self {
        Self {
            history,
            fetches: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl QuizRepository for TestHistory {
    async fn fetch_quiz(&self, _topic: &TopicId, _user_id: &UserId) -> Result<Vec<QuizQuestionDto>> {
        Ok(Vec::new())
    }

    async fn fetch_topics(&self, _user_id: &UserId) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn submit_quiz(&self, _submission: &SubmitQuizRequest) -> Result<()> {
        Ok(())
    }

    async fn fetch_history(&self, _user_id: &UserId) -> Result<Vec<QuizHistoryItem>> {
        *self.fetches.lock().await += 1;
        Ok(self.history.clone())
    }

    async fn fetch_profile(&self, _user_id: &UserId) -> Result<ProfileData> {
        Err(anyhow!("profile not served in this test"))
    }
}

fn attempt(topic: &str, score: u32, answers: &[&str], day: u32) -> QuizHistoryItem {
    QuizHistoryItem {
        id: None,
        topic: topic.to_string(),
        score,
        total_questions: 2,
        questions: vec![
            QuizQuestionDto {
                question: "2+2?".to_string(),
                options: vec!["3".into(), "4".into()],
                correct_answer_letter: "B".to_string(),
            },
            QuizQuestionDto {
                question: "3+3?".to_string(),
                options: vec!["6".into(), "7".into()],
                correct_answer_letter: "A".to_string(),
            },
        ],
        user_answers: answers.iter().map(|answer| answer.to_string()).collect(),
        timestamp: NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|date| date.and_hms_opt(8, 0, 0))
            .expect("valid timestamp"),
    }
}

async fn wait_until(
    states: &mut StateSubscription<ResultsState>,
    done: impl Fn(&ResultsState) -> bool,
) -> ResultsState {
    loop {
        let state = tokio::time::timeout(Duration::from_secs(2), states.next())
            .await
            .expect("state within timeout")
            .expect("controller still open");
        if done(&state) {
            return state;
        }
    }
}

#[tokio::test]
async fn shows_most_recent_attempt_for_topic() {
    let repository = Arc::new(TestHistory::new(vec![
        attempt("math", 0, &["A", "B"], 1),
        attempt("history", 2, &["B", "A"], 2),
        attempt("math", 1, &["B"], 3),
    ]));
    let controller = ResultsController::new(repository);
    let mut states = controller.subscribe();

    controller.initialize("math", "alice").expect("dispatch");
    let loaded =
        wait_until(&mut states, |state| matches!(state, ResultsState::Loaded { .. })).await;
    let ResultsState::Loaded { results, .. } = loaded else {
        unreachable!()
    };

    assert_eq!(results.title, "Results: math");
    assert_eq!((results.score, results.total), (1, 2));
    assert_eq!(results.rows.len(), 2);
    assert_eq!(results.rows[0].number, 1);
    assert!(results.rows[0].is_correct());
    assert_eq!(results.rows[1].number, 2);
    assert_eq!(results.rows[1].user_answer, "");
    assert!(!results.rows[1].is_correct());
}

#[tokio::test]
async fn missing_topic_is_not_found() {
    let controller = ResultsController::new(Arc::new(TestHistory::new(vec![attempt(
        "history",
        2,
        &["B", "A"],
        1,
    )])));
    let mut states = controller.subscribe();
    let mut effects = controller.side_effects();

    controller.initialize("math", "alice").expect("dispatch");
    let failed =
        wait_until(&mut states, |state| matches!(state, ResultsState::Failed { .. })).await;
    assert!(matches!(
        failed,
        ResultsState::Failed {
            error: ClientError::NotFound(_),
            ..
        }
    ));
    let ResultsEffect::ShowMessage(message) = effects.recv().await.expect("effect");
    assert_eq!(message, "Failed to load results: no results for topic math");
}

#[tokio::test]
async fn same_pair_is_loaded_once() {
    let repository = Arc::new(TestHistory::new(vec![attempt("math", 2, &["B", "A"], 1)]));
    let fetches = Arc::clone(&repository.fetches);
    let controller = ResultsController::new(repository);
    let mut states = controller.subscribe();

    controller.initialize("math", "alice").expect("dispatch");
    controller.initialize("math", "alice").expect("dispatch");
    wait_until(&mut states, |state| matches!(state, ResultsState::Loaded { .. })).await;
    controller.initialize("math", "alice").expect("dispatch");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*fetches.lock().await, 1);
}

#[tokio::test]
async fn blank_identifiers_fail_validation() {
    let repository = Arc::new(TestHistory::new(Vec::new()));
    let fetches = Arc::clone(&repository.fetches);
    let controller = ResultsController::new(repository);
    let mut states = controller.subscribe();

    controller.initialize("math", "").expect("dispatch");
    let failed =
        wait_until(&mut states, |state| matches!(state, ResultsState::Failed { .. })).await;
    assert!(matches!(
        failed,
        ResultsState::Failed {
            error: ClientError::Validation { field: "user id" },
            ..
        }
    ));
    assert_eq!(*fetches.lock().await, 0);
}
