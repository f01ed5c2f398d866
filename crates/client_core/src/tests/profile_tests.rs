use super::*;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::TopicId,
    protocol::{QuizHistoryItem, QuizQuestionDto, SubmitQuizRequest},
};
use tokio::sync::Mutex;

struct TestProfiles {
    profile: Option<ProfileData>,
    requested_for: Arc<Mutex<Vec<UserId>>>,
}

impl TestProfiles {
    fn serving(profile: ProfileData) -> Self {
        Self {
            profile: Some(profile),
            requested_for: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn unreachable() -> Self {
        Self {
            profile: None,
            requested_for: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl QuizRepository for TestProfiles {
    async fn fetch_quiz(
        &self,
        _topic: &TopicId,
        _user_id: &UserId,
    ) -> Result<Vec<QuizQuestionDto>> {
        Ok(Vec::new())
    }

    async fn fetch_topics(&self, _user_id: &UserId) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn submit_quiz(&self, _submission: &SubmitQuizRequest) -> Result<()> {
        Ok(())
    }

    async fn fetch_history(&self, _user_id: &UserId) -> Result<Vec<QuizHistoryItem>> {
        Ok(Vec::new())
    }

    async fn fetch_profile(&self, user_id: &UserId) -> Result<ProfileData> {
        self.requested_for.lock().await.push(user_id.clone());
        self.profile
            .clone()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

fn alice() -> ProfileData {
    ProfileData {
        username: "alice".to_string(),
        email: Some("alice@example.com".to_string()),
        phone: None,
        interests: vec!["Data Science".to_string()],
        created_at: None,
        quizzes_done: 1,
        correct_answers: 2,
        incorrect_answers: 3,
    }
}

async fn wait_until(
    states: &mut StateSubscription<ProfileState>,
    done: impl Fn(&ProfileState) -> bool,
) -> ProfileState {
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
async fn profile_loads_for_the_user() {
    let repository = Arc::new(TestProfiles::serving(alice()));
    let requested_for = Arc::clone(&repository.requested_for);
    let controller = ProfileController::new(repository);
    let mut states = controller.subscribe();

    controller.load("alice").expect("dispatch");
    let loaded = wait_until(&mut states, |state| {
        matches!(state, ProfileState::Loaded { .. })
    })
    .await;
    assert_eq!(
        loaded,
        ProfileState::Loaded {
            user_id: UserId::from("alice"),
            profile: alice(),
        }
    );
    assert_eq!(*requested_for.lock().await, [UserId::from("alice")]);
}

#[tokio::test]
async fn history_stats_replace_server_counters() {
    let controller = ProfileController::new(Arc::new(TestProfiles::serving(alice())));
    let mut states = controller.subscribe();

    controller.load("alice").expect("dispatch");
    wait_until(&mut states, |state| {
        matches!(state, ProfileState::Loaded { .. })
    })
    .await;
    controller
        .dispatch(ProfileIntent::ApplyStats(ProfileStats {
            quizzes_done: 4,
            correct_answers: 10,
            incorrect_answers: 6,
        }))
        .expect("dispatch");

    let updated = wait_until(&mut states, |state| {
        matches!(state, ProfileState::Loaded { profile, .. } if profile.quizzes_done == 4)
    })
    .await;
    let ProfileState::Loaded { profile, .. } = updated else {
        unreachable!()
    };
    assert_eq!(
        (profile.correct_answers, profile.incorrect_answers),
        (10, 6)
    );
    assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
}

#[tokio::test]
async fn stats_before_load_are_ignored() {
    let controller = ProfileController::new(Arc::new(TestProfiles::serving(alice())));
    controller
        .dispatch(ProfileIntent::ApplyStats(ProfileStats::default()))
        .expect("dispatch");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.state(), ProfileState::Idle);
}

#[tokio::test]
async fn failure_is_reported_once() {
    let controller = ProfileController::new(Arc::new(TestProfiles::unreachable()));
    let mut states = controller.subscribe();
    let mut effects = controller.side_effects();

    controller.load("alice").expect("dispatch");
    let failed = wait_until(&mut states, |state| {
        matches!(state, ProfileState::Failed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        ProfileState::Failed {
            error: ClientError::Network(_),
            ..
        }
    ));
    let Some(ProfileEffect::ShowMessage(message)) = effects.recv().await else {
        panic!("expected a message");
    };
    assert!(message.starts_with("Failed to load profile"));
    assert_eq!(effects.try_recv(), None);
}

#[tokio::test]
async fn blank_user_fails_without_fetching() {
    let repository = Arc::new(TestProfiles::serving(alice()));
    let requested_for = Arc::clone(&repository.requested_for);
    let controller = ProfileController::new(repository);
    let mut states = controller.subscribe();

    controller.load("").expect("dispatch");
    let failed = wait_until(&mut states, |state| {
        matches!(state, ProfileState::Failed { .. })
    })
    .await;
    assert!(matches!(
        failed,
        ProfileState::Failed {
            error: ClientError::Validation { field: "user id" },
            ..
        }
    ));
    assert!(requested_for.lock().await.is_empty());
}
