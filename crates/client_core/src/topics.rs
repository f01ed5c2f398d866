//! Home screen task list built from the topics available to a user.

use std::sync::Arc;

use shared::domain::UserId;
use tracing::{info, warn};

use crate::{
    api::QuizRepository,
    error::ClientError,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCard {
    pub id: String,
    pub title: String,
    pub description: String,
}

impl TopicCard {
    fn from_topic(position: usize, topic: String) -> Self {
        Self {
            id: (position + 1).to_string(),
            description: format!("Test your knowledge of {topic}"),
            title: topic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicsState {
    Idle,
    Loading {
        user_id: UserId,
    },
    Loaded {
        user_id: UserId,
        topics: Vec<TopicCard>,
    },
    Failed {
        user_id: UserId,
        error: ClientError,
    },
}

#[derive(Debug, Clone)]
pub enum TopicsIntent {
    Load(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicsEffect {
    ShowMessage(String),
}

#[derive(Debug)]
pub struct TopicsOutcome {
    user_id: UserId,
    result: Result<Vec<String>, ClientError>,
}

pub struct TopicsReducer {
    repository: Arc<dyn QuizRepository>,
}

impl Reducer for TopicsReducer {
    type State = TopicsState;
    type Intent = TopicsIntent;
    type Outcome = TopicsOutcome;
    type Effect = TopicsEffect;

    fn on_intent(&self, state: &TopicsState, intent: TopicsIntent) -> Transition<Self> {
        let TopicsIntent::Load(user_id) = intent;
        if user_id.is_blank() {
            let error = ClientError::Validation { field: "user id" };
            let message = format!("Failed to load tasks: {error}");
            return Transition::to(TopicsState::Failed { user_id, error })
                .with_effect(TopicsEffect::ShowMessage(message));
        }
        if matches!(state, TopicsState::Loading { user_id: loading } if *loading == user_id) {
            return Transition::unchanged();
        }

        let repository = Arc::clone(&self.repository);
        let request = user_id.clone();
        Transition::to(TopicsState::Loading { user_id }).with_work(async move {
            let result = repository
                .fetch_topics(&request)
                .await
                .map_err(|err| ClientError::network(&err));
            TopicsOutcome {
                user_id: request,
                result,
            }
        })
    }

    fn on_outcome(&self, state: &TopicsState, outcome: TopicsOutcome) -> Transition<Self> {
        let TopicsOutcome { user_id, result } = outcome;
        if !matches!(state, TopicsState::Loading { user_id: loading } if *loading == user_id) {
            return Transition::unchanged();
        }
        match result {
            Ok(topics) => {
                info!(user_id = %user_id, count = topics.len(), "topics loaded");
                let topics = topics
                    .into_iter()
                    .enumerate()
                    .map(|(position, topic)| TopicCard::from_topic(position, topic))
                    .collect();
                Transition::to(TopicsState::Loaded { user_id, topics })
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "topics fetch failed");
                let message = format!("Failed to load tasks: {error}");
                Transition::to(TopicsState::Failed { user_id, error })
                    .with_effect(TopicsEffect::ShowMessage(message))
            }
        }
    }

    fn on_work_panic(&self, state: &TopicsState, reason: &str) -> Transition<Self> {
        match state {
            TopicsState::Loading { user_id } => Transition::to(TopicsState::Failed {
                user_id: user_id.clone(),
                error: ClientError::Network(format!("request aborted: {reason}")),
            }),
            _ => Transition::unchanged(),
        }
    }
}

pub struct TopicsController {
    store: Store<TopicsReducer>,
}

impl TopicsController {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self {
            store: Store::new("topics", TopicsState::Idle, TopicsReducer { repository }),
        }
    }

    pub fn load(&self, user_id: impl Into<UserId>) -> Result<(), StoreClosed> {
        self.store.dispatch(TopicsIntent::Load(user_id.into()))
    }

    pub fn state(&self) -> TopicsState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<TopicsState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<TopicsEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/topics_tests.rs"]
mod tests;
