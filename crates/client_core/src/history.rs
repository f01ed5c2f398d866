//! Quiz history list, the aggregate stats shown on the profile, and picking
//! an entry to review.

use std::sync::Arc;

use shared::{domain::UserId, protocol::QuizHistoryItem};
use tracing::{info, warn};

use crate::{
    api::QuizRepository,
    error::ClientError,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStats {
    pub quizzes_done: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
}

impl ProfileStats {
    pub fn from_history(history: &[QuizHistoryItem]) -> Self {
        history.iter().fold(Self::default(), |mut stats, item| {
            stats.quizzes_done += 1;
            stats.correct_answers += item.score;
            stats.incorrect_answers += item.total_questions.saturating_sub(item.score);
            stats
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryState {
    Idle,
    Loading {
        user_id: UserId,
    },
    Loaded {
        user_id: UserId,
        history: Vec<QuizHistoryItem>,
        stats: ProfileStats,
    },
    Failed {
        user_id: UserId,
        error: ClientError,
    },
}

#[derive(Debug, Clone)]
pub enum HistoryIntent {
    Load(UserId),
    Review(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEffect {
    ShowReview(QuizHistoryItem),
    ShowMessage(String),
}

#[derive(Debug)]
pub struct HistoryOutcome {
    user_id: UserId,
    result: Result<Vec<QuizHistoryItem>, ClientError>,
}

pub struct HistoryReducer {
    repository: Arc<dyn QuizRepository>,
}

impl HistoryReducer {
    fn load(&self, state: &HistoryState, user_id: UserId) -> Transition<Self> {
        if user_id.is_blank() {
            let error = ClientError::Validation { field: "user id" };
            let message = format!("Failed to load quiz history: {error}");
            return Transition::to(HistoryState::Failed { user_id, error })
                .with_effect(HistoryEffect::ShowMessage(message));
        }
        if matches!(state, HistoryState::Loading { user_id: loading } if *loading == user_id) {
            return Transition::unchanged();
        }

        let repository = Arc::clone(&self.repository);
        let request = user_id.clone();
        Transition::to(HistoryState::Loading { user_id }).with_work(async move {
            let result = repository
                .fetch_history(&request)
                .await
                .map_err(|err| ClientError::network(&err));
            HistoryOutcome {
                user_id: request,
                result,
            }
        })
    }

    fn review(&self, state: &HistoryState, index: usize) -> Transition<Self> {
        let entry = match state {
            HistoryState::Loaded { history, .. } => history.get(index).cloned(),
            _ => None,
        };
        match entry {
            Some(item) => Transition::unchanged().with_effect(HistoryEffect::ShowReview(item)),
            None => {
                let error = ClientError::NotFound(format!("no quiz history entry #{}", index + 1));
                Transition::unchanged().with_effect(HistoryEffect::ShowMessage(error.to_string()))
            }
        }
    }
}

impl Reducer for HistoryReducer {
    type State = HistoryState;
    type Intent = HistoryIntent;
    type Outcome = HistoryOutcome;
    type Effect = HistoryEffect;

    fn on_intent(&self, state: &HistoryState, intent: HistoryIntent) -> Transition<Self> {
        match intent {
            HistoryIntent::Load(user_id) => self.load(state, user_id),
            HistoryIntent::Review(index) => self.review(state, index),
        }
    }

    fn on_outcome(&self, state: &HistoryState, outcome: HistoryOutcome) -> Transition<Self> {
        let HistoryOutcome { user_id, result } = outcome;
        if !matches!(state, HistoryState::Loading { user_id: loading } if *loading == user_id) {
            return Transition::unchanged();
        }
        match result {
            Ok(history) => {
                let stats = ProfileStats::from_history(&history);
                info!(user_id = %user_id, quizzes = stats.quizzes_done, "history loaded");
                Transition::to(HistoryState::Loaded {
                    user_id,
                    history,
                    stats,
                })
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "history fetch failed");
                let message = format!("Failed to load quiz history: {error}");
                Transition::to(HistoryState::Failed { user_id, error })
                    .with_effect(HistoryEffect::ShowMessage(message))
            }
        }
    }

    fn on_work_panic(&self, state: &HistoryState, reason: &str) -> Transition<Self> {
        match state {
            HistoryState::Loading { user_id } => Transition::to(HistoryState::Failed {
                user_id: user_id.clone(),
                error: ClientError::Network(format!("request aborted: {reason}")),
            }),
            _ => Transition::unchanged(),
        }
    }
}

pub struct HistoryController {
    store: Store<HistoryReducer>,
}

impl HistoryController {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self {
            store: Store::new("history", HistoryState::Idle, HistoryReducer { repository }),
        }
    }

    pub fn dispatch(&self, intent: HistoryIntent) -> Result<(), StoreClosed> {
        self.store.dispatch(intent)
    }

    pub fn state(&self) -> HistoryState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<HistoryState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<HistoryEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
