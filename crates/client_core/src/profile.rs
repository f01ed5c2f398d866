//! Profile screen: account details from the backend, with the quiz counters
//! optionally recomputed from a freshly loaded history.

use std::sync::Arc;

use shared::{domain::UserId, protocol::ProfileData};
use tracing::{info, warn};

use crate::{
    api::QuizRepository,
    error::ClientError,
    history::ProfileStats,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileState {
    Idle,
    Loading {
        user_id: UserId,
    },
    Loaded {
        user_id: UserId,
        profile: ProfileData,
    },
    Failed {
        user_id: UserId,
        error: ClientError,
    },
}

impl ProfileState {
    fn is_loading_for(&self, user_id: &UserId) -> bool {
        matches!(self, Self::Loading { user_id: loading } if loading == user_id)
    }
}

#[derive(Debug, Clone)]
pub enum ProfileIntent {
    Load(UserId),
    /// Replaces the server counters with ones derived from history.
    ApplyStats(ProfileStats),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEffect {
    ShowMessage(String),
}

#[derive(Debug)]
pub struct ProfileOutcome {
    user_id: UserId,
    result: Result<ProfileData, ClientError>,
}

pub struct ProfileReducer {
    repository: Arc<dyn QuizRepository>,
}

fn failed(user_id: UserId, error: ClientError) -> Transition<ProfileReducer> {
    let message = format!("Failed to load profile: {error}");
    Transition::to(ProfileState::Failed { user_id, error })
        .with_effect(ProfileEffect::ShowMessage(message))
}

impl Reducer for ProfileReducer {
    type State = ProfileState;
    type Intent = ProfileIntent;
    type Outcome = ProfileOutcome;
    type Effect = ProfileEffect;

    fn on_intent(&self, state: &ProfileState, intent: ProfileIntent) -> Transition<Self> {
        match intent {
            ProfileIntent::Load(user_id) => {
                if user_id.is_blank() {
                    return failed(user_id, ClientError::Validation { field: "user id" });
                }
                if state.is_loading_for(&user_id) {
                    return Transition::unchanged();
                }
                let repository = Arc::clone(&self.repository);
                let request = user_id.clone();
                Transition::to(ProfileState::Loading { user_id }).with_work(async move {
                    let result = repository
                        .fetch_profile(&request)
                        .await
                        .map_err(|err| ClientError::network(&err));
                    ProfileOutcome {
                        user_id: request,
                        result,
                    }
                })
            }
            ProfileIntent::ApplyStats(stats) => match state {
                ProfileState::Loaded { user_id, profile } => {
                    let mut profile = profile.clone();
                    profile.quizzes_done = stats.quizzes_done;
                    profile.correct_answers = stats.correct_answers;
                    profile.incorrect_answers = stats.incorrect_answers;
                    Transition::to(ProfileState::Loaded {
                        user_id: user_id.clone(),
                        profile,
                    })
                }
                _ => Transition::unchanged(),
            },
        }
    }

    fn on_outcome(&self, state: &ProfileState, outcome: ProfileOutcome) -> Transition<Self> {
        let ProfileOutcome { user_id, result } = outcome;
        if !state.is_loading_for(&user_id) {
            return Transition::unchanged();
        }
        match result {
            Ok(profile) => {
                info!(user_id = %user_id, "profile loaded");
                Transition::to(ProfileState::Loaded { user_id, profile })
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "profile fetch failed");
                failed(user_id, error)
            }
        }
    }

    fn on_work_panic(&self, state: &ProfileState, reason: &str) -> Transition<Self> {
        match state {
            ProfileState::Loading { user_id } => failed(
                user_id.clone(),
                ClientError::Network(format!("request aborted: {reason}")),
            ),
            _ => Transition::unchanged(),
        }
    }
}

pub struct ProfileController {
    store: Store<ProfileReducer>,
}

impl ProfileController {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self {
            store: Store::new("profile", ProfileState::Idle, ProfileReducer { repository }),
        }
    }

    pub fn dispatch(&self, intent: ProfileIntent) -> Result<(), StoreClosed> {
        self.store.dispatch(intent)
    }

    pub fn load(&self, user_id: impl Into<UserId>) -> Result<(), StoreClosed> {
        self.dispatch(ProfileIntent::Load(user_id.into()))
    }

    pub fn state(&self) -> ProfileState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<ProfileState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<ProfileEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;
