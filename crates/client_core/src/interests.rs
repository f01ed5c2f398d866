//! Interest picker shown after sign-up. The chosen names are saved on the
//! backend, which uses them to tailor generated quizzes.

use std::{collections::BTreeSet, sync::Arc};

use shared::domain::UserId;
use tracing::{debug, info, warn};

use crate::{
    api::AccountRepository,
    error::ClientError,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

pub const MAX_SELECTED_INTERESTS: usize = 10;

const DEFAULT_CATALOG: [&str; 10] = [
    "Android Development",
    "iOS Development",
    "Web Development",
    "Machine Learning",
    "Data Science",
    "Cloud Computing",
    "Cybersecurity",
    "Game Development",
    "UI/UX Design",
    "Mobile App Design",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub id: String,
    pub name: String,
}

/// The built-in catalog, numbered from 1.
pub fn default_catalog() -> Vec<Interest> {
    DEFAULT_CATALOG
        .iter()
        .enumerate()
        .map(|(position, name)| Interest {
            id: (position + 1).to_string(),
            name: name.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestsPhase {
    Choosing,
    Saving,
    Saved,
    Failed(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestsState {
    pub available: Vec<Interest>,
    pub selected: BTreeSet<String>,
    pub phase: InterestsPhase,
}

impl InterestsState {
    /// Selected names in catalog order.
    pub fn selected_names(&self) -> Vec<String> {
        self.available
            .iter()
            .filter(|interest| self.selected.contains(&interest.id))
            .map(|interest| interest.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum InterestsIntent {
    Toggle(String),
    Continue(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterestsEffect {
    NavigateHome,
    ShowMessage(String),
}

#[derive(Debug)]
pub struct InterestsOutcome {
    user_id: UserId,
    result: Result<(), ClientError>,
}

pub struct InterestsReducer {
    accounts: Arc<dyn AccountRepository>,
}

impl InterestsReducer {
    fn toggle(&self, state: &InterestsState, id: String) -> Transition<Self> {
        if !state.available.iter().any(|interest| interest.id == id) {
            debug!(id = %id, "unknown interest ignored");
            return Transition::unchanged();
        }
        let mut next = state.clone();
        if !next.selected.remove(&id) {
            if next.selected.len() >= MAX_SELECTED_INTERESTS {
                debug!(id = %id, "interest limit reached");
                return Transition::unchanged();
            }
            next.selected.insert(id);
        }
        Transition::to(next)
    }

    fn save(&self, state: &InterestsState, user_id: UserId) -> Transition<Self> {
        if user_id.is_blank() {
            let error = ClientError::Validation { field: "user id" };
            let message = format!("Failed to save interests: {error}");
            return Transition::to(InterestsState {
                phase: InterestsPhase::Failed(error),
                ..state.clone()
            })
            .with_effect(InterestsEffect::ShowMessage(message));
        }

        let accounts = Arc::clone(&self.accounts);
        let names = state.selected_names();
        Transition::to(InterestsState {
            phase: InterestsPhase::Saving,
            ..state.clone()
        })
        .with_work(async move {
            let result = accounts
                .update_interests(&user_id, &names)
                .await
                .map_err(|err| ClientError::network(&err));
            InterestsOutcome { user_id, result }
        })
    }
}

impl Reducer for InterestsReducer {
    type State = InterestsState;
    type Intent = InterestsIntent;
    type Outcome = InterestsOutcome;
    type Effect = InterestsEffect;

    fn on_intent(&self, state: &InterestsState, intent: InterestsIntent) -> Transition<Self> {
        if state.phase == InterestsPhase::Saving {
            return Transition::unchanged();
        }
        match intent {
            InterestsIntent::Toggle(id) => self.toggle(state, id),
            InterestsIntent::Continue(user_id) => self.save(state, user_id),
        }
    }

    fn on_outcome(&self, state: &InterestsState, outcome: InterestsOutcome) -> Transition<Self> {
        if state.phase != InterestsPhase::Saving {
            return Transition::unchanged();
        }
        let InterestsOutcome { user_id, result } = outcome;
        match result {
            Ok(()) => {
                info!(user_id = %user_id, count = state.selected.len(), "interests saved");
                Transition::to(InterestsState {
                    phase: InterestsPhase::Saved,
                    ..state.clone()
                })
                .with_effect(InterestsEffect::NavigateHome)
            }
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "saving interests failed");
                let message = format!("Failed to save interests: {error}");
                Transition::to(InterestsState {
                    phase: InterestsPhase::Failed(error),
                    ..state.clone()
                })
                .with_effect(InterestsEffect::ShowMessage(message))
            }
        }
    }

    fn on_work_panic(&self, state: &InterestsState, reason: &str) -> Transition<Self> {
        if state.phase != InterestsPhase::Saving {
            return Transition::unchanged();
        }
        Transition::to(InterestsState {
            phase: InterestsPhase::Failed(ClientError::Network(format!(
                "request aborted: {reason}"
            ))),
            ..state.clone()
        })
    }
}

pub struct InterestsController {
    store: Store<InterestsReducer>,
}

impl InterestsController {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self::with_catalog(accounts, default_catalog())
    }

    pub fn with_catalog(accounts: Arc<dyn AccountRepository>, available: Vec<Interest>) -> Self {
        let initial = InterestsState {
            available,
            selected: BTreeSet::new(),
            phase: InterestsPhase::Choosing,
        };
        Self {
            store: Store::new("interests", initial, InterestsReducer { accounts }),
        }
    }

    pub fn toggle(&self, id: impl Into<String>) -> Result<(), StoreClosed> {
        self.store.dispatch(InterestsIntent::Toggle(id.into()))
    }

    pub fn continue_as(&self, user_id: impl Into<UserId>) -> Result<(), StoreClosed> {
        self.store.dispatch(InterestsIntent::Continue(user_id.into()))
    }

    pub fn state(&self) -> InterestsState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<InterestsState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<InterestsEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/interests_tests.rs"]
mod tests;
