//! Credentials form and sign-in.

use std::sync::Arc;

use shared::{domain::User, error::ApiException};
use tracing::{info, warn};

use crate::{
    api::AccountRepository,
    error::ClientError,
    session::UserSession,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPhase {
    Editing,
    Authenticating,
    Authenticated(User),
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginState {
    pub username: String,
    pub password: String,
    pub phase: LoginPhase,
}

impl Default for LoginState {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            phase: LoginPhase::Editing,
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoginIntent {
    UsernameChanged(String),
    PasswordChanged(String),
    Submit,
    DismissError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEffect {
    NavigateHome(User),
    ShowMessage(String),
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(Result<User, String>),
    /// The accepted user has been written to the session.
    Persisted(User),
}

pub struct LoginReducer {
    accounts: Arc<dyn AccountRepository>,
    session: Arc<dyn UserSession>,
}

impl LoginReducer {
    pub fn new(accounts: Arc<dyn AccountRepository>, session: Arc<dyn UserSession>) -> Self {
        Self { accounts, session }
    }

    fn submit(&self, state: &LoginState) -> Transition<Self> {
        if state.phase == LoginPhase::Authenticating {
            return Transition::unchanged();
        }
        let missing = if state.username.trim().is_empty() {
            Some("username")
        } else if state.password.is_empty() {
            Some("password")
        } else {
            None
        };
        if let Some(field) = missing {
            let reason = ClientError::Validation { field }.to_string();
            return Transition::to(LoginState {
                phase: LoginPhase::Rejected(reason.clone()),
                ..state.clone()
            })
            .with_effect(LoginEffect::ShowMessage(reason));
        }

        let accounts = Arc::clone(&self.accounts);
        let username = state.username.trim().to_string();
        let password = state.password.clone();
        Transition::to(LoginState {
            phase: LoginPhase::Authenticating,
            ..state.clone()
        })
        .with_work(async move {
            let result = accounts.authenticate(&username, &password).await.map_err(|err| {
                match err.downcast_ref::<ApiException>() {
                    Some(rejection) => rejection.message.clone(),
                    None => ClientError::network(&err).to_string(),
                }
            });
            LoginOutcome::Authenticated(result)
        })
    }
}

impl Reducer for LoginReducer {
    type State = LoginState;
    type Intent = LoginIntent;
    type Outcome = LoginOutcome;
    type Effect = LoginEffect;

    fn on_intent(&self, state: &LoginState, intent: LoginIntent) -> Transition<Self> {
        if state.phase == LoginPhase::Authenticating && !matches!(intent, LoginIntent::Submit) {
            return Transition::unchanged();
        }
        match intent {
            LoginIntent::UsernameChanged(username) => Transition::to(LoginState {
                username,
                ..state.clone()
            }),
            LoginIntent::PasswordChanged(password) => Transition::to(LoginState {
                password,
                ..state.clone()
            }),
            LoginIntent::Submit => self.submit(state),
            LoginIntent::DismissError => match state.phase {
                LoginPhase::Rejected(_) => Transition::to(LoginState {
                    phase: LoginPhase::Editing,
                    ..state.clone()
                }),
                _ => Transition::unchanged(),
            },
        }
    }

    fn on_outcome(&self, state: &LoginState, outcome: LoginOutcome) -> Transition<Self> {
        if state.phase != LoginPhase::Authenticating {
            return Transition::unchanged();
        }
        let result = match outcome {
            LoginOutcome::Authenticated(result) => result,
            LoginOutcome::Persisted(user) => {
                info!(username = %user.username, "signed in");
                return Transition::to(LoginState {
                    phase: LoginPhase::Authenticated(user.clone()),
                    password: String::new(),
                    ..state.clone()
                })
                .with_effect(LoginEffect::NavigateHome(user));
            }
        };
        match result {
            // Work only starts once this transition is committed, so a
            // controller torn down meanwhile never writes the session.
            Ok(user) => {
                let session = Arc::clone(&self.session);
                Transition::unchanged().with_work(async move {
                    session.set_current_user(user.clone());
                    LoginOutcome::Persisted(user)
                })
            }
            Err(reason) => {
                warn!(username = %state.username, reason = %reason, "sign-in rejected");
                Transition::to(LoginState {
                    phase: LoginPhase::Rejected(reason.clone()),
                    ..state.clone()
                })
                .with_effect(LoginEffect::ShowMessage(reason))
            }
        }
    }

    fn on_work_panic(&self, state: &LoginState, reason: &str) -> Transition<Self> {
        if state.phase != LoginPhase::Authenticating {
            return Transition::unchanged();
        }
        Transition::to(LoginState {
            phase: LoginPhase::Rejected(format!("login aborted: {reason}")),
            ..state.clone()
        })
    }
}

pub struct LoginController {
    store: Store<LoginReducer>,
}

impl LoginController {
    pub fn new(accounts: Arc<dyn AccountRepository>, session: Arc<dyn UserSession>) -> Self {
        Self {
            store: Store::new(
                "login",
                LoginState::default(),
                LoginReducer::new(accounts, session),
            ),
        }
    }

    pub fn dispatch(&self, intent: LoginIntent) -> Result<(), StoreClosed> {
        self.store.dispatch(intent)
    }

    pub fn state(&self) -> LoginState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<LoginState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<LoginEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/login_tests.rs"]
mod tests;
