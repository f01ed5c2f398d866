//! Account creation form.

use std::sync::Arc;

use shared::{domain::UserId, error::ApiException, protocol::RegisterRequest};
use tracing::{info, warn};

use crate::{
    api::AccountRepository,
    error::ClientError,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupField {
    Username,
    Email,
    ConfirmEmail,
    Password,
    ConfirmPassword,
    Phone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub confirm_email: String,
    pub password: String,
    pub confirm_password: String,
    pub phone: String,
}

impl SignupForm {
    fn set(&mut self, field: SignupField, value: String) {
        let slot = match field {
            SignupField::Username => &mut self.username,
            SignupField::Email => &mut self.email,
            SignupField::ConfirmEmail => &mut self.confirm_email,
            SignupField::Password => &mut self.password,
            SignupField::ConfirmPassword => &mut self.confirm_password,
            SignupField::Phone => &mut self.phone,
        };
        *slot = value;
    }

    /// Checks the form and builds the request the backend expects. Email and
    /// phone are optional; blank ones are left out.
    fn request(&self) -> Result<RegisterRequest, String> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(ClientError::Validation { field: "username" }.to_string());
        }
        if self.password.is_empty() {
            return Err(ClientError::Validation { field: "password" }.to_string());
        }
        if self.password != self.confirm_password {
            return Err("Passwords do not match".to_string());
        }
        if self.email.trim() != self.confirm_email.trim() {
            return Err("Emails do not match".to_string());
        }
        let optional = |value: &str| {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        };
        Ok(RegisterRequest {
            username: username.to_string(),
            password: self.password.clone(),
            email: optional(&self.email),
            phone: optional(&self.phone),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupPhase {
    Editing,
    Registering,
    Registered(UserId),
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupState {
    pub form: SignupForm,
    pub phase: SignupPhase,
}

impl Default for SignupState {
    fn default() -> Self {
        Self {
            form: SignupForm::default(),
            phase: SignupPhase::Editing,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SignupIntent {
    FieldChanged(SignupField, String),
    Submit,
    DismissError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupEffect {
    /// A new account picks its interests next.
    NavigateToInterests(UserId),
    ShowMessage(String),
}

#[derive(Debug)]
pub struct SignupOutcome {
    user_id: UserId,
    result: Result<(), String>,
}

pub struct SignupReducer {
    accounts: Arc<dyn AccountRepository>,
}

impl SignupReducer {
    fn submit(&self, state: &SignupState) -> Transition<Self> {
        if state.phase == SignupPhase::Registering {
            return Transition::unchanged();
        }
        let request = match state.form.request() {
            Ok(request) => request,
            Err(reason) => {
                return Transition::to(SignupState {
                    phase: SignupPhase::Rejected(reason.clone()),
                    ..state.clone()
                })
                .with_effect(SignupEffect::ShowMessage(reason));
            }
        };

        let accounts = Arc::clone(&self.accounts);
        Transition::to(SignupState {
            phase: SignupPhase::Registering,
            ..state.clone()
        })
        .with_work(async move {
            let result = accounts.register(&request).await.map_err(|err| {
                match err.downcast_ref::<ApiException>() {
                    Some(rejection) => rejection.message.clone(),
                    None => ClientError::network(&err).to_string(),
                }
            });
            SignupOutcome {
                user_id: UserId::from(request.username),
                result,
            }
        })
    }
}

impl Reducer for SignupReducer {
    type State = SignupState;
    type Intent = SignupIntent;
    type Outcome = SignupOutcome;
    type Effect = SignupEffect;

    fn on_intent(&self, state: &SignupState, intent: SignupIntent) -> Transition<Self> {
        if state.phase == SignupPhase::Registering {
            return Transition::unchanged();
        }
        match intent {
            SignupIntent::FieldChanged(field, value) => {
                let mut next = state.clone();
                next.form.set(field, value);
                Transition::to(next)
            }
            SignupIntent::Submit => self.submit(state),
            SignupIntent::DismissError => match state.phase {
                SignupPhase::Rejected(_) => Transition::to(SignupState {
                    phase: SignupPhase::Editing,
                    ..state.clone()
                }),
                _ => Transition::unchanged(),
            },
        }
    }

    fn on_outcome(&self, state: &SignupState, outcome: SignupOutcome) -> Transition<Self> {
        if state.phase != SignupPhase::Registering {
            return Transition::unchanged();
        }
        let SignupOutcome { user_id, result } = outcome;
        match result {
            Ok(()) => {
                info!(user_id = %user_id, "account created");
                let mut form = state.form.clone();
                form.password.clear();
                form.confirm_password.clear();
                Transition::to(SignupState {
                    form,
                    phase: SignupPhase::Registered(user_id.clone()),
                })
                .with_effect(SignupEffect::NavigateToInterests(user_id))
            }
            Err(reason) => {
                warn!(user_id = %user_id, reason = %reason, "registration rejected");
                Transition::to(SignupState {
                    phase: SignupPhase::Rejected(reason.clone()),
                    ..state.clone()
                })
                .with_effect(SignupEffect::ShowMessage(reason))
            }
        }
    }

    fn on_work_panic(&self, state: &SignupState, reason: &str) -> Transition<Self> {
        if state.phase != SignupPhase::Registering {
            return Transition::unchanged();
        }
        Transition::to(SignupState {
            phase: SignupPhase::Rejected(format!("registration aborted: {reason}")),
            ..state.clone()
        })
    }
}

pub struct SignupController {
    store: Store<SignupReducer>,
}

impl SignupController {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self {
            store: Store::new("signup", SignupState::default(), SignupReducer { accounts }),
        }
    }

    pub fn dispatch(&self, intent: SignupIntent) -> Result<(), StoreClosed> {
        self.store.dispatch(intent)
    }

    pub fn set_field(
        &self,
        field: SignupField,
        value: impl Into<String>,
    ) -> Result<(), StoreClosed> {
        self.dispatch(SignupIntent::FieldChanged(field, value.into()))
    }

    pub fn state(&self) -> SignupState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<SignupState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<SignupEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/signup_tests.rs"]
mod tests;
