use super::*;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::User;
use tokio::sync::Mutex;

struct TestAccounts {
    registered: Arc<Mutex<Vec<RegisterRequest>>>,
}

impl TestAccounts {
    fn new() -> Self {
        Self {
            registered: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AccountRepository for TestAccounts {
    async fn authenticate(&self, _username: &str, _password: &str) -> Result<User> {
        Err(anyhow!("login not served in this test"))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        match request.username.as_str() {
            "taken" => Err(ApiException::new(409, "Username already exists").into()),
            "offline" => Err(anyhow!("connection refused")),
            _ => {
                self.registered.lock().await.push(request.clone());
                Ok(())
            }
        }
    }

    async fn update_interests(&self, _user_id: &UserId, _interests: &[String]) -> Result<()> {
        Ok(())
    }
}

async fn wait_for_phase(
    states: &mut StateSubscription<SignupState>,
    done: impl Fn(&SignupPhase) -> bool,
) -> SignupState {
    loop {
        let state = tokio::time::timeout(Duration::from_secs(2), states.next())
            .await
            .expect("state within timeout")
            .expect("controller still open");
        if done(&state.phase) {
            return state;
        }
    }
}

fn fill(controller: &SignupController, username: &str, password: &str, confirm: &str) {
    controller
        .set_field(SignupField::Username, username)
        .expect("dispatch");
    controller
        .set_field(SignupField::Password, password)
        .expect("dispatch");
    controller
        .set_field(SignupField::ConfirmPassword, confirm)
        .expect("dispatch");
}

#[tokio::test]
async fn new_account_is_registered_and_moves_on_to_interests() {
    let accounts = Arc::new(TestAccounts::new());
    let registered = Arc::clone(&accounts.registered);
    let controller = SignupController::new(accounts);
    let mut states = controller.subscribe();
    let mut effects = controller.side_effects();

    fill(&controller, " bob ", "pw", "pw");
    controller
        .set_field(SignupField::Email, "bob@example.com")
        .expect("dispatch");
    controller
        .set_field(SignupField::ConfirmEmail, "bob@example.com ")
        .expect("dispatch");
    controller.dispatch(SignupIntent::Submit).expect("dispatch");

    let done = wait_for_phase(&mut states, |phase| {
        matches!(phase, SignupPhase::Registered(_))
    })
    .await;
    assert_eq!(done.phase, SignupPhase::Registered(UserId::from("bob")));
    assert!(done.form.password.is_empty());

    let effect = tokio::time::timeout(Duration::from_secs(2), effects.recv())
        .await
        .expect("effect within timeout");
    assert_eq!(
        effect,
        Some(SignupEffect::NavigateToInterests(UserId::from("bob")))
    );

    let recorded = registered.lock().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].username, "bob");
    assert_eq!(recorded[0].email.as_deref(), Some("bob@example.com"));
    assert_eq!(recorded[0].phone, None);
}

#[tokio::test]
async fn mismatched_confirmation_is_rejected_locally() {
    let accounts = Arc::new(TestAccounts::new());
    let registered = Arc::clone(&accounts.registered);
    let controller = SignupController::new(accounts);
    let mut states = controller.subscribe();

    fill(&controller, "bob", "pw", "pw2");
    controller.dispatch(SignupIntent::Submit).expect("dispatch");
    let rejected = wait_for_phase(&mut states, |phase| {
        matches!(phase, SignupPhase::Rejected(_))
    })
    .await;
    assert_eq!(
        rejected.phase,
        SignupPhase::Rejected("Passwords do not match".to_string())
    );

    controller.dispatch(SignupIntent::DismissError).expect("dispatch");
    controller
        .set_field(SignupField::ConfirmPassword, "pw")
        .expect("dispatch");
    controller
        .set_field(SignupField::Email, "a@example.com")
        .expect("dispatch");
    controller.dispatch(SignupIntent::Submit).expect("dispatch");
    let rejected = wait_for_phase(&mut states, |phase| {
        *phase == SignupPhase::Rejected("Emails do not match".to_string())
    })
    .await;
    assert_eq!(rejected.form.email, "a@example.com");
    assert!(registered.lock().await.is_empty());
}

#[tokio::test]
async fn taken_username_shows_the_server_message() {
    let controller = SignupController::new(Arc::new(TestAccounts::new()));
    let mut states = controller.subscribe();
    let mut effects = controller.side_effects();

    fill(&controller, "taken", "pw", "pw");
    controller.dispatch(SignupIntent::Submit).expect("dispatch");

    let rejected = wait_for_phase(&mut states, |phase| {
        matches!(phase, SignupPhase::Rejected(_))
    })
    .await;
    assert_eq!(
        rejected.phase,
        SignupPhase::Rejected("Username already exists".to_string())
    );
    assert_eq!(
        effects.recv().await,
        Some(SignupEffect::ShowMessage(
            "Username already exists".to_string()
        ))
    );
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let controller = SignupController::new(Arc::new(TestAccounts::new()));
    let mut states = controller.subscribe();

    fill(&controller, "offline", "pw", "pw");
    controller.dispatch(SignupIntent::Submit).expect("dispatch");

    let rejected = wait_for_phase(&mut states, |phase| {
        matches!(phase, SignupPhase::Rejected(_))
    })
    .await;
    let SignupPhase::Rejected(reason) = rejected.phase else {
        unreachable!()
    };
    assert!(reason.starts_with("network error"));
}

#[tokio::test]
async fn missing_username_never_reaches_the_backend() {
    let accounts = Arc::new(TestAccounts::new());
    let registered = Arc::clone(&accounts.registered);
    let controller = SignupController::new(accounts);
    let mut states = controller.subscribe();

    fill(&controller, "  ", "pw", "pw");
    controller.dispatch(SignupIntent::Submit).expect("dispatch");
    let rejected = wait_for_phase(&mut states, |phase| {
        matches!(phase, SignupPhase::Rejected(_))
    })
    .await;
    assert_eq!(
        rejected.phase,
        SignupPhase::Rejected("missing username".to_string())
    );
    assert!(registered.lock().await.is_empty());
}
