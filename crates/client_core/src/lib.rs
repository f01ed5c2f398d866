//! Client-side controllers for the quiz app.
//!
//! Every screen is driven by a [`store::Store`]: the UI dispatches intents,
//! observes an ordered feed of states and listens for one-shot side effects.
//! Remote calls go through the repository traits in [`api`].

pub mod api;
pub mod checkout;
pub mod error;
pub mod event_bus;
pub mod history;
pub mod interests;
pub mod login;
pub mod payment;
pub mod profile;
pub mod quiz_session;
pub mod results;
pub mod session;
pub mod signup;
pub mod store;
pub mod topics;

pub use api::{AccountRepository, HttpApiClient, PaymentRepository, QuizRepository};
pub use checkout::{CheckoutEffect, CheckoutState, PaymentCheckoutController};
pub use error::ClientError;
pub use event_bus::{EventBus, DEFAULT_BUS_CAPACITY};
pub use history::{HistoryController, ProfileStats};
pub use interests::InterestsController;
pub use login::LoginController;
pub use payment::{PaymentBus, PaymentOutcome, PaymentResult, PaymentResultAdapter, PaymentSheet};
pub use profile::ProfileController;
pub use quiz_session::{score_answers, QuizSessionController};
pub use results::ResultsController;
pub use session::{InMemoryUserSession, UserSession};
pub use signup::SignupController;
pub use store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition};
pub use topics::TopicsController;
