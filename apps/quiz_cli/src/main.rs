mod config;
mod console;

use std::{io::Write, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    api::{HttpApiClient, QuizRepository},
    checkout::{CheckoutEffect, PaymentCheckoutController},
    history::{HistoryController, HistoryEffect, HistoryIntent, HistoryState},
    interests::{default_catalog, InterestsController, InterestsEffect},
    login::{LoginController, LoginIntent, LoginPhase},
    payment::{PaymentBus, PaymentOutcome, PaymentResultAdapter, PaymentSheet},
    profile::{ProfileController, ProfileState},
    quiz_session::{QuizEffect, QuizSessionController, QuizState},
    results::{ResultsController, ResultsState},
    session::{InMemoryUserSession, UserSession},
    signup::{SignupController, SignupEffect, SignupField, SignupIntent},
    store::{EffectSubscription, StateSubscription},
    topics::{TopicsController, TopicsState},
};
use shared::domain::{AnswerLetter, UserId};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{config::Settings, console::ConsolePaymentSheet};

#[derive(Parser, Debug)]
#[command(name = "quiz", about = "Terminal client for the quiz backend")]
struct Args {
    /// Username of the signed-in user, required by every command but `login`
    /// and `signup`.
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Lists the interest catalog, or saves the picked ids.
    Interests {
        #[arg(long = "pick", value_name = "ID")]
        picks: Vec<String>,
    },
    Topics,
    Quiz {
        #[arg(long)]
        topic: String,
    },
    History {
        /// 1-based entry to show in full.
        #[arg(long)]
        review: Option<usize>,
    },
    Results {
        #[arg(long)]
        topic: String,
    },
    Profile,
    Checkout {
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "usd")]
        currency: String,
    },
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = config::load_settings()?;
    info!(api = %settings.api_base_url, payment = %settings.payment_base_url(), "quiz client starting");

    let api = Arc::new(
        HttpApiClient::new(&settings.api_base_url)?
            .with_payment_base_url(settings.payment_base_url())?,
    );

    match args.command {
        Command::Login { username, password } => run_login(api, username, password).await,
        Command::Signup {
            username,
            password,
            email,
            phone,
        } => run_signup(api, username, password, email, phone).await,
        Command::Interests { picks } if picks.is_empty() => {
            for interest in default_catalog() {
                println!("{}. {}", interest.id, interest.name);
            }
            Ok(())
        }
        Command::Interests { picks } => run_interests(api, require_user(args.user)?, picks).await,
        Command::Topics => run_topics(api, require_user(args.user)?).await,
        Command::Quiz { topic } => run_quiz(api, require_user(args.user)?, topic).await,
        Command::History { review } => run_history(api, require_user(args.user)?, review).await,
        Command::Results { topic } => run_results(api, require_user(args.user)?, topic).await,
        Command::Profile => run_profile(api, require_user(args.user)?).await,
        Command::Checkout { amount, currency } => {
            run_checkout(api, &settings, amount, currency).await
        }
    }
}

fn require_user(user: Option<String>) -> Result<UserId> {
    user.map(UserId::from)
        .filter(|user_id| !user_id.is_blank())
        .ok_or_else(|| anyhow!("--user is required for this command"))
}

/// Waits for the first state matching `done`.
async fn settle<S: Send + 'static>(
    states: &mut StateSubscription<S>,
    done: impl Fn(&S) -> bool,
) -> Result<S> {
    while let Some(state) = states.next().await {
        if done(&state) {
            return Ok(state);
        }
    }
    Err(anyhow!("controller stopped before finishing"))
}

async fn next_effect<E: Send + 'static>(effects: &mut EffectSubscription<E>) -> Result<E> {
    effects
        .recv()
        .await
        .ok_or_else(|| anyhow!("controller stopped before finishing"))
}

async fn prompt(lines: &mut StdinLines, question: &str) -> Result<Option<String>> {
    print!("{question}");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

async fn run_login(api: Arc<HttpApiClient>, username: String, password: String) -> Result<()> {
    let session = Arc::new(InMemoryUserSession::new());
    let controller = LoginController::new(api, Arc::clone(&session) as Arc<dyn UserSession>);
    let mut states = controller.subscribe();

    controller.dispatch(LoginIntent::UsernameChanged(username))?;
    controller.dispatch(LoginIntent::PasswordChanged(password))?;
    controller.dispatch(LoginIntent::Submit)?;

    let state = settle(&mut states, |state| {
        matches!(
            state.phase,
            LoginPhase::Authenticated(_) | LoginPhase::Rejected(_)
        )
    })
    .await?;
    if let LoginPhase::Rejected(reason) = state.phase {
        bail!("login failed: {reason}");
    }

    let user = session
        .current_user()
        .ok_or_else(|| anyhow!("login finished without a signed-in user"))?;
    println!("Signed in as {}", user.username);
    if user.is_premium {
        println!("Premium: yes");
    }
    if !user.interests.is_empty() {
        println!("Interests: {}", user.interests.join(", "));
    }
    println!("Pass --user {} to the other commands.", user.username);
    Ok(())
}

async fn run_signup(
    api: Arc<HttpApiClient>,
    username: String,
    password: String,
    email: Option<String>,
    phone: Option<String>,
) -> Result<()> {
    let controller = SignupController::new(api);
    let mut effects = controller.side_effects();

    controller.set_field(SignupField::Username, username)?;
    controller.set_field(SignupField::Password, password.clone())?;
    controller.set_field(SignupField::ConfirmPassword, password)?;
    if let Some(email) = email {
        controller.set_field(SignupField::Email, email.clone())?;
        controller.set_field(SignupField::ConfirmEmail, email)?;
    }
    if let Some(phone) = phone {
        controller.set_field(SignupField::Phone, phone)?;
    }
    controller.dispatch(SignupIntent::Submit)?;

    match next_effect(&mut effects).await? {
        SignupEffect::NavigateToInterests(user_id) => {
            println!("Account created for {user_id}.");
            println!("Pick interests with: quiz --user {user_id} interests --pick <ID>");
            Ok(())
        }
        SignupEffect::ShowMessage(message) => bail!("sign-up failed: {message}"),
    }
}

async fn run_interests(api: Arc<HttpApiClient>, user: UserId, picks: Vec<String>) -> Result<()> {
    let controller = InterestsController::new(api);
    let mut effects = controller.side_effects();
    for id in picks {
        controller.toggle(id)?;
    }
    controller.continue_as(user)?;

    match next_effect(&mut effects).await? {
        InterestsEffect::NavigateHome => {
            let saved = controller.state().selected_names();
            if saved.is_empty() {
                println!("No interests selected.");
            } else {
                println!("Interests saved: {}", saved.join(", "));
            }
            Ok(())
        }
        InterestsEffect::ShowMessage(message) => bail!(message),
    }
}

async fn run_topics(api: Arc<HttpApiClient>, user: UserId) -> Result<()> {
    let controller = TopicsController::new(api);
    let mut states = controller.subscribe();
    controller.load(user)?;

    match settle(&mut states, |state| {
        matches!(state, TopicsState::Loaded { .. } | TopicsState::Failed { .. })
    })
    .await?
    {
        TopicsState::Loaded { topics, .. } if topics.is_empty() => {
            println!("No tasks available yet.");
        }
        TopicsState::Loaded { topics, .. } => {
            for card in topics {
                println!("{}. {} - {}", card.id, card.title, card.description);
            }
        }
        TopicsState::Failed { error, .. } => bail!("failed to load tasks: {error}"),
        other => bail!("unexpected topics state {other:?}"),
    }
    Ok(())
}

async fn run_quiz(api: Arc<HttpApiClient>, user: UserId, topic: String) -> Result<()> {
    let controller = QuizSessionController::new(Arc::clone(&api) as Arc<dyn QuizRepository>);
    let mut states = controller.subscribe();
    let mut effects = controller.side_effects();
    controller.initialize_task(topic.as_str(), user.clone())?;

    let session = match settle(&mut states, |state| {
        matches!(state, QuizState::Ready(_) | QuizState::Failed(_))
    })
    .await?
    {
        QuizState::Ready(session) => session,
        QuizState::Failed(failure) => bail!("failed to load quiz: {}", failure.error()),
        other => bail!("unexpected quiz state {other:?}"),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    for (index, question) in session.questions.iter().enumerate() {
        println!("\n{}. {}", index + 1, question.text);
        for (option, text) in question.options.iter().enumerate() {
            let letter = AnswerLetter::from_option_index(option)
                .map(AnswerLetter::as_str)
                .unwrap_or("-");
            println!("   {letter}) {text}");
        }
        let Some(line) = prompt(&mut lines, "answer (blank to skip): ").await? else {
            break;
        };
        let picked = AnswerLetter::parse(&line)
            .and_then(|letter| AnswerLetter::ALL.iter().position(|known| *known == letter));
        if let Some(option) = picked {
            controller.answer_selected(index, option)?;
        }
    }

    controller.submit(user.clone())?;
    loop {
        match next_effect(&mut effects).await? {
            QuizEffect::NavigateToResults { topic, result } => {
                println!("\nScore: {}/{}", result.score, result.total);
                controller.teardown();
                return run_results(api, user, topic.to_string()).await;
            }
            QuizEffect::ShowMessage(message) => {
                eprintln!("{message}");
                let retry = prompt(&mut lines, "retry submission? [y/N]: ").await?;
                if !matches!(retry.as_deref().map(str::trim), Some("y" | "Y")) {
                    bail!("quiz not submitted");
                }
                controller.submit(user.clone())?;
            }
        }
    }
}

async fn run_results(api: Arc<HttpApiClient>, user: UserId, topic: String) -> Result<()> {
    let controller = ResultsController::new(api);
    let mut states = controller.subscribe();
    controller.initialize(topic.as_str(), user)?;

    let results = match settle(&mut states, |state| {
        matches!(state, ResultsState::Loaded { .. } | ResultsState::Failed { .. })
    })
    .await?
    {
        ResultsState::Loaded { results, .. } => results,
        ResultsState::Failed { error, .. } => bail!("{error}"),
        other => bail!("unexpected results state {other:?}"),
    };

    println!("\n{} ({}/{})", results.title, results.score, results.total);
    for row in &results.rows {
        let mark = if row.is_correct() { "ok" } else { "x" };
        let answer = if row.user_answer.is_empty() {
            "-"
        } else {
            row.user_answer.as_str()
        };
        println!(
            "{}. [{mark}] {}\n   your answer: {answer}  correct: {}",
            row.number, row.question, row.correct_answer_letter
        );
    }
    Ok(())
}

async fn run_history(api: Arc<HttpApiClient>, user: UserId, review: Option<usize>) -> Result<()> {
    let controller = HistoryController::new(api);
    let mut states = controller.subscribe();
    let mut effects = controller.side_effects();
    controller.dispatch(HistoryIntent::Load(user))?;

    let (history, stats) = match settle(&mut states, |state| {
        matches!(state, HistoryState::Loaded { .. } | HistoryState::Failed { .. })
    })
    .await?
    {
        HistoryState::Loaded { history, stats, .. } => (history, stats),
        HistoryState::Failed { error, .. } => bail!("failed to load quiz history: {error}"),
        other => bail!("unexpected history state {other:?}"),
    };

    println!(
        "Quizzes: {}  correct: {}  incorrect: {}",
        stats.quizzes_done, stats.correct_answers, stats.incorrect_answers
    );
    for (index, item) in history.iter().enumerate() {
        println!(
            "{}. {} {}/{} ({})",
            index + 1,
            item.topic,
            item.score,
            item.total_questions,
            item.timestamp.format("%Y-%m-%d %H:%M")
        );
    }

    let Some(number) = review else {
        return Ok(());
    };
    controller.dispatch(HistoryIntent::Review(number.saturating_sub(1)))?;
    match next_effect(&mut effects).await? {
        HistoryEffect::ShowReview(item) => {
            println!("\n{} ({}/{})", item.topic, item.score, item.total_questions);
            for (position, question) in item.questions.iter().enumerate() {
                let answer = item
                    .user_answers
                    .get(position)
                    .map(String::as_str)
                    .filter(|answer| !answer.is_empty())
                    .unwrap_or("-");
                println!(
                    "{}. {}\n   your answer: {answer}  correct: {}",
                    position + 1,
                    question.question,
                    question.correct_answer_letter
                );
            }
            Ok(())
        }
        HistoryEffect::ShowMessage(message) => bail!(message),
    }
}

async fn run_profile(api: Arc<HttpApiClient>, user: UserId) -> Result<()> {
    let controller = ProfileController::new(api);
    let mut states = controller.subscribe();
    controller.load(user)?;

    let profile = match settle(&mut states, |state| {
        matches!(state, ProfileState::Loaded { .. } | ProfileState::Failed { .. })
    })
    .await?
    {
        ProfileState::Loaded { profile, .. } => profile,
        ProfileState::Failed { error, .. } => bail!("failed to load profile: {error}"),
        other => bail!("unexpected profile state {other:?}"),
    };
    println!("Username: {}", profile.username);
    if let Some(email) = &profile.email {
        println!("Email: {email}");
    }
    if let Some(phone) = &profile.phone {
        println!("Phone: {phone}");
    }
    if let Some(created_at) = profile.created_at {
        println!("Member since: {}", created_at.format("%Y-%m-%d"));
    }
    if !profile.interests.is_empty() {
        println!("Interests: {}", profile.interests.join(", "));
    }
    println!(
        "Quizzes: {}  correct: {}  incorrect: {}",
        profile.quizzes_done, profile.correct_answers, profile.incorrect_answers
    );
    Ok(())
}

async fn run_checkout(
    api: Arc<HttpApiClient>,
    settings: &Settings,
    amount: f64,
    currency: String,
) -> Result<()> {
    let bus = Arc::new(PaymentBus::new("payments", settings.event_bus_capacity));
    let sheet = Arc::new(ConsolePaymentSheet::new(PaymentResultAdapter::new(
        Arc::clone(&bus),
    )));
    let controller = PaymentCheckoutController::new(
        api,
        Arc::clone(&sheet) as Arc<dyn PaymentSheet>,
        &bus,
        settings.merchant_display_name.clone(),
    );
    let mut effects = controller.side_effects();
    controller.checkout(amount, currency)?;

    loop {
        match next_effect(&mut effects).await? {
            CheckoutEffect::Present {
                client_secret,
                config,
            } => {
                controller.sheet_presented()?;
                let sheet = Arc::clone(&sheet);
                tokio::task::spawn_blocking(move || sheet.present(&client_secret, &config))
                    .await
                    .context("payment sheet task failed")??;
            }
            CheckoutEffect::Outcome(PaymentOutcome::Completed) => {
                println!("Payment complete. Premium unlocked.");
                return Ok(());
            }
            CheckoutEffect::Outcome(PaymentOutcome::Canceled) => {
                println!("Payment canceled.");
                return Ok(());
            }
            CheckoutEffect::Outcome(PaymentOutcome::Failed(reason)) => {
                bail!("payment failed: {reason}")
            }
            CheckoutEffect::ShowMessage(message) => bail!(message),
        }
    }
}
