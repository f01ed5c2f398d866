//! Quiz session controller: fetch a topic quiz, collect answers, score and
//! submit them.

use std::{collections::BTreeMap, sync::Arc};

use shared::{
    domain::{AnswerLetter, TopicId, UserId},
    protocol::{QuizQuestionDto, SubmitQuizRequest},
};
use tracing::{debug, info, warn};

use crate::{
    api::QuizRepository,
    error::ClientError,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub topic: TopicId,
    pub user_id: UserId,
}

impl TaskKey {
    pub fn new(topic: impl Into<TopicId>, user_id: impl Into<UserId>) -> Self {
        Self {
            topic: topic.into(),
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
}

/// A fetched quiz plus the answers picked so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    pub key: TaskKey,
    pub questions: Vec<Question>,
    /// Correct letter per question position.
    pub correct_by_index: Vec<String>,
    /// Option index picked per question position; the last pick wins.
    pub selected_answers: BTreeMap<usize, usize>,
}

impl QuizSession {
    /// Pairs every question with its correct letter by position, so two
    /// questions with identical text keep their own answers.
    pub fn from_fetched(key: TaskKey, fetched: Vec<QuizQuestionDto>) -> Self {
        let mut questions = Vec::with_capacity(fetched.len());
        let mut correct_by_index = Vec::with_capacity(fetched.len());
        for dto in fetched {
            correct_by_index.push(normalize_letter(&dto.correct_answer_letter));
            questions.push(Question {
                text: dto.question,
                options: dto.options,
            });
        }
        Self {
            key,
            questions,
            correct_by_index,
            selected_answers: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.questions.len()
    }

    pub fn scorecard(&self) -> Scorecard {
        let selections: Vec<Option<usize>> = (0..self.questions.len())
            .map(|index| self.selected_answers.get(&index).copied())
            .collect();
        score_answers(&self.correct_by_index, &selections)
    }

    pub fn submission(&self, user_id: &UserId, scorecard: &Scorecard) -> SubmitQuizRequest {
        let questions = self
            .questions
            .iter()
            .zip(&self.correct_by_index)
            .map(|(question, correct)| QuizQuestionDto {
                question: question.text.clone(),
                options: question.options.clone(),
                correct_answer_letter: correct.clone(),
            })
            .collect();
        SubmitQuizRequest {
            user_id: user_id.to_string(),
            topic: self.key.topic.to_string(),
            score: scorecard.score,
            total_questions: self.questions.len() as u32,
            questions,
            user_answers: scorecard.answers.clone(),
        }
    }
}

fn normalize_letter(raw: &str) -> String {
    match AnswerLetter::parse(raw) {
        Some(letter) => letter.as_str().to_string(),
        None => raw.trim().to_ascii_uppercase(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    /// Letter answered per question position, `""` when unanswered.
    pub answers: Vec<String>,
    pub score: u32,
}

/// Scores positionally aligned selections against the correct letters.
///
/// Option indices map through `0→A, 1→B, 2→C, 3→D`; anything else, and an
/// unanswered position, becomes an empty answer that never scores.
pub fn score_answers(correct_by_index: &[String], selections: &[Option<usize>]) -> Scorecard {
    let mut score = 0;
    let answers = correct_by_index
        .iter()
        .enumerate()
        .map(|(position, correct)| {
            let answer = selections
                .get(position)
                .copied()
                .flatten()
                .and_then(AnswerLetter::from_option_index)
                .map(AnswerLetter::as_str)
                .unwrap_or("");
            if !answer.is_empty() && answer == correct.as_str() {
                score += 1;
            }
            answer.to_string()
        })
        .collect();
    Scorecard { answers, score }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizResult {
    pub score: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizFailure {
    Fetch { key: TaskKey, error: ClientError },
    /// Keeps the answered session so `Submit` can simply be retried.
    Submit {
        session: QuizSession,
        error: ClientError,
    },
}

impl QuizFailure {
    pub fn error(&self) -> &ClientError {
        match self {
            Self::Fetch { error, .. } | Self::Submit { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizState {
    Idle,
    Loading { key: TaskKey },
    Ready(QuizSession),
    Answering(QuizSession),
    Submitting(QuizSession),
    Submitted {
        session: QuizSession,
        result: QuizResult,
    },
    Failed(QuizFailure),
}

impl QuizState {
    pub fn key(&self) -> Option<&TaskKey> {
        match self {
            Self::Idle => None,
            Self::Loading { key } => Some(key),
            Self::Ready(session) | Self::Answering(session) | Self::Submitting(session) => {
                Some(&session.key)
            }
            Self::Submitted { session, .. } => Some(&session.key),
            Self::Failed(QuizFailure::Fetch { key, .. }) => Some(key),
            Self::Failed(QuizFailure::Submit { session, .. }) => Some(&session.key),
        }
    }

    pub fn session(&self) -> Option<&QuizSession> {
        match self {
            Self::Ready(session)
            | Self::Answering(session)
            | Self::Submitting(session)
            | Self::Submitted { session, .. }
            | Self::Failed(QuizFailure::Submit { session, .. }) => Some(session),
            Self::Idle | Self::Loading { .. } | Self::Failed(QuizFailure::Fetch { .. }) => None,
        }
    }

    /// States for which a repeated `InitializeTask` with the same key would
    /// only duplicate work already done or in flight.
    fn holds_task(&self, key: &TaskKey) -> bool {
        match self {
            Self::Loading { .. }
            | Self::Ready(_)
            | Self::Answering(_)
            | Self::Submitting(_)
            | Self::Submitted { .. } => self.key() == Some(key),
            Self::Idle | Self::Failed(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum QuizIntent {
    InitializeTask { topic: TopicId, user_id: UserId },
    AnswerSelected { question: usize, option: usize },
    Submit { user_id: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizEffect {
    ShowMessage(String),
    NavigateToResults { topic: TopicId, result: QuizResult },
}

#[derive(Debug)]
pub enum QuizOutcome {
    Fetched {
        key: TaskKey,
        result: Result<Vec<QuizQuestionDto>, ClientError>,
    },
    Submitted {
        key: TaskKey,
        result: Result<QuizResult, ClientError>,
    },
}

pub struct QuizReducer {
    repository: Arc<dyn QuizRepository>,
}

impl QuizReducer {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self { repository }
    }

    fn initialize(&self, state: &QuizState, key: TaskKey) -> Transition<Self> {
        if key.topic.is_blank() || key.user_id.is_blank() {
            let field = if key.topic.is_blank() { "topic" } else { "user id" };
            let error = ClientError::Validation { field };
            return Transition::to(QuizState::Failed(QuizFailure::Fetch {
                key,
                error: error.clone(),
            }))
            .with_effect(QuizEffect::ShowMessage(format!("Failed to load quiz: {error}")));
        }
        if state.holds_task(&key) {
            let conflict = ClientError::StateConflict(format!("quiz {} for {}", key.topic, key.user_id));
            debug!(error = %conflict, "ignoring duplicate task initialization");
            return Transition::unchanged();
        }

        info!(topic = %key.topic, user_id = %key.user_id, "loading quiz");
        let repository = Arc::clone(&self.repository);
        let fetch_key = key.clone();
        Transition::to(QuizState::Loading { key }).with_work(async move {
            let result = repository
                .fetch_quiz(&fetch_key.topic, &fetch_key.user_id)
                .await
                .map_err(|err| ClientError::network(&err));
            QuizOutcome::Fetched {
                key: fetch_key,
                result,
            }
        })
    }

    fn select(&self, state: &QuizState, question: usize, option: usize) -> Transition<Self> {
        let session = match state {
            QuizState::Ready(session)
            | QuizState::Answering(session)
            | QuizState::Failed(QuizFailure::Submit { session, .. }) => session,
            other => {
                debug!(state = discriminant_name(other), "answer ignored outside answering");
                return Transition::unchanged();
            }
        };
        if question >= session.total() {
            warn!(question, total = session.total(), "answer for unknown question ignored");
            return Transition::unchanged();
        }
        let mut session = session.clone();
        session.selected_answers.insert(question, option);
        Transition::to(QuizState::Answering(session))
    }

    fn submit(&self, state: &QuizState, user_id: UserId) -> Transition<Self> {
        let session = match state {
            QuizState::Ready(session)
            | QuizState::Answering(session)
            | QuizState::Failed(QuizFailure::Submit { session, .. }) => session.clone(),
            QuizState::Submitting(_) => {
                debug!("submission already in flight; ignoring");
                return Transition::unchanged();
            }
            other => {
                debug!(state = discriminant_name(other), "submit ignored without a loaded quiz");
                return Transition::unchanged();
            }
        };
        if user_id.is_blank() {
            let error = ClientError::Validation { field: "user id" };
            let message = format!("Failed to submit quiz: {error}");
            return Transition::to(QuizState::Failed(QuizFailure::Submit { session, error }))
                .with_effect(QuizEffect::ShowMessage(message));
        }

        let scorecard = session.scorecard();
        let request = session.submission(&user_id, &scorecard);
        let result = QuizResult {
            score: scorecard.score,
            total: request.total_questions,
        };
        info!(
            topic = %session.key.topic,
            user_id = %user_id,
            score = result.score,
            total = result.total,
            "submitting quiz"
        );

        let repository = Arc::clone(&self.repository);
        let key = session.key.clone();
        Transition::to(QuizState::Submitting(session)).with_work(async move {
            let outcome = repository
                .submit_quiz(&request)
                .await
                .map(|()| result)
                .map_err(|err| ClientError::network(&err));
            QuizOutcome::Submitted {
                key,
                result: outcome,
            }
        })
    }
}

impl Reducer for QuizReducer {
    type State = QuizState;
    type Intent = QuizIntent;
    type Outcome = QuizOutcome;
    type Effect = QuizEffect;

    fn on_intent(&self, state: &QuizState, intent: QuizIntent) -> Transition<Self> {
        match intent {
            QuizIntent::InitializeTask { topic, user_id } => {
                self.initialize(state, TaskKey { topic, user_id })
            }
            QuizIntent::AnswerSelected { question, option } => self.select(state, question, option),
            QuizIntent::Submit { user_id } => self.submit(state, user_id),
        }
    }

    fn on_outcome(&self, state: &QuizState, outcome: QuizOutcome) -> Transition<Self> {
        match outcome {
            QuizOutcome::Fetched { key, result } => {
                if !matches!(state, QuizState::Loading { key: loading } if *loading == key) {
                    warn!(topic = %key.topic, "stale quiz fetch discarded");
                    return Transition::unchanged();
                }
                match result {
                    Ok(fetched) if fetched.is_empty() => {
                        let error =
                            ClientError::NotFound(format!("no questions for topic {}", key.topic));
                        let message = format!("Failed to load quiz: {error}");
                        Transition::to(QuizState::Failed(QuizFailure::Fetch { key, error }))
                            .with_effect(QuizEffect::ShowMessage(message))
                    }
                    Ok(fetched) => {
                        info!(topic = %key.topic, questions = fetched.len(), "quiz ready");
                        Transition::to(QuizState::Ready(QuizSession::from_fetched(key, fetched)))
                    }
                    Err(error) => {
                        warn!(topic = %key.topic, error = %error, "quiz fetch failed");
                        let message = format!("Failed to load quiz: {error}");
                        Transition::to(QuizState::Failed(QuizFailure::Fetch { key, error }))
                            .with_effect(QuizEffect::ShowMessage(message))
                    }
                }
            }
            QuizOutcome::Submitted { key, result } => {
                let session = match state {
                    QuizState::Submitting(session) if session.key == key => session.clone(),
                    _ => {
                        warn!(topic = %key.topic, "stale quiz submission discarded");
                        return Transition::unchanged();
                    }
                };
                match result {
                    Ok(result) => {
                        info!(topic = %key.topic, score = result.score, "quiz submitted");
                        Transition::to(QuizState::Submitted { session, result }).with_effect(
                            QuizEffect::NavigateToResults {
                                topic: key.topic,
                                result,
                            },
                        )
                    }
                    Err(error) => {
                        warn!(topic = %key.topic, error = %error, "quiz submission failed");
                        Transition::to(QuizState::Failed(QuizFailure::Submit { session, error }))
                            .with_effect(QuizEffect::ShowMessage(
                                "Failed to submit quiz. Please try again.".to_string(),
                            ))
                    }
                }
            }
        }
    }

    fn on_work_panic(&self, state: &QuizState, reason: &str) -> Transition<Self> {
        let error = ClientError::Network(format!("request aborted: {reason}"));
        let failure = match state {
            QuizState::Loading { key } => QuizFailure::Fetch {
                key: key.clone(),
                error,
            },
            QuizState::Submitting(session) => QuizFailure::Submit {
                session: session.clone(),
                error,
            },
            _ => return Transition::unchanged(),
        };
        Transition::to(QuizState::Failed(failure)).with_effect(QuizEffect::ShowMessage(
            "Something went wrong. Please try again.".to_string(),
        ))
    }
}

fn discriminant_name(state: &QuizState) -> &'static str {
    match state {
        QuizState::Idle => "idle",
        QuizState::Loading { .. } => "loading",
        QuizState::Ready(_) => "ready",
        QuizState::Answering(_) => "answering",
        QuizState::Submitting(_) => "submitting",
        QuizState::Submitted { .. } => "submitted",
        QuizState::Failed(_) => "failed",
    }
}

pub struct QuizSessionController {
    store: Store<QuizReducer>,
}

impl QuizSessionController {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self {
            store: Store::new("quiz_session", QuizState::Idle, QuizReducer::new(repository)),
        }
    }

    pub fn dispatch(&self, intent: QuizIntent) -> Result<(), StoreClosed> {
        self.store.dispatch(intent)
    }

    pub fn initialize_task(
        &self,
        topic: impl Into<TopicId>,
        user_id: impl Into<UserId>,
    ) -> Result<(), StoreClosed> {
        self.dispatch(QuizIntent::InitializeTask {
            topic: topic.into(),
            user_id: user_id.into(),
        })
    }

    pub fn answer_selected(&self, question: usize, option: usize) -> Result<(), StoreClosed> {
        self.dispatch(QuizIntent::AnswerSelected { question, option })
    }

    pub fn submit(&self, user_id: impl Into<UserId>) -> Result<(), StoreClosed> {
        self.dispatch(QuizIntent::Submit {
            user_id: user_id.into(),
        })
    }

    pub fn state(&self) -> QuizState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<QuizState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<QuizEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/quiz_session_tests.rs"]
mod tests;
