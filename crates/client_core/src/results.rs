//! Results screen for the most recent attempt at a topic.

use std::sync::Arc;

use shared::protocol::QuizHistoryItem;
use tracing::{debug, info, warn};

use crate::{
    api::QuizRepository,
    error::ClientError,
    quiz_session::TaskKey,
    store::{EffectSubscription, Reducer, StateSubscription, Store, StoreClosed, Transition},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    /// 1-based position in the quiz.
    pub number: usize,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_letter: String,
    /// `""` when the question was left unanswered.
    pub user_answer: String,
}

impl ResultRow {
    pub fn is_correct(&self) -> bool {
        !self.user_answer.is_empty() && self.user_answer == self.correct_answer_letter
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizResults {
    pub title: String,
    pub topic: String,
    pub score: u32,
    pub total: u32,
    pub rows: Vec<ResultRow>,
}

impl QuizResults {
    fn from_history(item: QuizHistoryItem) -> Self {
        let mut answers = item.user_answers.into_iter();
        let rows = item
            .questions
            .into_iter()
            .enumerate()
            .map(|(position, question)| ResultRow {
                number: position + 1,
                question: question.question,
                options: question.options,
                correct_answer_letter: question.correct_answer_letter,
                user_answer: answers.next().unwrap_or_default(),
            })
            .collect();
        Self {
            title: format!("Results: {}", item.topic),
            topic: item.topic,
            score: item.score,
            total: item.total_questions,
            rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsState {
    Idle,
    Loading { key: TaskKey },
    Loaded { key: TaskKey, results: QuizResults },
    Failed { key: TaskKey, error: ClientError },
}

impl ResultsState {
    fn holds(&self, key: &TaskKey) -> bool {
        match self {
            Self::Loading { key: current } | Self::Loaded { key: current, .. } => current == key,
            Self::Idle | Self::Failed { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResultsIntent {
    Initialize(TaskKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsEffect {
    ShowMessage(String),
}

#[derive(Debug)]
pub struct ResultsOutcome {
    key: TaskKey,
    result: Result<QuizResults, ClientError>,
}

pub struct ResultsReducer {
    repository: Arc<dyn QuizRepository>,
}

impl Reducer for ResultsReducer {
    type State = ResultsState;
    type Intent = ResultsIntent;
    type Outcome = ResultsOutcome;
    type Effect = ResultsEffect;

    fn on_intent(&self, state: &ResultsState, intent: ResultsIntent) -> Transition<Self> {
        let ResultsIntent::Initialize(key) = intent;
        if key.topic.is_blank() || key.user_id.is_blank() {
            let field = if key.topic.is_blank() { "topic" } else { "user id" };
            let error = ClientError::Validation { field };
            let message = format!("Failed to load results: {error}");
            return Transition::to(ResultsState::Failed { key, error })
                .with_effect(ResultsEffect::ShowMessage(message));
        }
        if state.holds(&key) {
            debug!(topic = %key.topic, "results already requested; ignoring");
            return Transition::unchanged();
        }

        let repository = Arc::clone(&self.repository);
        let request = key.clone();
        Transition::to(ResultsState::Loading { key }).with_work(async move {
            let result = match repository.fetch_history(&request.user_id).await {
                Ok(history) => history
                    .into_iter()
                    .rev()
                    .find(|item| item.topic == request.topic.as_str())
                    .map(QuizResults::from_history)
                    .ok_or_else(|| {
                        ClientError::NotFound(format!("no results for topic {}", request.topic))
                    }),
                Err(err) => Err(ClientError::network(&err)),
            };
            ResultsOutcome {
                key: request,
                result,
            }
        })
    }

    fn on_outcome(&self, state: &ResultsState, outcome: ResultsOutcome) -> Transition<Self> {
        let ResultsOutcome { key, result } = outcome;
        if !matches!(state, ResultsState::Loading { key: loading } if *loading == key) {
            return Transition::unchanged();
        }
        match result {
            Ok(results) => {
                info!(topic = %key.topic, score = results.score, total = results.total, "results loaded");
                Transition::to(ResultsState::Loaded { key, results })
            }
            Err(error) => {
                warn!(topic = %key.topic, error = %error, "results unavailable");
                let message = format!("Failed to load results: {error}");
                Transition::to(ResultsState::Failed { key, error })
                    .with_effect(ResultsEffect::ShowMessage(message))
            }
        }
    }

    fn on_work_panic(&self, state: &ResultsState, reason: &str) -> Transition<Self> {
        match state {
            ResultsState::Loading { key } => Transition::to(ResultsState::Failed {
                key: key.clone(),
                error: ClientError::Network(format!("request aborted: {reason}")),
            }),
            _ => Transition::unchanged(),
        }
    }
}

pub struct ResultsController {
    store: Store<ResultsReducer>,
}

impl ResultsController {
    pub fn new(repository: Arc<dyn QuizRepository>) -> Self {
        Self {
            store: Store::new("results", ResultsState::Idle, ResultsReducer { repository }),
        }
    }

    pub fn initialize(
        &self,
        topic: impl Into<shared::domain::TopicId>,
        user_id: impl Into<shared::domain::UserId>,
    ) -> Result<(), StoreClosed> {
        self.store
            .dispatch(ResultsIntent::Initialize(TaskKey::new(topic, user_id)))
    }

    pub fn state(&self) -> ResultsState {
        self.store.state()
    }

    pub fn subscribe(&self) -> StateSubscription<ResultsState> {
        self.store.subscribe()
    }

    pub fn side_effects(&self) -> EffectSubscription<ResultsEffect> {
        self.store.side_effects()
    }

    pub fn teardown(&self) {
        self.store.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/results_tests.rs"]
mod tests;
