use thiserror::Error;

/// Failure taxonomy shared by every controller.
///
/// Controllers never let these escape: each one is folded into a `Failed`
/// state and surfaced once as a message side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("missing {field}")]
    Validation { field: &'static str },
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    NotFound(String),
    #[error("request already in progress: {0}")]
    StateConflict(String),
}

impl ClientError {
    pub fn network(err: &anyhow::Error) -> Self {
        Self::Network(format!("{err:#}"))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
