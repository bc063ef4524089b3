use thiserror::Error;

/// Failure reported by a caller-supplied action.
///
/// The queue never interprets it; it only decides between retry and
/// completion through the entry's retry predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ActionError(String);

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Raised by `WorkQueueBuilder::build` when the configuration cannot run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("channel capacity must be greater than zero")]
    ZeroChannelCapacity,

    #[error("drain interval must be greater than zero")]
    ZeroDrainInterval,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("unknown discipline: {0}")]
    UnknownDiscipline(String),

    #[error("work queue is no longer accepting submissions")]
    Closed,

    #[error("submission channel is full")]
    Full,

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
