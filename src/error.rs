//! Error type shared by the simulator, the agent and the training loop.

use thiserror::Error;

/// Errors raised by the scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The agent asked for a process slot that does not exist.
    #[error("invalid action {action}: environment has {slots} process slots")]
    InvalidAction { action: usize, slots: usize },

    /// A configuration value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A hand-built process set does not fill every slot.
    #[error("expected {expected} processes, got {actual}")]
    ProcessCount { expected: usize, actual: usize },

    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchedulerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
