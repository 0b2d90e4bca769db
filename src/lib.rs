//! This crate trains a Deep Q-Network agent to schedule simulated processes on
//! a single CPU. It includes modules for the process model, the scheduling
//! environment, the replay buffer, the Q-network and agent, the training loop,
//! and classical baseline policies to compare against.

pub mod baseline;
pub mod config;
pub mod environment;
pub mod error;
pub mod process;
pub mod qnetwork;
pub mod replay;
pub mod training;

pub use config::{AgentConfig, EnvConfig, RewardPolicy, SchedulerConfig, TrainingConfig};
pub use environment::{Action, EpisodeMetrics, PerformanceMetrics, SchedulingEnvironment};
pub use error::{Result, SchedulerError};
pub use process::{Process, State, STATE_SIZE};
pub use qnetwork::{DQNAgent, QNetwork};
pub use replay::{Experience, ReplayBuffer};
pub use training::{evaluate, train, train_with, EpisodeReport, EvaluationEpisode, TrainingOutcome};
