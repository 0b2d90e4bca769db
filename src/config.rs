//! Hyperparameters for the environment, the agent and the training loop.
//!
//! Every section has defaults matching the reference setup (5 process slots,
//! a 6-feature state, a 10 000 entry replay buffer, batches of 64, γ = 0.99,
//! ε decaying from 1.0 to 0.01 by 0.995 per learning step, learning rate 1e-3).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SchedulerError};
use crate::process::STATE_SIZE;

/// Environment variable pointing at a JSON configuration file.
pub const CONFIG_PATH_VAR: &str = "SCHEDULER_CONFIG";
/// Environment variable overriding the number of training episodes.
pub const EPISODES_VAR: &str = "SCHEDULER_EPISODES";
/// Environment variable overriding the random seed.
pub const SEED_VAR: &str = "SCHEDULER_SEED";

/// Which reward function `SchedulingEnvironment::step` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardPolicy {
    /// Penalise the selected process's waiting time, pay a bonus on completion.
    #[default]
    WaitingTime,
    /// Score the selected process by priority, remaining burst, waiting time,
    /// I/O affinity and memory footprint.
    AttributeWeighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Number of process slots, which is also the size of the action space.
    pub num_processes: usize,
    pub reward_policy: RewardPolicy,
    /// Reward lost per unit of waiting time of the selected process.
    pub waiting_penalty: f32,
    /// Reward paid when the selected process finishes on this step.
    pub completion_bonus: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            num_processes: 5,
            reward_policy: RewardPolicy::WaitingTime,
            waiting_penalty: 0.1,
            completion_bonus: 1.0,
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_processes == 0 {
            return Err(SchedulerError::config("num_processes must be positive"));
        }
        if !self.waiting_penalty.is_finite() || self.waiting_penalty < 0.0 {
            return Err(SchedulerError::config(
                "waiting_penalty must be a finite non-negative number",
            ));
        }
        if !self.completion_bonus.is_finite() {
            return Err(SchedulerError::config("completion_bonus must be finite"));
        }
        Ok(())
    }
}

/// DQN agent hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub state_size: usize,
    pub action_size: usize,
    pub hidden_size: usize,
    pub learning_rate: f64,
    pub gamma: f32,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    pub replay_buffer_capacity: usize,
    pub batch_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_size: STATE_SIZE,
            action_size: 5,
            hidden_size: 64,
            learning_rate: 1e-3,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            replay_buffer_capacity: 10_000,
            batch_size: 64,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.state_size != STATE_SIZE {
            return Err(SchedulerError::config(format!(
                "state_size must be {STATE_SIZE}, got {}",
                self.state_size
            )));
        }
        if self.action_size == 0 || self.hidden_size == 0 {
            return Err(SchedulerError::config(
                "action_size and hidden_size must be positive",
            ));
        }
        if self.replay_buffer_capacity == 0 || self.batch_size == 0 {
            return Err(SchedulerError::config(
                "replay_buffer_capacity and batch_size must be positive",
            ));
        }
        if self.batch_size > self.replay_buffer_capacity {
            return Err(SchedulerError::config(format!(
                "batch_size {} exceeds replay_buffer_capacity {}",
                self.batch_size, self.replay_buffer_capacity
            )));
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(SchedulerError::config("gamma must lie in (0, 1)"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(SchedulerError::config("learning_rate must be positive"));
        }
        if !(self.epsilon_min > 0.0 && self.epsilon_min <= self.epsilon_start) {
            return Err(SchedulerError::config(
                "epsilon_min must lie in (0, epsilon_start]",
            ));
        }
        if self.epsilon_start > 1.0 {
            return Err(SchedulerError::config("epsilon_start must not exceed 1"));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(SchedulerError::config("epsilon_decay must lie in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    /// Greedy episodes run after training.
    pub eval_episodes: usize,
    /// Step ceiling for a greedy episode, since ε = 0 gives no liveness guarantee.
    pub eval_step_limit: usize,
    /// Emit an `info` record every `log_every` episodes.
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 50,
            eval_episodes: 5,
            eval_step_limit: 1_000,
            log_every: 1,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.eval_step_limit == 0 {
            return Err(SchedulerError::config("eval_step_limit must be positive"));
        }
        if self.log_every == 0 {
            return Err(SchedulerError::config("log_every must be positive"));
        }
        Ok(())
    }
}

/// Complete configuration of one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seed for every random source. `None` draws from the OS.
    pub seed: Option<u64>,
    pub environment: EnvConfig,
    pub agent: AgentConfig,
    pub training: TrainingConfig,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        self.environment.validate()?;
        self.agent.validate()?;
        self.training.validate()?;
        if self.agent.action_size != self.environment.num_processes {
            return Err(SchedulerError::config(format!(
                "action_size {} does not match num_processes {}",
                self.agent.action_size, self.environment.num_processes
            )));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults, or the file named by `SCHEDULER_CONFIG`, with the
    /// `SCHEDULER_EPISODES` and `SCHEDULER_SEED` overrides applied on top.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(episodes) = std::env::var(EPISODES_VAR) {
            config.training.episodes = episodes
                .parse()
                .map_err(|_| SchedulerError::config(format!("{EPISODES_VAR}={episodes}")))?;
        }
        if let Ok(seed) = std::env::var(SEED_VAR) {
            config.seed = Some(
                seed.parse()
                    .map_err(|_| SchedulerError::config(format!("{SEED_VAR}={seed}")))?,
            );
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment.num_processes, 5);
        assert_eq!(config.agent.replay_buffer_capacity, 10_000);
        assert_eq!(config.agent.batch_size, 64);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = SchedulerConfig::default();
        config.agent.gamma = 1.0;
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));

        let mut config = SchedulerConfig::default();
        config.agent.replay_buffer_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.agent.epsilon_min = 0.0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.agent.batch_size = 20_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_action_space() {
        let mut config = SchedulerConfig::default();
        config.environment.num_processes = 7;
        assert!(config.validate().is_err());

        config.agent.action_size = 7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"seed": 7, "environment": {"reward_policy": "attribute_weighted"}}"#)
                .unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(
            config.environment.reward_policy,
            RewardPolicy::AttributeWeighted
        );
        assert_eq!(config.agent, AgentConfig::default());
    }
}
