//! Episode driver: agent and environment interaction, learning and target sync.

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{SchedulerConfig, TrainingConfig};
use crate::environment::{EpisodeMetrics, SchedulingEnvironment};
use crate::error::{Result, SchedulerError};
use crate::qnetwork::DQNAgent;
use crate::replay::Experience;

/// Statistics of one training episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeReport {
    pub episode: usize,
    pub total_reward: f32,
    /// Exploration rate after the episode's last learning step.
    pub epsilon: f64,
    pub steps: u64,
    pub last_loss: Option<f32>,
}

/// Everything a finished training run hands back.
pub struct TrainingOutcome {
    pub agent: DQNAgent,
    /// Carries the per-episode performance metrics.
    pub environment: SchedulingEnvironment,
    pub rewards_history: Vec<f32>,
}

/// Result of one greedy evaluation episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvaluationEpisode {
    pub total_reward: f32,
    pub steps: u64,
    /// Hit the step limit before every process finished.
    pub truncated: bool,
    pub metrics: Option<EpisodeMetrics>,
}

/// Builds the environment and agent described by `config` and trains them.
pub fn train(config: &SchedulerConfig) -> Result<TrainingOutcome> {
    config.validate()?;
    let (environment, agent) = match config.seed {
        Some(seed) => (
            SchedulingEnvironment::with_rng(config.environment.clone(), StdRng::seed_from_u64(seed))?,
            DQNAgent::with_seed(config.agent.clone(), seed.wrapping_add(1))?,
        ),
        None => (
            SchedulingEnvironment::new(config.environment.clone())?,
            DQNAgent::new(config.agent.clone())?,
        ),
    };
    train_with(environment, agent, &config.training, |_| {})
}

/// Every process slot must be a selectable action, or unselectable processes never finish.
fn check_action_space(environment: &SchedulingEnvironment, agent: &DQNAgent) -> Result<()> {
    let action_size = agent.config().action_size;
    let num_processes = environment.num_processes();
    if action_size != num_processes {
        return Err(SchedulerError::config(format!(
            "agent action_size {action_size} does not match environment num_processes {num_processes}"
        )));
    }
    Ok(())
}

/// Runs `training.episodes` episodes. `on_episode` sees every report as it is produced.
pub fn train_with<F>(
    mut environment: SchedulingEnvironment,
    mut agent: DQNAgent,
    training: &TrainingConfig,
    mut on_episode: F,
) -> Result<TrainingOutcome>
where
    F: FnMut(&EpisodeReport),
{
    training.validate()?;
    check_action_space(&environment, &agent)?;
    let mut rewards_history = Vec::with_capacity(training.episodes);

    for episode in 0..training.episodes {
        let report = run_episode(&mut environment, &mut agent, episode)?;
        agent.sync_target()?;
        debug!(episode, "target network synchronised");

        if (episode + 1) % training.log_every == 0 {
            info!(
                episode,
                total_reward = report.total_reward,
                epsilon = report.epsilon,
                steps = report.steps,
                "episode finished"
            );
        }

        rewards_history.push(report.total_reward);
        on_episode(&report);
    }

    Ok(TrainingOutcome {
        agent,
        environment,
        rewards_history,
    })
}

/// One episode: select, apply, store and learn until every process has finished.
pub fn run_episode(
    environment: &mut SchedulingEnvironment,
    agent: &mut DQNAgent,
    episode: usize,
) -> Result<EpisodeReport> {
    let mut state = environment.reset();
    let mut total_reward = 0.0;
    let mut steps = 0;
    let mut last_loss = None;

    loop {
        let action = agent.select_action(&state)?;
        let (next_state, reward, done) = environment.step(action)?;

        agent.remember(Experience {
            state,
            action,
            reward,
            next_state,
            done,
        });
        if let Some(loss) = agent.learn()? {
            last_loss = Some(loss);
        }

        state = next_state;
        total_reward += reward;
        steps += 1;

        if done {
            break;
        }
    }

    Ok(EpisodeReport {
        episode,
        total_reward,
        epsilon: agent.epsilon(),
        steps,
        last_loss,
    })
}

/// Plays `episodes` greedy episodes without learning.
///
/// A greedy policy may keep picking a finished process, so each episode is
/// cut off after `step_limit` steps and reported as truncated. The agent's
/// exploration rate is restored afterwards.
pub fn evaluate(
    environment: &mut SchedulingEnvironment,
    agent: &mut DQNAgent,
    episodes: usize,
    step_limit: usize,
) -> Result<Vec<EvaluationEpisode>> {
    check_action_space(environment, agent)?;
    let epsilon = agent.epsilon();
    agent.set_epsilon(0.0);

    let mut results = Vec::with_capacity(episodes);
    for episode in 0..episodes {
        let outcome = evaluate_episode(environment, agent, step_limit);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                agent.set_epsilon(epsilon);
                return Err(err);
            }
        };
        debug!(
            episode,
            total_reward = outcome.total_reward,
            steps = outcome.steps,
            truncated = outcome.truncated,
            "evaluation episode finished"
        );
        results.push(outcome);
    }

    agent.set_epsilon(epsilon);
    Ok(results)
}

fn evaluate_episode(
    environment: &mut SchedulingEnvironment,
    agent: &DQNAgent,
    step_limit: usize,
) -> Result<EvaluationEpisode> {
    let mut state = environment.reset();
    let mut total_reward = 0.0;

    for step in 1..=step_limit {
        let action = agent.greedy_action(&state)?;
        let (next_state, reward, done) = environment.step(action)?;
        state = next_state;
        total_reward += reward;

        if done {
            return Ok(EvaluationEpisode {
                total_reward,
                steps: step as u64,
                truncated: false,
                metrics: environment.last_episode().copied(),
            });
        }
    }

    Ok(EvaluationEpisode {
        total_reward,
        steps: step_limit as u64,
        truncated: true,
        metrics: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, EnvConfig};

    fn quick_config(episodes: usize) -> SchedulerConfig {
        SchedulerConfig {
            seed: Some(42),
            environment: EnvConfig::default(),
            agent: AgentConfig {
                batch_size: 8,
                replay_buffer_capacity: 256,
                hidden_size: 16,
                ..AgentConfig::default()
            },
            training: TrainingConfig {
                episodes,
                ..TrainingConfig::default()
            },
        }
    }

    #[test]
    fn training_records_one_entry_per_episode() {
        let outcome = train(&quick_config(3)).unwrap();
        assert_eq!(outcome.rewards_history.len(), 3);
        assert_eq!(outcome.environment.performance_metrics().len(), 3);
        assert!(outcome.agent.learn_steps() > 0);
        assert!(outcome.agent.epsilon() < 1.0);
    }

    #[test]
    fn observer_sees_every_episode_in_order() {
        let config = quick_config(4);
        let env = SchedulingEnvironment::with_rng(config.environment.clone(), StdRng::seed_from_u64(1))
            .unwrap();
        let agent = DQNAgent::with_seed(config.agent.clone(), 2).unwrap();

        let mut seen = Vec::new();
        let outcome = train_with(env, agent, &config.training, |report| {
            seen.push((report.episode, report.total_reward));
        })
        .unwrap();

        let episodes: Vec<usize> = seen.iter().map(|(e, _)| *e).collect();
        assert_eq!(episodes, vec![0, 1, 2, 3]);
        let rewards: Vec<f32> = seen.iter().map(|(_, r)| *r).collect();
        assert_eq!(rewards, outcome.rewards_history);
    }

    #[test]
    fn mismatched_action_space_is_rejected() {
        let config = quick_config(1);
        let agent_config = AgentConfig {
            action_size: 3,
            ..config.agent.clone()
        };

        let env = SchedulingEnvironment::with_rng(config.environment.clone(), StdRng::seed_from_u64(1))
            .unwrap();
        let agent = DQNAgent::with_seed(agent_config.clone(), 2).unwrap();
        let result = train_with(env, agent, &config.training, |_| {});
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));

        let mut env = SchedulingEnvironment::with_rng(config.environment.clone(), StdRng::seed_from_u64(1))
            .unwrap();
        let mut agent = DQNAgent::with_seed(agent_config, 2).unwrap();
        let result = evaluate(&mut env, &mut agent, 1, 10);
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn targets_match_policy_after_training() {
        let outcome = train(&quick_config(2)).unwrap();
        let sample_state = [0.4, 0.3, 0.2, 0.5, 0.5, 0.2];
        assert_eq!(
            outcome.agent.q_values(&sample_state).unwrap(),
            outcome.agent.target_q_values(&sample_state).unwrap()
        );
    }

    #[test]
    fn evaluation_restores_epsilon_and_respects_step_limit() {
        let config = quick_config(1);
        let mut outcome = train(&config).unwrap();
        let epsilon = outcome.agent.epsilon();

        let results = evaluate(&mut outcome.environment, &mut outcome.agent, 3, 40).unwrap();
        assert_eq!(results.len(), 3);
        for result in &results {
            assert!(result.steps <= 40);
            assert_eq!(result.truncated, result.metrics.is_none());
        }
        assert_eq!(outcome.agent.epsilon(), epsilon);
    }
}
