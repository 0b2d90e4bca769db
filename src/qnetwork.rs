//! Q-value approximator and the DQN agent that trains it.
//!
//! The agent owns two structurally identical networks in separate
//! `VarStore`s. Gradient steps only ever touch the policy store; the target
//! store changes only through [`DQNAgent::sync_target`].

use rand::{rngs::StdRng, Rng, SeedableRng};
use tch::{
    nn::{self, Module, OptimizerConfig, VarStore},
    Device, Kind, Reduction, Tensor,
};

use crate::config::AgentConfig;
use crate::environment::Action;
use crate::error::Result;
use crate::process::State;
use crate::replay::{Experience, ReplayBuffer};

/// Three-layer perceptron mapping a state to one value per process slot.
#[derive(Debug)]
pub struct QNetwork {
    seq: nn::Sequential,
}

impl QNetwork {
    pub fn new(vs: &nn::Path, state_size: i64, hidden_size: i64, action_size: i64) -> Self {
        let seq = nn::seq()
            .add(nn::linear(vs / "layer1", state_size, hidden_size, Default::default()))
            .add_fn(|xs| xs.relu())
            .add(nn::linear(vs / "layer2", hidden_size, hidden_size, Default::default()))
            .add_fn(|xs| xs.relu())
            .add(nn::linear(vs / "layer3", hidden_size, action_size, Default::default()));
        Self { seq }
    }
}

impl nn::Module for QNetwork {
    fn forward(&self, xs: &Tensor) -> Tensor {
        self.seq.forward(xs)
    }
}

/// ε-greedy Deep Q-Learning agent with experience replay and a target network.
pub struct DQNAgent {
    config: AgentConfig,
    policy_network: QNetwork,
    target_network: QNetwork,
    vs_policy: VarStore,
    vs_target: VarStore,
    optimizer: nn::Optimizer,
    replay_buffer: ReplayBuffer,
    epsilon: f64,
    learn_steps: u64,
    rng: StdRng,
    device: Device,
}

impl DQNAgent {
    /// Builds an agent with OS-seeded exploration and replay sampling.
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    pub fn with_rng(config: AgentConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let device = Device::cuda_if_available();
        let (state_size, hidden_size, action_size) = (
            config.state_size as i64,
            config.hidden_size as i64,
            config.action_size as i64,
        );

        let vs_policy = VarStore::new(device);
        let policy_network = QNetwork::new(&vs_policy.root(), state_size, hidden_size, action_size);

        let mut vs_target = VarStore::new(device);
        let target_network = QNetwork::new(&vs_target.root(), state_size, hidden_size, action_size);
        vs_target.copy(&vs_policy)?;

        let optimizer = nn::Adam::default().build(&vs_policy, config.learning_rate)?;

        Ok(Self {
            replay_buffer: ReplayBuffer::new(config.replay_buffer_capacity)?,
            epsilon: config.epsilon_start,
            config,
            policy_network,
            target_network,
            vs_policy,
            vs_target,
            optimizer,
            learn_steps: 0,
            rng,
            device,
        })
    }

    /// Seeds exploration, replay sampling and torch's weight initialisation.
    pub fn with_seed(config: AgentConfig, seed: u64) -> Result<Self> {
        tch::manual_seed(seed as i64);
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn state_tensor(&self, state: &State) -> Tensor {
        Tensor::from_slice(state)
            .to_device(self.device)
            .view([1, self.config.state_size as i64])
    }

    fn evaluate(&self, network: &QNetwork, state: &State) -> Result<Vec<f32>> {
        let xs = self.state_tensor(state);
        let q_values = tch::no_grad(|| network.forward(&xs))
            .view([-1])
            .to_kind(Kind::Float)
            .to_device(Device::Cpu);
        Ok(Vec::<f32>::try_from(&q_values)?)
    }

    /// Policy network's value estimate for every action.
    pub fn q_values(&self, state: &State) -> Result<Vec<f32>> {
        self.evaluate(&self.policy_network, state)
    }

    /// Target network's value estimate for every action.
    pub fn target_q_values(&self, state: &State) -> Result<Vec<f32>> {
        self.evaluate(&self.target_network, state)
    }

    /// Highest-valued action under the policy network. Ties go to the lowest index.
    pub fn greedy_action(&self, state: &State) -> Result<Action> {
        let q_values = self.q_values(state)?;
        let mut best = 0;
        for (action, value) in q_values.iter().enumerate().skip(1) {
            if *value > q_values[best] {
                best = action;
            }
        }
        Ok(best)
    }

    /// ε-greedy action selection.
    pub fn select_action(&mut self, state: &State) -> Result<Action> {
        if self.epsilon > 0.0 && self.rng.random::<f64>() < self.epsilon {
            Ok(self.rng.random_range(0..self.config.action_size))
        } else {
            self.greedy_action(state)
        }
    }

    pub fn remember(&mut self, experience: Experience) {
        self.replay_buffer.push(experience);
    }

    /// One gradient step on a uniformly sampled batch.
    ///
    /// Returns `Ok(None)` without touching the networks or ε while the buffer
    /// holds fewer than `batch_size` experiences; otherwise the batch loss.
    pub fn learn(&mut self) -> Result<Option<f32>> {
        let batch_size = self.config.batch_size;
        let state_size = self.config.state_size;
        let Some(batch) = self.replay_buffer.sample(&mut self.rng, batch_size) else {
            return Ok(None);
        };

        let mut states = Vec::with_capacity(batch_size * state_size);
        let mut next_states = Vec::with_capacity(batch_size * state_size);
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Vec::with_capacity(batch_size);
        let mut not_done = Vec::with_capacity(batch_size);
        for experience in &batch {
            states.extend_from_slice(&experience.state);
            next_states.extend_from_slice(&experience.next_state);
            actions.push(experience.action as i64);
            rewards.push(experience.reward);
            not_done.push(if experience.done { 0.0f32 } else { 1.0 });
        }

        let shape = [batch_size as i64, state_size as i64];
        let states = Tensor::from_slice(&states).to_device(self.device).view(shape);
        let next_states = Tensor::from_slice(&next_states)
            .to_device(self.device)
            .view(shape);
        let actions = Tensor::from_slice(&actions)
            .to_device(self.device)
            .view([-1, 1]);
        let rewards = Tensor::from_slice(&rewards).to_device(self.device);
        let not_done = Tensor::from_slice(&not_done).to_device(self.device);

        // Bellman target from the frozen network.
        let target_q = tch::no_grad(|| {
            let max_next_q = self.target_network.forward(&next_states).max_dim(1, false).0;
            &rewards + max_next_q * &not_done * f64::from(self.config.gamma)
        });

        let current_q = self
            .policy_network
            .forward(&states)
            .gather(1, &actions, false)
            .squeeze_dim(1);

        let loss = current_q.mse_loss(&target_q, Reduction::Mean);
        self.optimizer.backward_step(&loss);

        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        self.learn_steps += 1;

        Ok(Some(loss.double_value(&[]) as f32))
    }

    /// Overwrites every target parameter with the policy's current value.
    pub fn sync_target(&mut self) -> Result<()> {
        self.vs_target.copy(&self.vs_policy)?;
        Ok(())
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Overrides the exploration rate, e.g. 0.0 for greedy evaluation.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn learn_steps(&self) -> u64 {
        self.learn_steps
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> AgentConfig {
        AgentConfig {
            batch_size: 4,
            replay_buffer_capacity: 32,
            ..AgentConfig::default()
        }
    }

    fn experience(i: usize) -> Experience {
        let x = i as f32 / 10.0;
        Experience {
            state: [x, 0.5, 0.1, 0.4, 0.3, 0.2],
            action: i % 5,
            reward: -0.1 * i as f32,
            next_state: [x + 0.1, 0.45, 0.12, 0.4, 0.3, 0.2],
            done: i % 7 == 0,
        }
    }

    #[test]
    fn new_agent_starts_synchronised() {
        let agent = DQNAgent::with_seed(small_config(), 5).unwrap();
        let sample_state = [0.3, 0.6, 0.1, 0.5, 0.4, 0.2];
        assert_eq!(
            agent.q_values(&sample_state).unwrap(),
            agent.target_q_values(&sample_state).unwrap()
        );
        assert_eq!(agent.epsilon(), 1.0);
    }

    #[test]
    fn q_values_cover_every_action() {
        let agent = DQNAgent::with_seed(small_config(), 5).unwrap();
        let values = agent.q_values(&[0.0; 6]).unwrap();
        assert_eq!(values.len(), 5);
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn learn_changes_policy_but_not_target() {
        let mut agent = DQNAgent::with_seed(small_config(), 9).unwrap();
        for i in 0..8 {
            agent.remember(experience(i));
        }
        let sample_state = [0.2, 0.5, 0.3, 0.5, 0.5, 0.2];
        let policy_before = agent.q_values(&sample_state).unwrap();
        let target_before = agent.target_q_values(&sample_state).unwrap();

        let loss = agent.learn().unwrap();
        assert!(loss.is_some_and(f32::is_finite));
        assert_eq!(agent.learn_steps(), 1);

        assert_ne!(agent.q_values(&sample_state).unwrap(), policy_before);
        assert_eq!(agent.target_q_values(&sample_state).unwrap(), target_before);
    }

    #[test]
    fn random_actions_stay_in_range() {
        let mut agent = DQNAgent::with_seed(small_config(), 1).unwrap();
        for _ in 0..200 {
            assert!(agent.select_action(&[0.5; 6]).unwrap() < 5);
        }
    }

    #[test]
    fn set_epsilon_clamps_to_probability() {
        let mut agent = DQNAgent::with_seed(small_config(), 1).unwrap();
        agent.set_epsilon(-3.0);
        assert_eq!(agent.epsilon(), 0.0);
        agent.set_epsilon(7.0);
        assert_eq!(agent.epsilon(), 1.0);
    }
}
