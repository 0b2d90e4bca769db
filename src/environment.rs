//! This module defines the CPU scheduling environment: a fixed set of simulated
//! processes competing for one CPU, the transition applied when the agent picks
//! a process, the reward for that pick, and the performance metrics recorded at
//! the end of every episode.

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::config::{EnvConfig, RewardPolicy};
use crate::error::{Result, SchedulerError};
use crate::process::{aggregate_state, Process, State};

/// Index of the process slot that receives the CPU for one step.
pub type Action = usize;

/// Summary of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeMetrics {
    pub avg_waiting_time: f64,
    /// Mean of waiting time plus initial burst.
    pub avg_turnaround_time: f64,
    /// Elapsed time over elapsed time plus total waiting time.
    pub cpu_utilization: f64,
    pub steps: u64,
}

/// Per-episode history, one entry appended per completed episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub avg_waiting_time: Vec<f64>,
    pub avg_turnaround_time: Vec<f64>,
    pub cpu_utilization: Vec<f64>,
}

impl PerformanceMetrics {
    fn record(&mut self, metrics: &EpisodeMetrics) {
        self.avg_waiting_time.push(metrics.avg_waiting_time);
        self.avg_turnaround_time.push(metrics.avg_turnaround_time);
        self.cpu_utilization.push(metrics.cpu_utilization);
    }

    pub fn len(&self) -> usize {
        self.avg_waiting_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avg_waiting_time.is_empty()
    }
}

/// Simulated single-CPU scheduler.
///
/// Processes live in a fixed-length arena addressed directly by the action
/// index. The arena is regenerated on every `reset`.
#[derive(Debug)]
pub struct SchedulingEnvironment {
    config: EnvConfig,
    processes: Vec<Process>, // One entry per slot; the action is the index.
    current_time: u64,       // Steps since the last reset.
    last_episode: Option<EpisodeMetrics>,
    performance_metrics: PerformanceMetrics,
    rng: StdRng, // Source of every process attribute.
}

impl SchedulingEnvironment {
    /// Creates an environment seeded from the OS.
    pub fn new(config: EnvConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Creates an environment drawing process attributes from `rng`.
    pub fn with_rng(config: EnvConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let mut env = Self {
            config,
            processes: Vec::new(),
            current_time: 0,
            last_episode: None,
            performance_metrics: PerformanceMetrics::default(),
            rng,
        };
        env.reset();
        Ok(env)
    }

    /// Replaces every process with a freshly randomized one and rewinds the clock.
    /// Returns the initial aggregate state.
    pub fn reset(&mut self) -> State {
        let rng = &mut self.rng;
        self.processes = (0..self.config.num_processes)
            .map(|pid| Process::random(pid, &mut *rng))
            .collect();
        self.current_time = 0;
        self.state()
    }

    /// Starts an episode from a hand-built process set instead of random draws.
    /// Process ids are reassigned to match their slots.
    pub fn reset_with(&mut self, mut processes: Vec<Process>) -> Result<State> {
        if processes.len() != self.config.num_processes {
            return Err(SchedulerError::ProcessCount {
                expected: self.config.num_processes,
                actual: processes.len(),
            });
        }
        for (pid, process) in processes.iter_mut().enumerate() {
            process.pid = pid;
        }
        self.processes = processes;
        self.current_time = 0;
        Ok(self.state())
    }

    /// Gives the CPU to process `action` for one time unit.
    /// Returns the next state, the reward and whether every process has finished.
    pub fn step(&mut self, action: Action) -> Result<(State, f32, bool)> {
        if action >= self.processes.len() {
            return Err(SchedulerError::InvalidAction {
                action,
                slots: self.processes.len(),
            });
        }

        let was_done = self.is_done();

        // Everyone else waits while the selected process runs.
        for (slot, process) in self.processes.iter_mut().enumerate() {
            if slot == action {
                process.in_cpu = true;
            } else {
                process.in_cpu = false;
                process.waiting_time += 1;
            }
        }

        // Run the selected process for one unit, never below zero.
        let selected = &mut self.processes[action];
        let was_running = !selected.is_finished();
        selected.burst_time = selected.burst_time.saturating_sub(1);
        let just_finished = was_running && selected.is_finished();
        self.current_time += 1;

        let reward = self.reward(&self.processes[action], just_finished);

        // Metrics are recorded once, on the step that finishes the episode.
        let done = self.processes.iter().all(Process::is_finished);
        if done && !was_done {
            self.record_episode();
        }

        Ok((self.state(), reward, done))
    }

    fn reward(&self, process: &Process, just_finished: bool) -> f32 {
        match self.config.reward_policy {
            RewardPolicy::WaitingTime => {
                let bonus = if just_finished {
                    self.config.completion_bonus
                } else {
                    0.0
                };
                -self.config.waiting_penalty * process.waiting_time as f32 + bonus
            }
            RewardPolicy::AttributeWeighted => attribute_reward(process),
        }
    }

    fn record_episode(&mut self) {
        let n = self.processes.len() as f64;
        let total_waiting: u64 = self
            .processes
            .iter()
            .map(|p| u64::from(p.waiting_time))
            .sum();
        let total_turnaround: u64 = self
            .processes
            .iter()
            .map(|p| u64::from(p.turnaround_time()))
            .sum();
        let elapsed = self.current_time as f64;

        let metrics = EpisodeMetrics {
            avg_waiting_time: total_waiting as f64 / n,
            avg_turnaround_time: total_turnaround as f64 / n,
            cpu_utilization: elapsed / (elapsed + total_waiting as f64),
            steps: self.current_time,
        };
        self.performance_metrics.record(&metrics);
        self.last_episode = Some(metrics);
    }

    /// Mean feature vector over all processes.
    pub fn state(&self) -> State {
        aggregate_state(&self.processes)
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn num_processes(&self) -> usize {
        self.config.num_processes
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn is_done(&self) -> bool {
        self.processes.iter().all(Process::is_finished)
    }

    pub fn last_episode(&self) -> Option<&EpisodeMetrics> {
        self.last_episode.as_ref()
    }

    pub fn performance_metrics(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }
}

/// Shaping reward favouring low priority numbers, short remaining bursts,
/// I/O-bound work and small memory footprints.
fn attribute_reward(process: &Process) -> f32 {
    let priority = (10.0 - process.system_priority as f32) / 10.0;
    let burst = (20.0 - process.burst_time as f32) / 20.0;
    let waiting = -(process.waiting_time as f32) / 50.0;
    let io = if process.io_bound { 0.5 } else { 0.0 };
    let memory = -(process.memory_usage as f32) / 100.0;
    priority + burst + waiting + io + memory
}
