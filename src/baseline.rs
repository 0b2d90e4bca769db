//! Classical scheduling policies to compare the learned agent against.
//!
//! Both policies only ever pick unfinished processes, so an episode they
//! drive always ends after exactly the sum of the initial bursts.

use crate::environment::{Action, SchedulingEnvironment};
use crate::error::Result;
use crate::process::Process;
use crate::training::EvaluationEpisode;

pub trait SchedulingPolicy {
    fn name(&self) -> &str;

    /// Forget per-episode state.
    fn reset(&mut self) {}

    /// Slot to run next, or `None` once every process has finished.
    fn choose(&mut self, processes: &[Process]) -> Option<Action>;
}

/// Cycles through unfinished processes, giving each up to `quantum` consecutive steps.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    quantum: u32,
    current: Option<usize>,
    used: u32,
}

impl RoundRobin {
    pub fn new(quantum: u32) -> Self {
        Self {
            quantum: quantum.max(1),
            current: None,
            used: 0,
        }
    }
}

impl SchedulingPolicy for RoundRobin {
    fn name(&self) -> &str {
        "round-robin"
    }

    fn reset(&mut self) {
        self.current = None;
        self.used = 0;
    }

    fn choose(&mut self, processes: &[Process]) -> Option<Action> {
        if let Some(current) = self.current {
            if self.used < self.quantum
                && processes.get(current).is_some_and(|p| !p.is_finished())
            {
                self.used += 1;
                return Some(current);
            }
        }

        let n = processes.len();
        let start = self.current.map_or(0, |c| c + 1);
        let next = (0..n)
            .map(|k| (start + k) % n)
            .find(|&slot| !processes[slot].is_finished())?;
        self.current = Some(next);
        self.used = 1;
        Some(next)
    }
}

/// Always runs the unfinished process with the least remaining burst.
/// Ties go to the lowest slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestRemainingTime;

impl SchedulingPolicy for ShortestRemainingTime {
    fn name(&self) -> &str {
        "shortest-remaining-time"
    }

    fn choose(&mut self, processes: &[Process]) -> Option<Action> {
        processes
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_finished())
            .min_by_key(|(slot, p)| (p.burst_time, *slot))
            .map(|(slot, _)| slot)
    }
}

/// Drives `environment` from its current state to completion with `policy`.
pub fn play<P>(environment: &mut SchedulingEnvironment, policy: &mut P) -> Result<EvaluationEpisode>
where
    P: SchedulingPolicy + ?Sized,
{
    policy.reset();
    let mut total_reward = 0.0;
    let mut steps = 0;

    while let Some(action) = policy.choose(environment.processes()) {
        let (_, reward, done) = environment.step(action)?;
        total_reward += reward;
        steps += 1;
        if done {
            break;
        }
    }

    Ok(EvaluationEpisode {
        total_reward,
        steps,
        truncated: false,
        metrics: environment.last_episode().copied(),
    })
}
