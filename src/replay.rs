//! Fixed-capacity experience replay with uniform sampling.

use rand::{seq::index, Rng};
use std::collections::VecDeque;

use crate::environment::Action;
use crate::error::{Result, SchedulerError};
use crate::process::State;

/// One observed transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Experience {
    pub state: State,
    pub action: Action,
    pub reward: f32,
    pub next_state: State,
    pub done: bool,
}

/// FIFO ring of experiences. Pushing into a full buffer evicts the oldest entry.
#[derive(Debug)]
pub struct ReplayBuffer {
    experiences: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Fails on a zero capacity, which could never hold a transition.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SchedulerError::config("replay buffer capacity must be positive"));
        }
        Ok(Self {
            experiences: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    pub fn push(&mut self, experience: Experience) {
        if self.experiences.len() >= self.capacity {
            self.experiences.pop_front();
        }
        self.experiences.push_back(experience);
    }

    /// Draws `batch_size` distinct entries uniformly at random, or `None` if
    /// the buffer holds fewer than that.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> Option<Vec<Experience>> {
        if self.experiences.len() < batch_size {
            return None;
        }
        let batch = index::sample(rng, self.experiences.len(), batch_size)
            .into_iter()
            .map(|i| self.experiences[i])
            .collect();
        Some(batch)
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.experiences.iter()
    }
}
