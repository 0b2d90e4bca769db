//! A single schedulable process and its normalized feature vector.

use rand::Rng;

/// Number of features in a state vector.
pub const STATE_SIZE: usize = 6;

/// Normalized observation: priority, burst, waiting, io_bound, memory, in_cpu.
pub type State = [f32; STATE_SIZE];

pub const PRIORITY_RANGE: std::ops::RangeInclusive<u32> = 1..=10;
pub const BURST_RANGE: std::ops::RangeInclusive<u32> = 1..=20;
pub const MEMORY_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

// Divisors mapping each attribute into roughly [0, 1].
const PRIORITY_SCALE: f32 = 10.0;
const BURST_SCALE: f32 = 20.0;
const WAITING_SCALE: f32 = 50.0;
const MEMORY_SCALE: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub pid: usize,
    pub system_priority: u32,
    pub burst_time: u32,
    /// Burst at creation, kept for turnaround.
    pub initial_burst: u32,
    pub waiting_time: u32,
    pub io_bound: bool,
    pub memory_usage: u32,
    pub in_cpu: bool,
}

impl Process {
    pub fn new(
        pid: usize,
        system_priority: u32,
        burst_time: u32,
        io_bound: bool,
        memory_usage: u32,
    ) -> Self {
        Self {
            pid,
            system_priority,
            burst_time,
            initial_burst: burst_time,
            waiting_time: 0,
            io_bound,
            memory_usage,
            in_cpu: false,
        }
    }

    /// Draws every attribute uniformly from its declared range.
    pub fn random<R: Rng + ?Sized>(pid: usize, rng: &mut R) -> Self {
        Self::new(
            pid,
            rng.random_range(PRIORITY_RANGE),
            rng.random_range(BURST_RANGE),
            rng.random_bool(0.5),
            rng.random_range(MEMORY_RANGE),
        )
    }

    pub fn is_finished(&self) -> bool {
        self.burst_time == 0
    }

    /// Time from creation to completion.
    pub fn turnaround_time(&self) -> u32 {
        self.waiting_time + self.initial_burst
    }

    pub fn state(&self) -> State {
        [
            self.system_priority as f32 / PRIORITY_SCALE,
            self.burst_time as f32 / BURST_SCALE,
            self.waiting_time as f32 / WAITING_SCALE,
            if self.io_bound { 1.0 } else { 0.0 },
            self.memory_usage as f32 / MEMORY_SCALE,
            if self.in_cpu { 1.0 } else { 0.0 },
        ]
    }
}

/// Elementwise mean of the processes' feature vectors.
pub fn aggregate_state(processes: &[Process]) -> State {
    let mut mean = [0.0f32; STATE_SIZE];
    if processes.is_empty() {
        return mean;
    }
    for process in processes {
        for (acc, feature) in mean.iter_mut().zip(process.state()) {
            *acc += feature;
        }
    }
    let n = processes.len() as f32;
    mean.iter_mut().for_each(|x| *x /= n);
    mean
}
