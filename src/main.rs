//! Main entry point for the DQN scheduler.
//! Trains the agent, logs progress to TensorBoard, then compares the greedy
//! agent against round-robin and shortest-remaining-time on fresh episodes.

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use rust_dqn_scheduler::{
    baseline::{self, RoundRobin, SchedulingPolicy, ShortestRemainingTime},
    evaluate, train_with, DQNAgent, EvaluationEpisode, SchedulerConfig, SchedulingEnvironment,
};
use tensorboard_rs::summary_writer::SummaryWriter;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Arithmetic mean of `values`, or 0.0 for an empty sequence.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Logs the averaged outcome of a batch of evaluation episodes for one policy.
fn summarize(name: &str, episodes: &[EvaluationEpisode]) {
    // Truncated episodes carry no metrics, so only finished ones are averaged.
    let finished: Vec<_> = episodes.iter().filter_map(|e| e.metrics).collect();
    info!(
        policy = name,
        episodes = episodes.len(),
        truncated = episodes.len() - finished.len(),
        avg_reward = mean(episodes.iter().map(|e| f64::from(e.total_reward))),
        avg_waiting_time = mean(finished.iter().map(|m| m.avg_waiting_time)),
        cpu_utilization = mean(finished.iter().map(|m| m.cpu_utilization)),
        "evaluation summary"
    );
}

/// Builds an environment on its own random stream so evaluation episodes
/// differ from the training ones.
fn environment(config: &SchedulerConfig, stream: u64) -> Result<SchedulingEnvironment> {
    let env = match config.seed {
        Some(seed) => SchedulingEnvironment::with_rng(
            config.environment.clone(),
            StdRng::seed_from_u64(seed.wrapping_add(stream)),
        )?,
        None => SchedulingEnvironment::new(config.environment.clone())?,
    };
    Ok(env)
}

fn main() -> Result<()> {
    // Log at `info` unless RUST_LOG says otherwise.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Defaults, overridden by SCHEDULER_CONFIG / SCHEDULER_EPISODES / SCHEDULER_SEED.
    let config = SchedulerConfig::from_env()?;
    info!(
        episodes = config.training.episodes,
        processes = config.environment.num_processes,
        seed = ?config.seed,
        "starting training"
    );

    // Create the DQN agent, seeded when the run is reproducible.
    let agent = match config.seed {
        Some(seed) => DQNAgent::with_seed(config.agent.clone(), seed.wrapping_add(1))?,
        None => DQNAgent::new(config.agent.clone())?,
    };
    info!(device = ?agent.device(), "agent ready");

    // Training progress goes to ./logdir for TensorBoard.
    let mut writer = SummaryWriter::new("./logdir");
    // Train, writing reward, exploration rate and loss after every episode.
    let outcome = train_with(environment(&config, 0)?, agent, &config.training, |report| {
        writer.add_scalar("rewards/total_reward", report.total_reward, report.episode);
        writer.add_scalar("agent/epsilon", report.epsilon as f32, report.episode);
        if let Some(loss) = report.last_loss {
            writer.add_scalar("agent/loss", loss, report.episode);
        }
    })?;

    // Scheduler metrics are only known once an episode finishes, so they are
    // written from the environment's history after training.
    let metrics = outcome.environment.performance_metrics();
    for (episode, ((waiting, turnaround), utilization)) in metrics
        .avg_waiting_time
        .iter()
        .zip(&metrics.avg_turnaround_time)
        .zip(&metrics.cpu_utilization)
        .enumerate()
    {
        writer.add_scalar("scheduler/avg_waiting_time", *waiting as f32, episode);
        writer.add_scalar("scheduler/avg_turnaround_time", *turnaround as f32, episode);
        writer.add_scalar("scheduler/cpu_utilization", *utilization as f32, episode);
    }
    // Ensure all TensorBoard events are on disk before evaluation starts.
    writer.flush();

    let mut agent = outcome.agent;
    info!(
        learn_steps = agent.learn_steps(),
        epsilon = agent.epsilon(),
        "training finished"
    );

    // Greedy evaluation of the trained agent on fresh episodes.
    let mut eval_env = environment(&config, 2)?;
    let greedy = evaluate(
        &mut eval_env,
        &mut agent,
        config.training.eval_episodes,
        config.training.eval_step_limit,
    )?;
    summarize("dqn", &greedy);

    // Classical schedulers on the same episode stream, for comparison.
    let mut policies: Vec<Box<dyn SchedulingPolicy>> =
        vec![Box::new(RoundRobin::new(2)), Box::new(ShortestRemainingTime)];
    for policy in policies.iter_mut() {
        // Same seed stream as the greedy run, so every policy sees the same process sets.
        let mut env = environment(&config, 2)?;
        let mut results = Vec::with_capacity(config.training.eval_episodes);
        for _ in 0..config.training.eval_episodes {
            env.reset();
            results.push(baseline::play(&mut env, policy.as_mut())?);
        }
        summarize(policy.name(), &results);
    }

    Ok(())
}
