use rust_dqn_scheduler::{AgentConfig, DQNAgent, Experience};

const PROBE: [f32; 6] = [0.55, 0.42, 0.13, 0.6, 0.48, 0.2];

fn config(batch_size: usize) -> AgentConfig {
    AgentConfig {
        batch_size,
        replay_buffer_capacity: 128,
        ..AgentConfig::default()
    }
}

fn experience(i: usize) -> Experience {
    let x = (i % 10) as f32 / 10.0;
    Experience {
        state: [x, 0.3, 0.2, 0.4, 0.5, 0.2],
        action: i % 5,
        reward: if i % 4 == 0 { 1.0 } else { -0.1 * x },
        next_state: [x, 0.25, 0.22, 0.4, 0.5, 0.2],
        done: i % 9 == 0,
    }
}

#[test]
fn learn_is_a_noop_below_batch_size() {
    let mut agent = DQNAgent::with_seed(config(16), 3).unwrap();
    for i in 0..15 {
        agent.remember(experience(i));
    }
    let before = agent.q_values(&PROBE).unwrap();
    let epsilon = agent.epsilon();

    assert_eq!(agent.learn().unwrap(), None);
    assert_eq!(agent.q_values(&PROBE).unwrap(), before);
    assert_eq!(agent.epsilon(), epsilon);
    assert_eq!(agent.learn_steps(), 0);
}

#[test]
fn epsilon_decays_monotonically_to_its_floor() {
    let config = AgentConfig {
        epsilon_decay: 0.5,
        ..config(4)
    };
    let floor = config.epsilon_min;
    let mut agent = DQNAgent::with_seed(config, 8).unwrap();
    for i in 0..8 {
        agent.remember(experience(i));
    }

    let mut previous = agent.epsilon();
    for _ in 0..20 {
        agent.learn().unwrap();
        let epsilon = agent.epsilon();
        assert!(epsilon <= previous);
        assert!(epsilon >= floor);
        previous = epsilon;
    }
    assert_eq!(previous, floor);
}

#[test]
fn sync_target_copies_policy_parameters() {
    let mut agent = DQNAgent::with_seed(config(8), 11).unwrap();
    for i in 0..32 {
        agent.remember(experience(i));
    }
    for _ in 0..5 {
        agent.learn().unwrap();
    }
    assert_ne!(
        agent.q_values(&PROBE).unwrap(),
        agent.target_q_values(&PROBE).unwrap()
    );

    agent.sync_target().unwrap();
    assert_eq!(
        agent.q_values(&PROBE).unwrap(),
        agent.target_q_values(&PROBE).unwrap()
    );

    // Idempotent.
    agent.sync_target().unwrap();
    assert_eq!(
        agent.q_values(&PROBE).unwrap(),
        agent.target_q_values(&PROBE).unwrap()
    );
}

#[test]
fn zero_epsilon_selection_is_deterministic() {
    let mut agent = DQNAgent::with_seed(config(8), 21).unwrap();
    agent.set_epsilon(0.0);

    let greedy = agent.greedy_action(&PROBE).unwrap();
    let q_values = agent.q_values(&PROBE).unwrap();
    let best = q_values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    assert_eq!(q_values[greedy], best);
    assert!(q_values[..greedy].iter().all(|&q| q < best));

    for _ in 0..50 {
        assert_eq!(agent.select_action(&PROBE).unwrap(), greedy);
    }
}
