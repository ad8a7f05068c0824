use std::thread;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sinkhole_core::{CellCoord, PolicyKind, Target, TileKind};
use sinkhole_system_oracle::{
    run_to_completion, Oracle, PlannerConfig, PlannerError, RunLimits, RunRequest, RunSummary,
};
use sinkhole_world::{DecayRules, WorldSnapshot};

const SEEDS: u64 = 32;

#[test]
fn seed_sweep_never_diverges() {
    for seed in 0..SEEDS {
        for policy in PolicyKind::ALL {
            let summary = run_to_completion(random_request(seed, policy))
                .unwrap_or_else(|error| panic!("seed {seed} {policy}: {error}"));

            assert_eq!(summary.divergences, 0, "seed {seed} {policy}");
            assert!(summary.moves_taken <= 60, "seed {seed} {policy}");
            assert!(summary.resources_used <= 2, "seed {seed} {policy}");
            if summary.outcome.is_win() {
                let margin = summary.tightest_margin.unwrap_or(0);
                assert!(margin >= 0, "seed {seed} {policy} won on a dying tile");
            }
        }
    }
}

#[test]
fn committed_scripts_play_out_as_predicted() {
    for seed in 0..SEEDS {
        let request = random_request(seed, PolicyKind::Oracle);
        let limits = RunLimits {
            move_budget: request.move_budget,
            resource_budget: request.resource_budget,
        };
        let mut oracle = Oracle::new(
            request.level,
            request.target,
            request.policy,
            limits,
            request.config,
        )
        .expect("generated level is playable");

        let mut turns = 0;
        loop {
            let predicted: Vec<_> = oracle.pending().collect();
            let record = oracle.advance().expect("no divergence in a closed world");
            if let (Some(intent), Some(expected)) = (record.intent, predicted.first()) {
                assert_eq!(intent, *expected, "seed {seed} deviated from its script");
            }
            if record.terminal.is_some() {
                break;
            }
            turns += 1;
            assert!(turns <= 60, "seed {seed} ran past its move budget");
        }
    }
}

#[test]
fn concurrent_runs_match_sequential_runs() {
    let requests: Vec<RunRequest> = (0..SEEDS)
        .flat_map(|seed| PolicyKind::ALL.map(|policy| random_request(seed, policy)))
        .collect();

    let sequential: Vec<Result<RunSummary, PlannerError>> =
        requests.iter().cloned().map(run_to_completion).collect();

    let concurrent: Vec<Result<RunSummary, PlannerError>> = thread::scope(|scope| {
        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .map(|request| scope.spawn(move || run_to_completion(request)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    });

    assert_eq!(sequential, concurrent);
}

#[test]
fn repeated_runs_are_bit_identical() {
    for seed in 0..SEEDS {
        let first = run_to_completion(random_request(seed, PolicyKind::Oracle));
        let second = run_to_completion(random_request(seed, PolicyKind::Oracle));
        assert_eq!(first, second, "seed {seed}");
    }
}

fn random_request(seed: u64, policy: PolicyKind) -> RunRequest {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let columns = rng.gen_range(6..=10);
    let rows = rng.gen_range(4..=8);
    let actor = CellCoord::new(0, rng.gen_range(0..rows));
    let goal = CellCoord::new(columns - 1, rng.gen_range(0..rows));
    let rules = DecayRules {
        half_rate: rng.gen_bool(0.3),
        ..DecayRules::default()
    };

    let mut builder = WorldSnapshot::builder(columns, rows)
        .actor(actor)
        .rules(rules)
        .stabilizers(rng.gen_range(0..=2))
        .kind(goal, TileKind::Stairs);

    for row in 0..rows {
        for column in 0..columns {
            let cell = CellCoord::new(column, row);
            builder = builder.timer(cell, rng.gen_range(3..=20));
            if cell == actor || cell == goal {
                continue;
            }
            builder = match rng.gen_range(0..20) {
                0 | 1 => builder.kind(cell, TileKind::Wall),
                2 => builder.kind(cell, TileKind::Void),
                3 => builder.kind(cell, TileKind::Cache),
                4 => builder.pillar(cell),
                5 => builder.anchor(cell),
                _ => builder,
            };
        }
    }

    RunRequest {
        policy,
        move_budget: 60,
        resource_budget: rng.gen_range(0..=2),
        target: Target::Stairs,
        level: builder.build().expect("generated layout is valid"),
        config: PlannerConfig::default(),
    }
}
