#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Plan-commitment loop that drives the actor through a decaying level.
//!
//! The [`Oracle`] owns the real snapshot. It asks the candidate generator for
//! routes, lets the simulator pick the safest one, commits to a short prefix
//! of the winning trace and executes it turn by turn, comparing every real
//! result against the prediction. [`run_to_completion`] wraps the loop into a
//! single call suitable for batch evaluation.

mod greedy;
mod planner;

use serde::{Deserialize, Serialize};
use sinkhole_core::{CellCoord, Intent, Outcome, PolicyKind, Target};
use sinkhole_system_candidates::CandidateConfig;
use sinkhole_system_simulator::{SimulatorConfig, DEFAULT_PROACTIVE_SLACK, DEFAULT_SATISFIED_MARGIN};
use sinkhole_world::{StepError, WorldSnapshot};

pub use planner::{Oracle, PlannerState, TurnRecord};

/// Default number of simulated turns committed per plan.
pub const DEFAULT_HORIZON: usize = 4;

/// Planner tuning, loadable from level files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Simulated turns committed before the planner looks again.
    pub horizon: usize,
    /// Upper bound on candidate routes per plan.
    pub max_candidates: usize,
    /// Margin at which a verdict spending no stabilizers ends the search.
    pub satisfied_margin: i32,
    /// Projected slack that triggers early stabilization in the proactive pass.
    pub proactive_slack: i32,
    /// Stabilizer caches considered as detours per plan.
    pub max_cache_detours: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            max_candidates: CandidateConfig::default().max_candidates,
            satisfied_margin: DEFAULT_SATISFIED_MARGIN,
            proactive_slack: DEFAULT_PROACTIVE_SLACK,
            max_cache_detours: CandidateConfig::default().max_cache_detours,
        }
    }
}

impl PlannerConfig {
    fn candidate_config(&self) -> CandidateConfig {
        CandidateConfig {
            max_candidates: self.max_candidates,
            max_cache_detours: self.max_cache_detours,
            ..CandidateConfig::default()
        }
    }

    fn simulator_config(&self, policy: PolicyKind) -> SimulatorConfig {
        SimulatorConfig {
            satisfied_margin: self.satisfied_margin,
            proactive_slack: self.proactive_slack,
            proactive_fallback: policy != PolicyKind::Tactical,
        }
    }

    fn horizon_for(&self, policy: PolicyKind) -> usize {
        match policy {
            PolicyKind::Tactical => 1,
            PolicyKind::Oracle | PolicyKind::Greedy => self.horizon.max(1),
        }
    }
}

/// Move and resource bounds of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunLimits {
    /// Real turns the run may execute.
    pub move_budget: u32,
    /// Stabilizers the run may spend.
    pub resource_budget: u32,
}

/// Errors that abort a run instead of ending it with an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// The level has no tile matching the requested target.
    #[error("level has no tile for target {target:?}")]
    GoalMissing {
        /// Requested target.
        target: Target,
    },
    /// The level starts with the actor on collapsed ground.
    #[error("actor starts on collapsed ground at {cell}")]
    ActorOnVoid {
        /// Actor position.
        cell: CellCoord,
    },
    /// The same snapshot and intent diverged from prediction twice.
    #[error("turn {turn} diverged twice from the same snapshot with {intent:?}")]
    RepeatedDivergence {
        /// Turn counter of the shared baseline.
        turn: u64,
        /// Intent executed from it.
        intent: Intent,
    },
    /// The stepper rejected an intent the planner predicted to be legal.
    #[error(transparent)]
    Step(#[from] StepError),
}

/// Everything needed to play one level from start to finish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Strategy driving the actor.
    pub policy: PolicyKind,
    /// Real turns the run may execute.
    pub move_budget: u32,
    /// Stabilizers the run may spend.
    pub resource_budget: u32,
    /// Goal to reach.
    pub target: Target,
    /// Starting snapshot.
    pub level: WorldSnapshot,
    /// Planner tuning.
    pub config: PlannerConfig,
}

/// Terminal outcome and statistics of a finished run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RunSummary {
    /// How the run ended.
    pub outcome: Outcome,
    /// Real turns executed.
    pub moves_taken: u32,
    /// Stabilizers spent.
    pub resources_used: u32,
    /// Smallest actor margin over the executed turns.
    pub tightest_margin: Option<i32>,
    /// Plans discarded and recomputed after the first.
    pub replans: u32,
    /// Turns where the real world disagreed with the committed prediction.
    pub divergences: u32,
    /// Fingerprint of the final real snapshot.
    pub final_fingerprint: u64,
}

/// Plays a level until it is won or lost.
///
/// Shares no state with other calls, so independent levels can run on as
/// many threads as desired.
pub fn run_to_completion(request: RunRequest) -> Result<RunSummary, PlannerError> {
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
    )?;

    loop {
        let record = oracle.advance()?;
        if let Some(outcome) = record.terminal {
            return Ok(oracle.summarize(outcome));
        }
    }
}
