#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Forward simulation of candidate routes.
//!
//! [`simulate`] replays a candidate on a private clone of the snapshot,
//! turn by turn, through the same stepper the real world uses and with the
//! same [`policy::decide`] choices the live strategies make. The resulting
//! [`Verdict`] carries the predicted snapshot after every turn, which is what
//! the planner later compares the real world against. [`Simulator`] ranks a
//! whole candidate set.

pub mod policy;

use std::cmp::Reverse;

use sinkhole_core::{CellCoord, Intent};
use sinkhole_system_candidates::Candidate;
use sinkhole_world::{self as world, StepError, WorldSnapshot};
use tracing::{debug, trace};

pub use policy::{decide, Decision, PolicyContext, PolicyMode, StuckReason};

/// Default margin at which a verdict is considered comfortably safe.
pub const DEFAULT_SATISFIED_MARGIN: i32 = 4;
/// Default projected slack that triggers early stabilization.
pub const DEFAULT_PROACTIVE_SLACK: i32 = 1;

/// One simulated turn: the intent and the snapshot it is predicted to produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedStep {
    /// Intent executed on the turn.
    pub intent: Intent,
    /// Snapshot after the turn resolved.
    pub predicted: WorldSnapshot,
}

/// Why a simulated run did not reach the goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The actor's tile collapsed on the given turn.
    ActorFell {
        /// Turn counter after the fatal turn.
        turn: u64,
    },
    /// A later waypoint could no longer be entered.
    RouteSevered {
        /// Waypoint that collapsed or became blocked.
        cell: CellCoord,
    },
    /// The actor ended up somewhere the route does not continue from.
    OffRoute {
        /// Where the actor stood.
        actor: CellCoord,
    },
    /// The turn limit was reached before arrival.
    TurnLimit,
    /// The stepper rejected an intent.
    Rejected(StepError),
}

impl From<StuckReason> for FailureReason {
    fn from(reason: StuckReason) -> Self {
        match reason {
            StuckReason::RouteSevered { cell } => Self::RouteSevered { cell },
            StuckReason::OffRoute { actor } => Self::OffRoute { actor },
        }
    }
}

/// Result of simulating one candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the actor reached the goal alive.
    pub feasible: bool,
    /// Turn counter on arrival, when feasible.
    pub arrival_turn: Option<u64>,
    /// Stabilizers spent along the way.
    pub resources_consumed: u32,
    /// Smallest `timer - 1` of the actor's tile over the simulated turns.
    pub margin: i32,
    /// Why the run failed, when it did.
    pub failure: Option<FailureReason>,
    /// Every simulated turn in order.
    pub trace: Vec<ScriptedStep>,
}

impl Verdict {
    /// Intents of the simulated turns in order.
    pub fn intents(&self) -> impl Iterator<Item = Intent> + '_ {
        self.trace.iter().map(|step| step.intent)
    }
}

/// Simulates `candidate` toward `goal` on a clone of `world`.
///
/// At most `limit` turns are simulated. The input snapshot is never touched.
#[must_use]
pub fn simulate(
    world: &WorldSnapshot,
    candidate: &Candidate,
    goal: CellCoord,
    context: PolicyContext,
    limit: usize,
) -> Verdict {
    let start_margin = actor_margin(world);
    let mut current = world.clone();
    let mut cursor = 0;
    let mut allowance = context.allowance;
    let mut verdict = Verdict {
        feasible: false,
        arrival_turn: None,
        resources_consumed: 0,
        margin: i32::MAX,
        failure: None,
        trace: Vec::new(),
    };
    let mut events = Vec::new();

    loop {
        if current.actor() == goal {
            verdict.feasible = true;
            verdict.arrival_turn = Some(current.turn());
            break;
        }
        if verdict.trace.len() >= limit {
            verdict.failure = Some(FailureReason::TurnLimit);
            break;
        }

        let context = PolicyContext {
            mode: context.mode,
            allowance,
        };
        let intent = match policy::decide(&current, candidate.cells(), cursor, context) {
            Decision::Arrived => {
                verdict.failure = Some(FailureReason::OffRoute {
                    actor: current.actor(),
                });
                break;
            }
            Decision::Stuck(reason) => {
                verdict.failure = Some(reason.into());
                break;
            }
            Decision::Act(intent) => intent,
        };

        events.clear();
        let resolution = match world::step(&mut current, intent, &mut events) {
            Ok(resolution) => resolution,
            Err(error) => {
                verdict.failure = Some(FailureReason::Rejected(error));
                break;
            }
        };

        match intent {
            Intent::UseStabilizer => {
                allowance = allowance.saturating_sub(1);
                verdict.resources_consumed += 1;
            }
            Intent::Move(_) | Intent::PushPillar(_) => cursor += 1,
            Intent::Wait => {}
        }
        verdict.margin = verdict.margin.min(actor_margin(&current));
        verdict.trace.push(ScriptedStep {
            intent,
            predicted: current.clone(),
        });

        if resolution.actor_fell {
            verdict.failure = Some(FailureReason::ActorFell {
                turn: resolution.turn,
            });
            break;
        }
    }

    if verdict.trace.is_empty() {
        verdict.margin = start_margin;
    }
    verdict
}

/// Turns of slack left under the actor: its tile's timer minus one.
///
/// Anchored tiles never decay and report `i32::MAX`.
#[must_use]
pub fn actor_margin(world: &WorldSnapshot) -> i32 {
    world
        .tile(world.actor())
        .map_or(i32::MIN, |tile| {
            if tile.is_anchored() {
                i32::MAX
            } else {
                tile.timer().saturating_sub(1)
            }
        })
}

/// Ranking and fallback tuning for [`Simulator::evaluate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Margin at which a verdict spending no stabilizers ends the search.
    pub satisfied_margin: i32,
    /// Projected slack used by the proactive pass.
    pub proactive_slack: i32,
    /// Whether a proactive pass runs when no candidate survives the
    /// necessity-driven pass.
    pub proactive_fallback: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            satisfied_margin: DEFAULT_SATISFIED_MARGIN,
            proactive_slack: DEFAULT_PROACTIVE_SLACK,
            proactive_fallback: true,
        }
    }
}

/// Winning candidate of an evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Choice {
    /// Route that won.
    pub candidate: Candidate,
    /// Its simulated verdict.
    pub verdict: Verdict,
    /// Policy mode it was simulated under.
    pub mode: PolicyMode,
}

/// Outcome of evaluating a candidate set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Best feasible candidate, if any survived.
    pub choice: Option<Choice>,
    /// Number of simulations run.
    pub simulated: usize,
    /// Whether at least one candidate failed only because of the turn limit.
    pub turn_limited: bool,
}

/// Ranks candidate sets by simulating them.
#[derive(Clone, Copy, Debug, Default)]
pub struct Simulator {
    config: SimulatorConfig,
}

impl Simulator {
    /// Creates a simulator with the provided tuning.
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    /// Picks the best feasible candidate.
    ///
    /// Candidates are simulated in order under the necessity-driven policy;
    /// only when none survives are they retried under the proactive policy.
    #[must_use]
    pub fn evaluate(
        &self,
        world: &WorldSnapshot,
        candidates: &[Candidate],
        goal: CellCoord,
        allowance: u32,
        limit: usize,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let necessity = PolicyContext {
            mode: PolicyMode::Necessity,
            allowance,
        };
        let choice = self.best_under(world, candidates, goal, necessity, limit, &mut evaluation);
        evaluation.choice = choice;
        if evaluation.choice.is_some() || !self.config.proactive_fallback || candidates.is_empty() {
            return evaluation;
        }

        debug!(
            turn = world.turn(),
            candidates = candidates.len(),
            "no candidate survives on necessity alone, retrying proactively"
        );
        let proactive = PolicyContext {
            mode: PolicyMode::Proactive {
                slack: self.config.proactive_slack,
            },
            allowance,
        };
        let choice = self.best_under(world, candidates, goal, proactive, limit, &mut evaluation);
        evaluation.choice = choice;
        evaluation
    }

    fn best_under(
        &self,
        world: &WorldSnapshot,
        candidates: &[Candidate],
        goal: CellCoord,
        context: PolicyContext,
        limit: usize,
        evaluation: &mut Evaluation,
    ) -> Option<Choice> {
        let mut best: Option<(usize, (Reverse<i32>, u32, usize), Verdict)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let verdict = simulate(world, candidate, goal, context, limit);
            evaluation.simulated += 1;
            trace!(
                candidate = index,
                steps = candidate.steps(),
                feasible = verdict.feasible,
                margin = verdict.margin,
                resources = verdict.resources_consumed,
                failure = ?verdict.failure,
                "simulated candidate"
            );

            if !verdict.feasible {
                if verdict.failure == Some(FailureReason::TurnLimit) {
                    evaluation.turn_limited = true;
                }
                continue;
            }

            let satisfied = verdict.margin >= self.config.satisfied_margin
                && verdict.resources_consumed == 0;
            let key = (
                Reverse(verdict.margin),
                verdict.resources_consumed,
                candidate.steps(),
            );
            if best.as_ref().map_or(true, |(_, current, _)| key < *current) {
                best = Some((index, key, verdict));
            }
            if satisfied {
                break;
            }
        }

        best.map(|(index, _, verdict)| Choice {
            candidate: candidates[index].clone(),
            verdict,
            mode: context.mode,
        })
    }
}
