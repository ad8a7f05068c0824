//! Oracle state machine.

use std::collections::VecDeque;

use sinkhole_core::{CellCoord, Event, Intent, LossReason, Outcome, PolicyKind, Target};
use sinkhole_system_candidates::{Candidate, CandidateGenerator};
use sinkhole_system_simulator::{actor_margin, Evaluation, ScriptedStep, Simulator};
use sinkhole_world::{self as world, query, WorldSnapshot};
use tracing::{debug, info, warn};

use crate::{greedy, PlannerConfig, PlannerError, RunLimits, RunSummary};

/// Phase of the plan-commitment loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlannerState {
    /// A new plan is computed from the real snapshot on the next advance.
    Planning,
    /// A script is being executed.
    Committed,
    /// The script was discarded; planning resumes on the next advance.
    ReplanRequired,
    /// The actor reached the goal.
    TerminalWin,
    /// The run ended without reaching the goal.
    TerminalLoss(LossReason),
}

impl PlannerState {
    /// Outcome of a terminal state.
    #[must_use]
    pub const fn outcome(self) -> Option<Outcome> {
        match self {
            Self::TerminalWin => Some(Outcome::Win),
            Self::TerminalLoss(reason) => Some(Outcome::Loss(reason)),
            Self::Planning | Self::Committed | Self::ReplanRequired => None,
        }
    }
}

/// What happened during one call to [`Oracle::advance`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRecord {
    /// Turn counter of the real snapshot after the call.
    pub turn: u64,
    /// Intent executed on the real world, if a turn ran.
    pub intent: Option<Intent>,
    /// Real snapshot after the call.
    pub snapshot: WorldSnapshot,
    /// Events reported by the stepper for the executed turn.
    pub events: Vec<Event>,
    /// Outcome once the run is over.
    pub terminal: Option<Outcome>,
}

/// Planner that owns the real world and executes committed scripts against it.
#[derive(Clone, Debug)]
pub struct Oracle {
    world: WorldSnapshot,
    goal: CellCoord,
    policy: PolicyKind,
    limits: RunLimits,
    horizon: usize,
    generator: CandidateGenerator,
    simulator: Simulator,
    state: PlannerState,
    script: VecDeque<ScriptedStep>,
    expected: Option<WorldSnapshot>,
    last_divergence: Option<(WorldSnapshot, Intent)>,
    moves_taken: u32,
    resources_used: u32,
    tightest_margin: Option<i32>,
    replans: u32,
    divergences: u32,
}

impl Oracle {
    /// Prepares a run on `level` toward `target`.
    pub fn new(
        level: WorldSnapshot,
        target: Target,
        policy: PolicyKind,
        limits: RunLimits,
        config: PlannerConfig,
    ) -> Result<Self, PlannerError> {
        let actor = level.actor();
        if !level.tile(actor).is_some_and(|tile| tile.kind().is_solid()) {
            return Err(PlannerError::ActorOnVoid { cell: actor });
        }
        let goal =
            query::resolve_target(&level, target).ok_or(PlannerError::GoalMissing { target })?;

        Ok(Self {
            world: level,
            goal,
            policy,
            limits,
            horizon: config.horizon_for(policy),
            generator: CandidateGenerator::new(config.candidate_config()),
            simulator: Simulator::new(config.simulator_config(policy)),
            state: PlannerState::Planning,
            script: VecDeque::new(),
            expected: None,
            last_divergence: None,
            moves_taken: 0,
            resources_used: 0,
            tightest_margin: None,
            replans: 0,
            divergences: 0,
        })
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> PlannerState {
        self.state
    }

    /// Real snapshot.
    #[must_use]
    pub fn world(&self) -> &WorldSnapshot {
        &self.world
    }

    /// Tile the run navigates to.
    #[must_use]
    pub fn goal(&self) -> CellCoord {
        self.goal
    }

    /// Intents still queued in the committed script.
    pub fn pending(&self) -> impl Iterator<Item = Intent> + '_ {
        self.script.iter().map(|step| step.intent)
    }

    /// Summary of the run once a terminal state was reached.
    #[must_use]
    pub fn summary(&self) -> Option<RunSummary> {
        self.state.outcome().map(|outcome| self.summarize(outcome))
    }

    /// Lets level logic act on the real world between turns.
    ///
    /// Any change the committed script did not predict is detected on the
    /// next [`advance`](Self::advance) and forces a new plan.
    pub fn apply_external<R>(&mut self, action: impl FnOnce(&mut WorldSnapshot) -> R) -> R {
        action(&mut self.world)
    }

    /// Runs internal transitions until one real turn executes or the run ends.
    pub fn advance(&mut self) -> Result<TurnRecord, PlannerError> {
        loop {
            match self.state {
                PlannerState::TerminalWin | PlannerState::TerminalLoss(_) => {
                    return Ok(self.record(None, Vec::new()));
                }
                PlannerState::ReplanRequired => {
                    self.replans += 1;
                    self.state = PlannerState::Planning;
                }
                PlannerState::Planning => self.plan(),
                PlannerState::Committed => {
                    if let Some(record) = self.execute()? {
                        return Ok(record);
                    }
                }
            }
        }
    }

    pub(crate) fn summarize(&self, outcome: Outcome) -> RunSummary {
        RunSummary {
            outcome,
            moves_taken: self.moves_taken,
            resources_used: self.resources_used,
            tightest_margin: self.tightest_margin,
            replans: self.replans,
            divergences: self.divergences,
            final_fingerprint: self.world.fingerprint(),
        }
    }

    fn plan(&mut self) {
        self.script.clear();
        self.expected = None;

        let actor = self.world.actor();
        if !self.world.tile(actor).is_some_and(|tile| tile.kind().is_solid()) {
            self.finish(Outcome::Loss(LossReason::Collapsed));
            return;
        }
        if actor == self.goal {
            self.finish(Outcome::Win);
            return;
        }
        let remaining = self.limits.move_budget.saturating_sub(self.moves_taken);
        if remaining == 0 {
            self.finish(Outcome::Loss(LossReason::MoveBudgetExhausted));
            return;
        }

        let allowance = self
            .limits
            .resource_budget
            .saturating_sub(self.resources_used);
        let limit = usize::try_from(remaining).unwrap_or(usize::MAX);

        let trace = match self.policy {
            PolicyKind::Greedy => {
                match greedy::plan_step(&self.world, self.goal, allowance, limit) {
                    Some(verdict) => verdict.trace,
                    None => {
                        self.finish(Outcome::Loss(LossReason::NoViablePlan));
                        return;
                    }
                }
            }
            PolicyKind::Oracle | PolicyKind::Tactical => {
                let candidates = self.generator.generate(&self.world, self.goal);
                let evaluation = self.simulator.evaluate(
                    &self.world,
                    &candidates,
                    self.goal,
                    allowance,
                    limit,
                );
                let Some(choice) = evaluation.choice else {
                    let reason = self.classify_failure(&candidates, &evaluation, allowance, limit);
                    self.finish(Outcome::Loss(reason));
                    return;
                };
                debug!(
                    turn = self.world.turn(),
                    policy = %self.policy,
                    steps = choice.candidate.steps(),
                    margin = choice.verdict.margin,
                    resources = choice.verdict.resources_consumed,
                    mode = ?choice.mode,
                    simulated = evaluation.simulated,
                    "committed to candidate"
                );
                choice.verdict.trace
            }
        };

        self.script = trace.into_iter().take(self.horizon).collect();
        self.expected = Some(self.world.clone());
        self.state = PlannerState::Committed;
    }

    fn classify_failure(
        &self,
        candidates: &[Candidate],
        evaluation: &Evaluation,
        allowance: u32,
        limit: usize,
    ) -> LossReason {
        if evaluation.turn_limited {
            return LossReason::MoveBudgetExhausted;
        }
        let inventory = self.world.stabilizers();
        if allowance < inventory {
            let relaxed = self.simulator.evaluate(
                &self.world,
                candidates,
                self.goal,
                inventory,
                limit,
            );
            if relaxed.choice.is_some() {
                return LossReason::ResourceBudgetExhausted;
            }
        }
        LossReason::NoViablePlan
    }

    fn execute(&mut self) -> Result<Option<TurnRecord>, PlannerError> {
        let Some(scripted) = self.script.pop_front() else {
            self.state = PlannerState::ReplanRequired;
            return Ok(None);
        };
        let intent = scripted.intent;

        let expected = self.expected.take();
        if expected.as_ref() != Some(&self.world) {
            let predicted = expected.as_ref().map_or(0, WorldSnapshot::fingerprint);
            self.diverged(self.world.clone(), intent, predicted)?;
            return Ok(None);
        }

        let baseline = self.world.clone();
        let mut events = Vec::new();
        let resolution = world::step(&mut self.world, intent, &mut events)?;
        self.moves_taken += 1;
        if intent == Intent::UseStabilizer {
            self.resources_used += 1;
        }
        let margin = actor_margin(&self.world);
        self.tightest_margin = Some(
            self.tightest_margin
                .map_or(margin, |tightest| tightest.min(margin)),
        );

        if resolution.actor_fell {
            self.finish(Outcome::Loss(LossReason::Collapsed));
        } else if self.world.actor() == self.goal {
            self.finish(Outcome::Win);
        } else {
            if self.world != scripted.predicted {
                self.diverged(baseline, intent, scripted.predicted.fingerprint())?;
            } else if self.script.is_empty() {
                self.state = PlannerState::ReplanRequired;
            } else {
                self.expected = Some(scripted.predicted);
            }
            if self.moves_taken >= self.limits.move_budget {
                self.finish(Outcome::Loss(LossReason::MoveBudgetExhausted));
            }
        }

        Ok(Some(self.record(Some(intent), events)))
    }

    fn diverged(
        &mut self,
        baseline: WorldSnapshot,
        intent: Intent,
        predicted: u64,
    ) -> Result<(), PlannerError> {
        self.divergences += 1;
        warn!(
            turn = self.world.turn(),
            predicted,
            real = self.world.fingerprint(),
            ?intent,
            "real world diverged from the committed script"
        );

        let key = (baseline, intent);
        if self.last_divergence.as_ref() == Some(&key) {
            return Err(PlannerError::RepeatedDivergence {
                turn: key.0.turn(),
                intent,
            });
        }
        self.last_divergence = Some(key);
        self.script.clear();
        self.expected = None;
        self.state = PlannerState::ReplanRequired;
        Ok(())
    }

    fn finish(&mut self, outcome: Outcome) {
        self.script.clear();
        self.expected = None;
        self.state = match outcome {
            Outcome::Win => PlannerState::TerminalWin,
            Outcome::Loss(reason) => PlannerState::TerminalLoss(reason),
        };
        info!(
            %outcome,
            policy = %self.policy,
            moves = self.moves_taken,
            resources = self.resources_used,
            replans = self.replans,
            divergences = self.divergences,
            "run finished"
        );
    }

    fn record(&self, intent: Option<Intent>, events: Vec<Event>) -> TurnRecord {
        TurnRecord {
            turn: self.world.turn(),
            intent,
            snapshot: self.world.clone(),
            events,
            terminal: self.state.outcome(),
        }
    }
}
