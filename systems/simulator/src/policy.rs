//! Stabilization policy shared by simulated and real execution.
//!
//! Every strategy that drives the actor along a route asks [`decide`] for the
//! next intent. The simulator calls it on its private clone and the planner's
//! baselines call it on the real snapshot, so both sides always make the same
//! choice for the same snapshot.

use sinkhole_core::{CellCoord, Intent};
use sinkhole_world::{self as world, WorldSnapshot};

/// When the policy is willing to spend a stabilizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolicyMode {
    /// Only when the next move would otherwise drop the actor.
    Necessity,
    /// Also ahead of time, once an upcoming route tile within reach has at
    /// most `slack` turns to spare on arrival.
    Proactive {
        /// Projected slack at or below which a tile is stabilized early.
        slack: i32,
    },
}

/// Inputs that bound the policy beyond the snapshot itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PolicyContext {
    /// Stabilization mode.
    pub mode: PolicyMode,
    /// Stabilizers the policy may still spend under the run's resource budget.
    pub allowance: u32,
}

/// Reason the route cannot be followed any further.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StuckReason {
    /// The next waypoint collapsed, is blocked, holds a stuck pillar or is
    /// not adjacent.
    RouteSevered {
        /// Waypoint that can no longer be entered.
        cell: CellCoord,
    },
    /// The actor does not stand on the route tile the cursor points at.
    OffRoute {
        /// Where the actor actually stands.
        actor: CellCoord,
    },
}

/// Outcome of consulting the policy for one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The actor stands on the last tile of the route.
    Arrived,
    /// The route cannot be continued.
    Stuck(StuckReason),
    /// Intent to execute this turn.
    Act(Intent),
}

/// Chooses the intent for the actor standing on `path[cursor]`.
///
/// A waypoint holding a pillar is entered by pushing the pillar onward. The
/// policy never waits, since timers only fall and a delayed route is never
/// safer than the same route taken now. Each decision either advances the
/// cursor or spends a stabilizer, so a route of `n` steps is resolved within
/// `n + allowance` decisions.
#[must_use]
pub fn decide(
    world: &WorldSnapshot,
    path: &[CellCoord],
    cursor: usize,
    context: PolicyContext,
) -> Decision {
    let actor = world.actor();
    if path.get(cursor) != Some(&actor) {
        return Decision::Stuck(StuckReason::OffRoute { actor });
    }
    let Some(&next) = path.get(cursor + 1) else {
        return Decision::Arrived;
    };
    let Some(advance) = world.entry_intent(actor, next) else {
        return Decision::Stuck(StuckReason::RouteSevered { cell: next });
    };

    let can_stabilize = context.allowance > 0 && world.stabilizers() > 0;
    if can_stabilize {
        if let PolicyMode::Proactive { slack } = context.mode {
            if upcoming_tile_needs_support(world, &path[cursor + 1..], slack) {
                return Decision::Act(Intent::UseStabilizer);
            }
        }
    }

    if survives(world, &[advance]) {
        return Decision::Act(advance);
    }
    if can_stabilize && survives(world, &[Intent::UseStabilizer, advance]) {
        return Decision::Act(Intent::UseStabilizer);
    }
    Decision::Act(advance)
}

fn upcoming_tile_needs_support(world: &WorldSnapshot, upcoming: &[CellCoord], slack: i32) -> bool {
    let actor = world.actor();
    let rules = world.rules();
    (1_i32..).zip(upcoming).any(|(steps, cell)| {
        if cell.chebyshev_distance(actor) > rules.stabilizer_radius {
            return false;
        }
        world.tile(*cell).is_some_and(|tile| {
            !tile.is_anchored()
                && tile.timer() < rules.stabilizer_floor
                && tile.timer().saturating_sub(steps) <= slack
        })
    })
}

/// Probes the intents on a clone and reports whether the actor stays on solid ground.
fn survives(world: &WorldSnapshot, intents: &[Intent]) -> bool {
    let mut probe = world.clone();
    let mut events = Vec::new();
    intents.iter().all(|intent| {
        world::step(&mut probe, *intent, &mut events).is_ok_and(|resolution| !resolution.actor_fell)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinkhole_core::Direction;
    use sinkhole_world::parse_layout;

    fn corridor(timers: &str, stabilizers: u32) -> WorldSnapshot {
        let columns = timers.split_whitespace().count();
        let mut map = String::from("@");
        map.push_str(&".".repeat(columns - 2));
        map.push('>');
        parse_layout(&map, Some(timers), 10)
            .expect("valid glyphs")
            .stabilizers(stabilizers)
            .build()
            .expect("valid layout")
    }

    fn straight(columns: u32) -> Vec<CellCoord> {
        (0..columns).map(|column| CellCoord::new(column, 0)).collect()
    }

    const NECESSITY: PolicyContext = PolicyContext {
        mode: PolicyMode::Necessity,
        allowance: 1,
    };

    #[test]
    fn safe_moves_are_taken_directly() {
        let world = corridor("9 9 9", 1);

        assert_eq!(
            decide(&world, &straight(3), 0, NECESSITY),
            Decision::Act(Intent::Move(Direction::East))
        );
    }

    #[test]
    fn fatal_move_is_preceded_by_a_stabilizer() {
        let world = corridor("9 1 9", 1);

        assert_eq!(
            decide(&world, &straight(3), 0, NECESSITY),
            Decision::Act(Intent::UseStabilizer)
        );
    }

    #[test]
    fn exhausted_allowance_commits_the_move_anyway() {
        let world = corridor("9 1 9", 1);
        let context = PolicyContext {
            allowance: 0,
            ..NECESSITY
        };

        assert_eq!(
            decide(&world, &straight(3), 0, context),
            Decision::Act(Intent::Move(Direction::East))
        );
    }

    #[test]
    fn empty_inventory_commits_the_move_anyway() {
        let world = corridor("9 1 9", 0);

        assert_eq!(
            decide(&world, &straight(3), 0, NECESSITY),
            Decision::Act(Intent::Move(Direction::East))
        );
    }

    #[test]
    fn proactive_mode_stabilizes_before_the_move_turns_fatal() {
        let world = corridor("9 2 9", 1);
        let proactive = PolicyContext {
            mode: PolicyMode::Proactive { slack: 1 },
            allowance: 1,
        };

        assert_eq!(
            decide(&world, &straight(3), 0, NECESSITY),
            Decision::Act(Intent::Move(Direction::East))
        );
        assert_eq!(
            decide(&world, &straight(3), 0, proactive),
            Decision::Act(Intent::UseStabilizer)
        );
    }

    #[test]
    fn proactive_mode_ignores_anchored_and_healthy_tiles() {
        let world = parse_layout("@A.>", Some("9 1 9 9"), 10)
            .expect("valid glyphs")
            .stabilizers(1)
            .build()
            .expect("valid layout");
        let proactive = PolicyContext {
            mode: PolicyMode::Proactive { slack: 3 },
            allowance: 1,
        };

        assert_eq!(
            decide(&world, &straight(4), 0, proactive),
            Decision::Act(Intent::Move(Direction::East))
        );
    }

    #[test]
    fn pillar_on_the_route_is_pushed_aside() {
        let world = parse_layout("@P.>", None, 10)
            .expect("valid glyphs")
            .build()
            .expect("valid layout");

        assert_eq!(
            decide(&world, &straight(4), 0, NECESSITY),
            Decision::Act(Intent::PushPillar(Direction::East))
        );
    }

    #[test]
    fn pillar_with_no_room_behind_severs_the_route() {
        let world = parse_layout("@P#>", None, 10)
            .expect("valid glyphs")
            .build()
            .expect("valid layout");

        assert_eq!(
            decide(&world, &straight(4), 0, NECESSITY),
            Decision::Stuck(StuckReason::RouteSevered {
                cell: CellCoord::new(1, 0)
            })
        );
    }

    #[test]
    fn route_end_reports_arrival() {
        let world = corridor("9 9", 0);
        let path = [world.actor()];

        assert_eq!(decide(&world, &path, 0, NECESSITY), Decision::Arrived);
    }

    #[test]
    fn collapsed_waypoint_severs_the_route() {
        let world = parse_layout("@_>", None, 10)
            .expect("valid glyphs")
            .build()
            .expect("valid layout");

        assert_eq!(
            decide(&world, &straight(3), 0, NECESSITY),
            Decision::Stuck(StuckReason::RouteSevered {
                cell: CellCoord::new(1, 0)
            })
        );
    }

    #[test]
    fn cursor_out_of_step_with_the_actor_is_reported() {
        let world = corridor("9 9 9", 0);

        assert_eq!(
            decide(&world, &straight(3), 1, NECESSITY),
            Decision::Stuck(StuckReason::OffRoute {
                actor: CellCoord::new(0, 0)
            })
        );
    }
}
