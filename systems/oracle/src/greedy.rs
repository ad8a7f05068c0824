//! Distance-field descent baseline without lookahead.

use std::cmp::Reverse;

use sinkhole_core::CellCoord;
use sinkhole_system_candidates::Candidate;
use sinkhole_system_simulator::{simulate, PolicyContext, PolicyMode, Verdict};
use sinkhole_world::{NavigationField, WorldSnapshot};

/// Steps toward the neighbour closest to the goal, preferring longer-lived
/// tiles on ties, with the shared necessity policy deciding on stabilizers.
///
/// Returns `None` when no enterable neighbour brings the actor closer.
pub(crate) fn plan_step(
    world: &WorldSnapshot,
    goal: CellCoord,
    allowance: u32,
    limit: usize,
) -> Option<Verdict> {
    let actor = world.actor();
    let field = NavigationField::toward(world, goal);
    let here = field.distance(actor)?;

    let next = world
        .neighbors(actor)
        .filter(|cell| world.entry_intent(actor, *cell).is_some())
        .filter_map(|cell| {
            let distance = field.distance(cell).filter(|distance| *distance < here)?;
            let timer = world.tile(cell)?.timer();
            Some((cell, distance, timer))
        })
        .min_by_key(|(_, distance, timer)| (*distance, Reverse(*timer)))
        .map(|(cell, _, _)| cell)?;

    let candidate = Candidate::new(world, vec![actor, next]);
    let context = PolicyContext {
        mode: PolicyMode::Necessity,
        allowance,
    };
    let verdict = simulate(world, &candidate, next, context, limit);
    (!verdict.trace.is_empty()).then_some(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinkhole_core::{Direction, Intent};
    use sinkhole_world::parse_layout;

    #[test]
    fn ties_break_toward_the_longer_lived_tile() {
        let world = parse_layout(
            "
            ...
            @.>
            ...
            ",
            Some(
                "
                9 3 9
                9 5 9
                9 8 9
                ",
            ),
            10,
        )
        .expect("valid glyphs")
        .build()
        .expect("valid layout");

        let verdict = plan_step(&world, CellCoord::new(2, 1), 0, 8).expect("a step exists");

        assert_eq!(
            verdict.intents().collect::<Vec<_>>(),
            vec![Intent::Move(Direction::SouthEast)]
        );
    }

    #[test]
    fn pillar_in_the_way_is_pushed() {
        let world = parse_layout("@P.>", None, 10)
            .expect("valid glyphs")
            .build()
            .expect("valid layout");

        let verdict = plan_step(&world, CellCoord::new(3, 0), 0, 8).expect("a step exists");

        assert_eq!(
            verdict.intents().collect::<Vec<_>>(),
            vec![Intent::PushPillar(Direction::East)]
        );
    }

    #[test]
    fn unreachable_goal_yields_no_step() {
        let world = parse_layout("@#>", None, 10)
            .expect("valid glyphs")
            .build()
            .expect("valid layout");

        assert_eq!(plan_step(&world, CellCoord::new(2, 0), 0, 8), None);
    }
}
