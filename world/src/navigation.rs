//! Step-distance field toward a goal tile.

use std::collections::VecDeque;

use sinkhole_core::CellCoord;

use crate::WorldSnapshot;

const UNREACHABLE: u16 = u16::MAX;

/// King-move step distances from every tile to a goal.
///
/// Built by a reverse breadth-first search over solid ground. Tiles holding a
/// pillar count as passable because the pillar may be pushed aside, so the
/// field never overestimates the remaining steps of a route.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavigationField {
    columns: u32,
    rows: u32,
    distances: Vec<u16>,
}

impl NavigationField {
    /// Builds the field toward `goal` on the snapshot's current ground.
    #[must_use]
    pub fn toward(world: &WorldSnapshot, goal: CellCoord) -> Self {
        let mut field = Self {
            columns: world.columns(),
            rows: world.rows(),
            distances: vec![UNREACHABLE; world.tile_count()],
        };

        let passable =
            |cell: CellCoord| world.tile(cell).is_some_and(|tile| tile.kind().is_solid());
        let mut frontier = VecDeque::new();
        if let Some(slot) = field.slot(goal).filter(|_| passable(goal)) {
            field.distances[slot] = 0;
            frontier.push_back((goal, 0_u16));
        }

        while let Some((cell, distance)) = frontier.pop_front() {
            let next = distance.saturating_add(1);
            if next == UNREACHABLE {
                continue;
            }
            for neighbor in world.neighbors(cell).filter(|cell| passable(*cell)) {
                let Some(slot) = field.slot(neighbor) else {
                    continue;
                };
                if field.distances[slot] > next {
                    field.distances[slot] = next;
                    frontier.push_back((neighbor, next));
                }
            }
        }

        field
    }

    /// Steps from the cell to the goal, if the cell can reach it.
    #[must_use]
    pub fn distance(&self, cell: CellCoord) -> Option<u16> {
        self.slot(cell)
            .and_then(|slot| self.distances.get(slot).copied())
            .filter(|distance| *distance != UNREACHABLE)
    }

    /// Reports whether the cell can reach the goal.
    #[must_use]
    pub fn is_reachable(&self, cell: CellCoord) -> bool {
        self.distance(cell).is_some()
    }

    fn slot(&self, cell: CellCoord) -> Option<usize> {
        if cell.column() >= self.columns || cell.row() >= self.rows {
            return None;
        }
        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let columns = usize::try_from(self.columns).ok()?;
        row.checked_mul(columns)?.checked_add(column)
    }
}
