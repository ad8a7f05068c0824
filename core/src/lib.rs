#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Sinkhole engine.
//!
//! This crate defines the vocabulary that connects the authoritative world,
//! the pure planning systems, and adapters. Planners submit [`Intent`] values
//! describing what the actor does on a turn, the world resolves the turn via
//! its `step` entry point and reports [`Event`] values describing what
//! happened. Everything in here is plain data with no behaviour beyond
//! coordinate arithmetic.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Location of a single grid tile expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: u32,
    row: u32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Computes the Chebyshev distance between two cells.
    ///
    /// This is the number of king moves separating the cells, which is the
    /// uniform step cost of the eight-directional movement model.
    #[must_use]
    pub fn chebyshev_distance(self, other: CellCoord) -> u32 {
        self.column
            .abs_diff(other.column)
            .max(self.row.abs_diff(other.row))
    }

    /// Returns the neighbouring cell in the provided direction.
    ///
    /// Yields `None` when the step would leave the non-negative quadrant. Upper
    /// bounds are the grid's concern and are not checked here.
    #[must_use]
    pub fn offset(self, direction: Direction) -> Option<CellCoord> {
        let (dx, dy) = direction.delta();
        let column = self.column.checked_add_signed(dx)?;
        let row = self.row.checked_add_signed(dy)?;
        Some(CellCoord::new(column, row))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

/// Eight movement directions available to the actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward decreasing row indices.
    North,
    /// Diagonal toward decreasing rows and increasing columns.
    NorthEast,
    /// Movement toward increasing column indices.
    East,
    /// Diagonal toward increasing rows and columns.
    SouthEast,
    /// Movement toward increasing row indices.
    South,
    /// Diagonal toward increasing rows and decreasing columns.
    SouthWest,
    /// Movement toward decreasing column indices.
    West,
    /// Diagonal toward decreasing rows and columns.
    NorthWest,
}

impl Direction {
    /// Every direction in clockwise order starting at north.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Column and row deltas of a single step.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    /// Direction of the single king move from `from` to `to`, if they are neighbours.
    #[must_use]
    pub fn between(from: CellCoord, to: CellCoord) -> Option<Direction> {
        if from.chebyshev_distance(to) != 1 {
            return None;
        }

        let dx = i64::from(to.column()) - i64::from(from.column());
        let dy = i64::from(to.row()) - i64::from(from.row());
        Self::ALL.into_iter().find(|direction| {
            let (ddx, ddy) = direction.delta();
            i64::from(ddx) == dx && i64::from(ddy) == dy
        })
    }
}

/// Terrain classification of a tile.
///
/// Pillar occupancy is tracked separately from the kind so that a pushed
/// pillar leaves the underlying terrain intact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    /// Solid ground that decays.
    Floor,
    /// Collapsed ground. Permanent once reached.
    Void,
    /// Inert rock that blocks movement and never decays.
    Wall,
    /// Exit of the level.
    Stairs,
    /// Crystal objective.
    Crystal,
    /// Stabilizer cache collected on entry.
    Cache,
}

impl TileKind {
    /// Reports whether the tile takes part in decay and may collapse.
    #[must_use]
    pub const fn is_solid(self) -> bool {
        !matches!(self, Self::Void | Self::Wall)
    }
}

/// Turn intent chosen by a policy and resolved by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Step one tile in the given direction.
    Move(Direction),
    /// Push the adjacent pillar one tile further and step into its place.
    PushPillar(Direction),
    /// Consume one stabilizer around the actor.
    UseStabilizer,
    /// Stand still for a turn.
    Wait,
}

/// Why a tile collapsed during a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollapseCause {
    /// The tile ran out of time through regular decay.
    Decay,
    /// Chain damage from a neighbour collapsing in the given cascade pass.
    Cascade {
        /// One-based pass of the chain reaction that toppled the tile.
        pass: u32,
    },
}

/// Events reported by the world while resolving a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The actor moved between two tiles.
    ActorMoved {
        /// Tile the actor stood on before the move.
        from: CellCoord,
        /// Tile the actor stands on after the move.
        to: CellCoord,
    },
    /// A pillar was pushed to a new tile.
    PillarPushed {
        /// Tile the pillar occupied before the push.
        from: CellCoord,
        /// Tile the pillar occupies after the push.
        to: CellCoord,
    },
    /// The actor picked up a stabilizer cache.
    CacheCollected {
        /// Tile the cache was collected from.
        cell: CellCoord,
    },
    /// A stabilizer was consumed.
    StabilizerUsed {
        /// Centre of the stabilized neighbourhood.
        center: CellCoord,
        /// Number of tiles that were reset.
        tiles: u32,
    },
    /// A tile collapsed into the void.
    TileCollapsed {
        /// Tile that collapsed.
        cell: CellCoord,
        /// Mechanism that finished the tile.
        cause: CollapseCause,
    },
    /// The ground under the actor gave way.
    ActorFell {
        /// Tile the actor was standing on.
        cell: CellCoord,
    },
}

/// Goal the planner navigates toward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Nearest stairs tile.
    Stairs,
    /// Nearest crystal tile.
    Crystal,
    /// Nearest stabilizer cache.
    Cache,
    /// An explicit tile.
    Cell(CellCoord),
}

impl Target {
    /// Tile kind the target resolves to, if it names a kind rather than a cell.
    #[must_use]
    pub const fn kind(self) -> Option<TileKind> {
        match self {
            Self::Stairs => Some(TileKind::Stairs),
            Self::Crystal => Some(TileKind::Crystal),
            Self::Cache => Some(TileKind::Cache),
            Self::Cell(_) => None,
        }
    }
}

/// Closed set of strategies that can drive the actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Full lookahead planner with necessity-driven and proactive evaluation.
    Oracle,
    /// Lookahead planner that recommits every turn and never stabilizes early.
    Tactical,
    /// Distance-field descent without lookahead.
    Greedy,
}

impl PolicyKind {
    /// Every policy in declaration order.
    pub const ALL: [PolicyKind; 3] = [Self::Oracle, Self::Tactical, Self::Greedy];

    /// Stable lowercase identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Tactical => "tactical",
            Self::Greedy => "greedy",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown policy identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownPolicy(pub String);

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown policy `{}`", self.0)
    }
}

impl std::error::Error for UnknownPolicy {}

impl FromStr for PolicyKind {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownPolicy(value.to_owned()))
    }
}

/// Reasons a run ended without reaching the goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    /// The ground under the actor collapsed.
    Collapsed,
    /// No candidate route survived simulation under any stabilization policy.
    NoViablePlan,
    /// The move budget ran out before the goal was reached.
    MoveBudgetExhausted,
    /// Every surviving plan needed more stabilizers than the budget allowed.
    ResourceBudgetExhausted,
}

impl LossReason {
    /// Stable lowercase identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Collapsed => "collapsed",
            Self::NoViablePlan => "no_viable_plan",
            Self::MoveBudgetExhausted => "move_budget_exhausted",
            Self::ResourceBudgetExhausted => "resource_budget_exhausted",
        }
    }
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal classification of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The actor reached the goal on solid ground.
    Win,
    /// The run ended for the given reason.
    Loss(LossReason),
}

impl Outcome {
    /// Reports whether the run reached the goal.
    #[must_use]
    pub const fn is_win(self) -> bool {
        matches!(self, Self::Win)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win => f.write_str("win"),
            Self::Loss(reason) => write!(f, "loss ({reason})"),
        }
    }
}
