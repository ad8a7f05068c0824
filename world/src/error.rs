//! Error types for the `sinkhole-world` crate.

use sinkhole_core::{CellCoord, Direction};

/// Precondition violations detected while resolving a turn.
///
/// The world is left untouched whenever one of these is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum StepError {
    /// The actor already stands on a collapsed tile, so the snapshot is terminal.
    #[error("actor stands on collapsed tile {cell}")]
    ActorOnVoid {
        /// Tile under the actor.
        cell: CellCoord,
    },

    /// The move leaves the grid or enters a tile that cannot be walked on.
    #[error("cannot move {direction:?} from {from}")]
    IllegalMove {
        /// Tile the actor stands on.
        from: CellCoord,
        /// Requested direction.
        direction: Direction,
    },

    /// There is no pillar to push, or the tile behind it is not free.
    #[error("cannot push a pillar {direction:?} from {from}")]
    IllegalPush {
        /// Tile the actor stands on.
        from: CellCoord,
        /// Requested direction.
        direction: Direction,
    },

    /// The inventory holds no stabilizers.
    #[error("no stabilizers remaining")]
    NoStabilizers,
}

/// Errors raised while assembling a level snapshot.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The layout contains no rows.
    #[error("layout is empty")]
    EmptyLayout,

    /// A row differs in length from the first row.
    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        /// Zero-based row index.
        row: u32,
        /// Column count of the first row.
        expected: u32,
        /// Column count of the offending row.
        found: u32,
    },

    /// A glyph outside the layout alphabet was found.
    #[error("unknown glyph {glyph:?} at {cell}")]
    UnknownGlyph {
        /// Offending character.
        glyph: char,
        /// Position of the character.
        cell: CellCoord,
    },

    /// No actor position was provided.
    #[error("layout has no actor")]
    MissingActor,

    /// More than one actor glyph was found.
    #[error("second actor found at {cell}")]
    DuplicateActor {
        /// Position of the second actor.
        cell: CellCoord,
    },

    /// A placement referenced a tile outside the grid.
    #[error("tile {cell} lies outside the grid")]
    OutOfBounds {
        /// Offending tile.
        cell: CellCoord,
    },

    /// The grid dimensions do not fit in memory addressing.
    #[error("grid of {columns}x{rows} tiles is too large")]
    OversizedGrid {
        /// Requested column count.
        columns: u32,
        /// Requested row count.
        rows: u32,
    },

    /// The actor starts on a tile that cannot be stood on.
    #[error("actor cannot start on {cell}")]
    ActorNotWalkable {
        /// Actor start tile.
        cell: CellCoord,
    },

    /// A pillar was placed on void, wall, or the actor's tile.
    #[error("pillar cannot be placed on {cell}")]
    InvalidPillar {
        /// Pillar tile.
        cell: CellCoord,
    },

    /// The timer grid does not match the layout dimensions.
    #[error("timer grid row {row} does not match the layout width of {columns}")]
    TimerShape {
        /// Zero-based row index where the mismatch was detected.
        row: u32,
        /// Expected number of timers per row.
        columns: u32,
    },

    /// A timer token is not an integer.
    #[error("invalid timer {token:?}")]
    InvalidTimer {
        /// Offending token.
        token: String,
    },
}
