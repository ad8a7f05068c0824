#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state and the deterministic decay stepper.
//!
//! A [`WorldSnapshot`] is a plain value: one flat row-major buffer of tiles
//! plus the actor, the turn counter and the stabilizer inventory. [`step`] is
//! the single function that advances a snapshot by one turn. Real execution
//! and every simulated lookahead call the same function, so a forward
//! simulation of the same intents on a clone reproduces the real outcome bit
//! for bit.

mod error;
mod layout;
mod navigation;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sinkhole_core::{CellCoord, CollapseCause, Direction, Event, Intent, TileKind};

pub use error::{LayoutError, StepError};
pub use layout::parse_layout;
pub use navigation::NavigationField;

/// Chain damage applied by each collapsing neighbour.
pub const DEFAULT_CHAIN_PENALTY: i32 = 2;
/// Chebyshev radius of the stabilizer footprint (1 covers 3x3).
pub const DEFAULT_STABILIZER_RADIUS: u32 = 1;
/// Minimum timer a stabilized tile is raised to.
pub const DEFAULT_STABILIZER_FLOOR: i32 = 5;

/// Tunable constants of the decay model.
///
/// The rules travel inside every snapshot so stepping never depends on state
/// outside the snapshot itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayRules {
    /// Timer damage dealt to each solid neighbour of a collapsing tile.
    pub chain_penalty: i32,
    /// Difficulty tier that halves the decay rate of every tile.
    pub half_rate: bool,
    /// Chebyshev radius of the stabilizer footprint around the actor.
    pub stabilizer_radius: u32,
    /// Timer value stabilized tiles are raised to.
    pub stabilizer_floor: i32,
}

impl Default for DecayRules {
    fn default() -> Self {
        Self {
            chain_penalty: DEFAULT_CHAIN_PENALTY,
            half_rate: false,
            stabilizer_radius: DEFAULT_STABILIZER_RADIUS,
            stabilizer_floor: DEFAULT_STABILIZER_FLOOR,
        }
    }
}

/// State of a single grid tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    kind: TileKind,
    timer: i32,
    pillar: bool,
    anchored: bool,
}

impl Tile {
    const fn new(kind: TileKind, timer: i32) -> Self {
        Self {
            kind,
            timer,
            pillar: false,
            anchored: false,
        }
    }

    /// Terrain classification of the tile.
    #[must_use]
    pub const fn kind(&self) -> TileKind {
        self.kind
    }

    /// Turns remaining before the tile collapses.
    #[must_use]
    pub const fn timer(&self) -> i32 {
        self.timer
    }

    /// Reports whether a pillar stands on the tile.
    #[must_use]
    pub const fn has_pillar(&self) -> bool {
        self.pillar
    }

    /// Reports whether the tile is permanently anchored.
    #[must_use]
    pub const fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Reports whether the actor may stand on the tile.
    #[must_use]
    pub const fn is_walkable(&self) -> bool {
        self.kind.is_solid() && !self.pillar
    }
}

/// Complete, self-contained state of the world at the start of a turn.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldSnapshot {
    columns: u32,
    rows: u32,
    tiles: Vec<Tile>,
    actor: CellCoord,
    turn: u64,
    stabilizers: u32,
    rules: DecayRules,
}

impl WorldSnapshot {
    /// Starts assembling a snapshot with the given dimensions.
    #[must_use]
    pub fn builder(columns: u32, rows: u32) -> SnapshotBuilder {
        SnapshotBuilder::new(columns, rows)
    }

    /// Number of tile columns.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of tile rows.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of tiles in the grid.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tile occupied by the actor.
    #[must_use]
    pub const fn actor(&self) -> CellCoord {
        self.actor
    }

    /// Number of turns resolved so far.
    #[must_use]
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    /// Stabilizers left in the inventory.
    #[must_use]
    pub const fn stabilizers(&self) -> u32 {
        self.stabilizers
    }

    /// Decay rules the snapshot is stepped with.
    #[must_use]
    pub const fn rules(&self) -> &DecayRules {
        &self.rules
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub fn contains(&self, cell: CellCoord) -> bool {
        cell.column() < self.columns && cell.row() < self.rows
    }

    /// Tile at the provided cell, if it lies inside the grid.
    #[must_use]
    pub fn tile(&self, cell: CellCoord) -> Option<&Tile> {
        self.index(cell).and_then(|index| self.tiles.get(index))
    }

    /// Reports whether the actor may stand on the cell.
    #[must_use]
    pub fn is_walkable(&self, cell: CellCoord) -> bool {
        self.tile(cell).is_some_and(Tile::is_walkable)
    }

    /// Intent that carries the actor from `from` onto the neighbouring `to`.
    ///
    /// Walkable tiles are entered with a move. A pillar is entered by pushing
    /// it one tile further, which needs a walkable tile behind it. Returns
    /// `None` when the cells are not neighbours or `to` cannot be entered.
    #[must_use]
    pub fn entry_intent(&self, from: CellCoord, to: CellCoord) -> Option<Intent> {
        let direction = Direction::between(from, to)?;
        let tile = self.tile(to)?;
        if tile.is_walkable() {
            return Some(Intent::Move(direction));
        }
        let pushable = tile.has_pillar()
            && to
                .offset(direction)
                .is_some_and(|behind| self.is_walkable(behind));
        pushable.then_some(Intent::PushPillar(direction))
    }

    /// Iterates over every tile together with its coordinate in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (CellCoord, &Tile)> + '_ {
        self.cells().zip(self.tiles.iter())
    }

    /// In-bounds king-move neighbours of the cell, clockwise from north.
    pub fn neighbors(&self, cell: CellCoord) -> impl Iterator<Item = CellCoord> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |direction| cell.offset(direction))
            .filter(|neighbor| self.contains(*neighbor))
    }

    /// Collapses a solid tile outside the regular turn resolution.
    ///
    /// Used by level scripts acting on the world between turns. Pillars on the
    /// tile fall with it. Returns `false` when the tile was not solid or lies
    /// outside the grid.
    pub fn collapse(&mut self, cell: CellCoord) -> bool {
        let Some(index) = self.index(cell) else {
            return false;
        };
        let tile = &mut self.tiles[index];
        if !tile.kind.is_solid() {
            return false;
        }
        tile.kind = TileKind::Void;
        tile.pillar = false;
        true
    }

    /// Stable 64-bit digest of the full snapshot content.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.columns.to_le_bytes());
        hasher.update(self.rows.to_le_bytes());
        for tile in &self.tiles {
            hasher.update([
                kind_tag(tile.kind),
                u8::from(tile.pillar),
                u8::from(tile.anchored),
            ]);
            hasher.update(tile.timer.to_le_bytes());
        }
        hasher.update(self.actor.column().to_le_bytes());
        hasher.update(self.actor.row().to_le_bytes());
        hasher.update(self.turn.to_le_bytes());
        hasher.update(self.stabilizers.to_le_bytes());
        hasher.update(self.rules.chain_penalty.to_le_bytes());
        hasher.update([u8::from(self.rules.half_rate)]);
        hasher.update(self.rules.stabilizer_radius.to_le_bytes());
        hasher.update(self.rules.stabilizer_floor.to_le_bytes());

        let digest = hasher.finalize();
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    fn cells(&self) -> impl Iterator<Item = CellCoord> {
        let columns = self.columns;
        (0..self.rows).flat_map(move |row| (0..columns).map(move |column| CellCoord::new(column, row)))
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }

        let row = usize::try_from(cell.row()).ok()?;
        let column = usize::try_from(cell.column()).ok()?;
        let width = usize::try_from(self.columns).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }

    fn neighbor_indices(&self, cell: CellCoord) -> impl Iterator<Item = usize> + '_ {
        self.neighbors(cell).filter_map(|neighbor| self.index(neighbor))
    }
}

fn kind_tag(kind: TileKind) -> u8 {
    match kind {
        TileKind::Floor => 0,
        TileKind::Void => 1,
        TileKind::Wall => 2,
        TileKind::Stairs => 3,
        TileKind::Crystal => 4,
        TileKind::Cache => 5,
    }
}

/// Incremental constructor for [`WorldSnapshot`] values.
///
/// Every solid tile starts as floor with the default timer. Placements are
/// validated when [`SnapshotBuilder::build`] runs.
#[derive(Clone, Debug)]
pub struct SnapshotBuilder {
    columns: u32,
    rows: u32,
    default_timer: i32,
    kinds: Vec<(CellCoord, TileKind)>,
    timers: Vec<(CellCoord, i32)>,
    pillars: Vec<CellCoord>,
    anchors: Vec<CellCoord>,
    actor: Option<CellCoord>,
    stabilizers: u32,
    rules: DecayRules,
}

impl SnapshotBuilder {
    fn new(columns: u32, rows: u32) -> Self {
        Self {
            columns,
            rows,
            default_timer: 10,
            kinds: Vec::new(),
            timers: Vec::new(),
            pillars: Vec::new(),
            anchors: Vec::new(),
            actor: None,
            stabilizers: 0,
            rules: DecayRules::default(),
        }
    }

    /// Timer assigned to every solid tile without an explicit override.
    #[must_use]
    pub fn default_timer(mut self, timer: i32) -> Self {
        self.default_timer = timer;
        self
    }

    /// Sets the terrain kind of a tile.
    #[must_use]
    pub fn kind(mut self, cell: CellCoord, kind: TileKind) -> Self {
        self.kinds.push((cell, kind));
        self
    }

    /// Overrides the timer of a solid tile.
    #[must_use]
    pub fn timer(mut self, cell: CellCoord, timer: i32) -> Self {
        self.timers.push((cell, timer));
        self
    }

    /// Places a pillar on a solid tile.
    #[must_use]
    pub fn pillar(mut self, cell: CellCoord) -> Self {
        self.pillars.push(cell);
        self
    }

    /// Anchors a tile so its timer never decrements.
    #[must_use]
    pub fn anchor(mut self, cell: CellCoord) -> Self {
        self.anchors.push(cell);
        self
    }

    /// Places the actor.
    #[must_use]
    pub fn actor(mut self, cell: CellCoord) -> Self {
        self.actor = Some(cell);
        self
    }

    /// Sets the stabilizer inventory.
    #[must_use]
    pub fn stabilizers(mut self, count: u32) -> Self {
        self.stabilizers = count;
        self
    }

    /// Sets the decay rules.
    #[must_use]
    pub fn rules(mut self, rules: DecayRules) -> Self {
        self.rules = rules;
        self
    }

    /// Validates the placements and produces the snapshot.
    pub fn build(self) -> Result<WorldSnapshot, LayoutError> {
        let oversized = LayoutError::OversizedGrid {
            columns: self.columns,
            rows: self.rows,
        };
        let width = usize::try_from(self.columns).map_err(|_| oversized.clone())?;
        let height = usize::try_from(self.rows).map_err(|_| oversized.clone())?;
        let cell_count = width.checked_mul(height).ok_or(oversized)?;
        if cell_count == 0 {
            return Err(LayoutError::EmptyLayout);
        }

        let mut world = WorldSnapshot {
            columns: self.columns,
            rows: self.rows,
            tiles: vec![Tile::new(TileKind::Floor, self.default_timer); cell_count],
            actor: CellCoord::new(0, 0),
            turn: 0,
            stabilizers: self.stabilizers,
            rules: self.rules,
        };

        for (cell, kind) in self.kinds {
            let tile = tile_slot(&mut world, cell)?;
            tile.kind = kind;
            if !kind.is_solid() {
                tile.timer = 0;
            }
        }

        for (cell, timer) in self.timers {
            let tile = tile_slot(&mut world, cell)?;
            if tile.kind.is_solid() {
                tile.timer = timer;
            }
        }

        for cell in self.anchors {
            tile_slot(&mut world, cell)?.anchored = true;
        }

        let actor = self.actor.ok_or(LayoutError::MissingActor)?;
        for cell in self.pillars {
            let tile = tile_slot(&mut world, cell)?;
            if !tile.kind.is_solid() || cell == actor {
                return Err(LayoutError::InvalidPillar { cell });
            }
            tile.pillar = true;
        }

        if !world.contains(actor) {
            return Err(LayoutError::OutOfBounds { cell: actor });
        }
        if !world.is_walkable(actor) {
            return Err(LayoutError::ActorNotWalkable { cell: actor });
        }
        world.actor = actor;

        Ok(world)
    }
}

fn tile_slot(world: &mut WorldSnapshot, cell: CellCoord) -> Result<&mut Tile, LayoutError> {
    let index = world.index(cell).ok_or(LayoutError::OutOfBounds { cell })?;
    world
        .tiles
        .get_mut(index)
        .ok_or(LayoutError::OutOfBounds { cell })
}

/// Summary of a resolved turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TurnResolution {
    /// Turn counter after the step.
    pub turn: u64,
    /// Reports whether the ground under the actor collapsed this turn.
    pub actor_fell: bool,
    /// Number of tiles that collapsed this turn.
    pub collapsed: u32,
    /// Number of chain-reaction passes that processed at least one collapse.
    pub cascade_passes: u32,
}

/// Advances the snapshot by exactly one turn.
///
/// The order is fixed: the intent is applied first, then timers decay, then
/// expired tiles collapse, then chain damage propagates until a pass produces
/// no new collapse. Pillar adjacency is evaluated against the pillar positions
/// from before the intent. On error the snapshot is left unchanged.
pub fn step(
    world: &mut WorldSnapshot,
    intent: Intent,
    out_events: &mut Vec<Event>,
) -> Result<TurnResolution, StepError> {
    if !world.tile(world.actor).is_some_and(|tile| tile.kind.is_solid()) {
        return Err(StepError::ActorOnVoid { cell: world.actor });
    }

    let prior_pillars: Vec<bool> = world.tiles.iter().map(|tile| tile.pillar).collect();
    let mut immune = vec![false; world.tiles.len()];
    apply_intent(world, intent, &mut immune, out_events)?;

    let turn = world.turn;
    world.turn = world.turn.saturating_add(1);

    let slowed = pillar_adjacency(world, &prior_pillars);
    let frozen: Vec<bool> = world
        .tiles
        .iter()
        .zip(&prior_pillars)
        .map(|(tile, was_pillar)| tile.anchored || tile.pillar || *was_pillar)
        .collect();

    for (index, tile) in world.tiles.iter_mut().enumerate() {
        if !tile.kind.is_solid() || frozen[index] || immune[index] {
            continue;
        }

        let mut divisor: u64 = 1;
        if slowed[index] {
            divisor *= 2;
        }
        if world.rules.half_rate {
            divisor *= 2;
        }
        if (turn + 1) % divisor == 0 {
            tile.timer = tile.timer.saturating_sub(1);
        }
    }

    let cells: Vec<CellCoord> = world.cells().collect();
    let mut frontier = Vec::new();
    for (index, tile) in world.tiles.iter_mut().enumerate() {
        if tile.kind.is_solid() && !frozen[index] && tile.timer <= 0 {
            tile.kind = TileKind::Void;
            frontier.push(index);
            out_events.push(Event::TileCollapsed {
                cell: cells[index],
                cause: CollapseCause::Decay,
            });
        }
    }

    let mut collapsed = frontier.len();
    let mut cascade_passes: u32 = 0;
    let penalty = world.rules.chain_penalty;
    while !frontier.is_empty() {
        cascade_passes += 1;
        let mut next = Vec::new();
        for &index in &frontier {
            let neighbors: Vec<usize> = world.neighbor_indices(cells[index]).collect();
            for neighbor in neighbors {
                let tile = &mut world.tiles[neighbor];
                if !tile.kind.is_solid() || frozen[neighbor] || immune[neighbor] {
                    continue;
                }

                tile.timer = tile.timer.saturating_sub(penalty);
                if tile.timer <= 0 {
                    tile.kind = TileKind::Void;
                    next.push(neighbor);
                    out_events.push(Event::TileCollapsed {
                        cell: cells[neighbor],
                        cause: CollapseCause::Cascade {
                            pass: cascade_passes,
                        },
                    });
                }
            }
        }
        collapsed += next.len();
        frontier = next;
    }

    let actor_fell = !world.tile(world.actor).is_some_and(|tile| tile.kind.is_solid());
    if actor_fell {
        out_events.push(Event::ActorFell { cell: world.actor });
    }

    Ok(TurnResolution {
        turn: world.turn,
        actor_fell,
        collapsed: u32::try_from(collapsed).unwrap_or(u32::MAX),
        cascade_passes,
    })
}

fn apply_intent(
    world: &mut WorldSnapshot,
    intent: Intent,
    immune: &mut [bool],
    out_events: &mut Vec<Event>,
) -> Result<(), StepError> {
    let from = world.actor;
    match intent {
        Intent::Wait => {}
        Intent::Move(direction) => {
            let destination = from
                .offset(direction)
                .filter(|cell| world.is_walkable(*cell))
                .ok_or(StepError::IllegalMove { from, direction })?;
            world.actor = destination;
            out_events.push(Event::ActorMoved {
                from,
                to: destination,
            });
            collect_cache(world, destination, out_events);
        }
        Intent::PushPillar(direction) => {
            let illegal = StepError::IllegalPush { from, direction };
            let pillar_cell = from
                .offset(direction)
                .filter(|cell| world.tile(*cell).is_some_and(|tile| tile.pillar))
                .ok_or(illegal)?;
            let destination = pillar_cell
                .offset(direction)
                .filter(|cell| world.is_walkable(*cell))
                .ok_or(illegal)?;
            let source_index = world.index(pillar_cell).ok_or(illegal)?;
            let destination_index = world.index(destination).ok_or(illegal)?;

            world.tiles[source_index].pillar = false;
            world.tiles[destination_index].pillar = true;
            world.actor = pillar_cell;
            out_events.push(Event::PillarPushed {
                from: pillar_cell,
                to: destination,
            });
            out_events.push(Event::ActorMoved {
                from,
                to: pillar_cell,
            });
            collect_cache(world, pillar_cell, out_events);
        }
        Intent::UseStabilizer => {
            if world.stabilizers == 0 {
                return Err(StepError::NoStabilizers);
            }
            world.stabilizers -= 1;

            let radius = world.rules.stabilizer_radius;
            let floor = world.rules.stabilizer_floor;
            let footprint: Vec<usize> = world
                .cells()
                .filter(|cell| cell.chebyshev_distance(from) <= radius)
                .filter_map(|cell| world.index(cell))
                .collect();

            let mut reset: u32 = 0;
            for index in footprint {
                let tile = &mut world.tiles[index];
                if !tile.kind.is_solid() {
                    continue;
                }
                tile.timer = tile.timer.max(floor);
                immune[index] = true;
                reset += 1;
            }
            out_events.push(Event::StabilizerUsed {
                center: from,
                tiles: reset,
            });
        }
    }

    Ok(())
}

fn collect_cache(world: &mut WorldSnapshot, cell: CellCoord, out_events: &mut Vec<Event>) {
    let Some(index) = world.index(cell) else {
        return;
    };
    let tile = &mut world.tiles[index];
    if tile.kind == TileKind::Cache {
        tile.kind = TileKind::Floor;
        world.stabilizers = world.stabilizers.saturating_add(1);
        out_events.push(Event::CacheCollected { cell });
    }
}

fn pillar_adjacency(world: &WorldSnapshot, pillars: &[bool]) -> Vec<bool> {
    let mut slowed = vec![false; world.tiles.len()];
    for (cell, is_pillar) in world.cells().zip(pillars) {
        if !*is_pillar {
            continue;
        }
        for neighbor in world.neighbor_indices(cell) {
            slowed[neighbor] = true;
        }
    }
    slowed
}

/// Query functions that provide derived read-only views of a snapshot.
pub mod query {
    use sinkhole_core::{CellCoord, Target, TileKind};

    use super::WorldSnapshot;

    /// Reports whether a pillar occupies the cell.
    #[must_use]
    pub fn is_pillar(world: &WorldSnapshot, cell: CellCoord) -> bool {
        world.tile(cell).is_some_and(|tile| tile.has_pillar())
    }

    /// Cells of the given kind in row-major order.
    #[must_use]
    pub fn cells_of_kind(world: &WorldSnapshot, kind: TileKind) -> Vec<CellCoord> {
        world
            .tiles()
            .filter(|(_, tile)| tile.kind() == kind)
            .map(|(cell, _)| cell)
            .collect()
    }

    /// Nearest tile of the given kind measured from the actor.
    ///
    /// Ties are broken by row, then column.
    #[must_use]
    pub fn nearest_of_kind(world: &WorldSnapshot, kind: TileKind) -> Option<CellCoord> {
        let actor = world.actor();
        cells_of_kind(world, kind)
            .into_iter()
            .min_by_key(|cell| (cell.chebyshev_distance(actor), cell.row(), cell.column()))
    }

    /// Resolves a target to a concrete solid tile.
    #[must_use]
    pub fn resolve_target(world: &WorldSnapshot, target: Target) -> Option<CellCoord> {
        match target {
            Target::Cell(cell) => world
                .tile(cell)
                .filter(|tile| tile.kind().is_solid())
                .map(|_| cell),
            other => other.kind().and_then(|kind| nearest_of_kind(world, kind)),
        }
    }

    /// Number of tiles that have not collapsed and are not walls.
    #[must_use]
    pub fn solid_tile_count(world: &WorldSnapshot) -> usize {
        world
            .tiles()
            .filter(|(_, tile)| tile.kind().is_solid())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinkhole_core::Target;

    fn open_grid(size: u32, timer: i32) -> SnapshotBuilder {
        WorldSnapshot::builder(size, size)
            .default_timer(timer)
            .actor(CellCoord::new(size / 2, size / 2))
    }

    fn wait(world: &mut WorldSnapshot) -> TurnResolution {
        let mut events = Vec::new();
        step(world, Intent::Wait, &mut events).expect("wait is always legal")
    }

    fn timer_at(world: &WorldSnapshot, column: u32, row: u32) -> i32 {
        world
            .tile(CellCoord::new(column, row))
            .expect("cell inside grid")
            .timer()
    }

    #[test]
    fn uniform_grid_collapses_on_the_tenth_turn() {
        let mut world = open_grid(5, 10).build().expect("valid layout");

        for turn in 1..10 {
            let resolution = wait(&mut world);
            assert_eq!(resolution.turn, turn);
            assert!(!resolution.actor_fell, "actor survived turn {turn}");
            assert_eq!(resolution.collapsed, 0);
        }

        let mut events = Vec::new();
        let resolution = step(&mut world, Intent::Wait, &mut events).expect("actor still solid");
        assert_eq!(resolution.turn, 10);
        assert!(resolution.actor_fell);
        assert_eq!(resolution.collapsed, 25);
        assert_eq!(query::solid_tile_count(&world), 0);
        assert!(events.contains(&Event::ActorFell {
            cell: CellCoord::new(2, 2)
        }));
    }

    #[test]
    fn stepping_a_fallen_actor_is_rejected() {
        let mut world = open_grid(3, 1).build().expect("valid layout");
        assert!(wait(&mut world).actor_fell);

        let before = world.clone();
        let mut events = Vec::new();
        let result = step(&mut world, Intent::Wait, &mut events);

        assert_eq!(
            result,
            Err(StepError::ActorOnVoid {
                cell: CellCoord::new(1, 1)
            })
        );
        assert_eq!(world, before);
        assert!(events.is_empty());
    }

    #[test]
    fn pillar_neighbours_decay_at_half_rate() {
        let mut world = open_grid(5, 10)
            .pillar(CellCoord::new(3, 2))
            .timer(CellCoord::new(2, 2), 4)
            .build()
            .expect("valid layout");

        let _ = wait(&mut world);
        let _ = wait(&mut world);

        assert_eq!(timer_at(&world, 2, 2), 3);
        assert_eq!(timer_at(&world, 3, 2), 10, "pillar tile is frozen");
        assert_eq!(timer_at(&world, 0, 0), 8, "distant tile decays at full rate");
    }

    #[test]
    fn pillar_adjacency_composes_with_half_rate_tier() {
        let rules = DecayRules {
            half_rate: true,
            ..DecayRules::default()
        };
        let mut world = open_grid(5, 10)
            .rules(rules)
            .pillar(CellCoord::new(0, 0))
            .build()
            .expect("valid layout");

        for _ in 0..8 {
            let _ = wait(&mut world);
        }

        assert_eq!(timer_at(&world, 1, 1), 8, "quarter rate next to the pillar");
        assert_eq!(timer_at(&world, 4, 4), 6, "half rate elsewhere");
        assert_eq!(timer_at(&world, 0, 0), 10);
    }

    #[test]
    fn simultaneous_collapses_topple_a_shared_neighbour() {
        let mut world = open_grid(5, 10)
            .timer(CellCoord::new(0, 0), 1)
            .timer(CellCoord::new(2, 0), 1)
            .timer(CellCoord::new(1, 0), 3)
            .build()
            .expect("valid layout");

        let mut events = Vec::new();
        let resolution = step(&mut world, Intent::Wait, &mut events).expect("legal wait");

        let shared = world.tile(CellCoord::new(1, 0)).expect("inside grid");
        assert_eq!(shared.kind(), TileKind::Void);
        assert!(shared.timer() <= 0);
        assert!(events.contains(&Event::TileCollapsed {
            cell: CellCoord::new(1, 0),
            cause: CollapseCause::Cascade { pass: 1 },
        }));
        assert_eq!(resolution.cascade_passes, 2);
        assert_eq!(resolution.collapsed, 3);
        assert!(!resolution.actor_fell);
    }

    #[test]
    fn cascades_run_until_no_tile_topples() {
        let mut world = WorldSnapshot::builder(6, 1)
            .default_timer(2)
            .timer(CellCoord::new(0, 0), 1)
            .timer(CellCoord::new(5, 0), 20)
            .actor(CellCoord::new(5, 0))
            .build()
            .expect("valid layout");

        let resolution = wait(&mut world);

        assert_eq!(resolution.collapsed, 5);
        assert_eq!(resolution.cascade_passes, 5);
        assert_eq!(timer_at(&world, 5, 0), 17);
        assert!(!resolution.actor_fell);
    }

    #[test]
    fn stabilizer_resets_footprint_and_shields_it_from_cascades() {
        let mut world = open_grid(5, 4)
            .timer(CellCoord::new(0, 2), 1)
            .stabilizers(1)
            .build()
            .expect("valid layout");

        let mut events = Vec::new();
        let resolution =
            step(&mut world, Intent::UseStabilizer, &mut events).expect("stabilizer available");

        assert_eq!(world.stabilizers(), 0);
        assert!(events.contains(&Event::StabilizerUsed {
            center: CellCoord::new(2, 2),
            tiles: 9,
        }));
        for row in 1..=3 {
            for column in 1..=3 {
                let tile = world.tile(CellCoord::new(column, row)).expect("inside grid");
                assert_eq!(tile.kind(), TileKind::Floor);
                assert_eq!(tile.timer(), DEFAULT_STABILIZER_FLOOR);
            }
        }
        assert!(!resolution.actor_fell);
        assert_eq!(
            world.tile(CellCoord::new(0, 2)).expect("inside grid").kind(),
            TileKind::Void
        );
        assert_eq!(timer_at(&world, 0, 1), 1, "cascade reaches tiles outside the bubble");
        assert_eq!(timer_at(&world, 4, 4), 3);
    }

    #[test]
    fn stabilizer_requires_inventory() {
        let mut world = open_grid(3, 5).build().expect("valid layout");
        let before = world.clone();
        let mut events = Vec::new();

        assert_eq!(
            step(&mut world, Intent::UseStabilizer, &mut events),
            Err(StepError::NoStabilizers)
        );
        assert_eq!(world, before);
    }

    #[test]
    fn anchored_tiles_never_decrement() {
        let mut world = open_grid(3, 1)
            .anchor(CellCoord::new(1, 1))
            .timer(CellCoord::new(1, 1), 1)
            .build()
            .expect("valid layout");

        let resolution = wait(&mut world);

        assert!(!resolution.actor_fell, "anchor holds while neighbours fall");
        assert_eq!(resolution.collapsed, 8);
        assert_eq!(timer_at(&world, 1, 1), 1);
    }

    #[test]
    fn pushing_a_pillar_moves_actor_into_its_tile() {
        let mut world = open_grid(5, 10)
            .pillar(CellCoord::new(3, 2))
            .build()
            .expect("valid layout");

        let mut events = Vec::new();
        let _ = step(&mut world, Intent::PushPillar(Direction::East), &mut events)
            .expect("free tile behind the pillar");

        assert_eq!(world.actor(), CellCoord::new(3, 2));
        assert!(query::is_pillar(&world, CellCoord::new(4, 2)));
        assert!(!query::is_pillar(&world, CellCoord::new(3, 2)));
        assert_eq!(timer_at(&world, 4, 2), 10, "new pillar tile frozen");
        assert_eq!(timer_at(&world, 3, 2), 10, "pillar left this tile during the turn");

        let blocked = step(&mut world, Intent::PushPillar(Direction::East), &mut events);
        assert_eq!(
            blocked,
            Err(StepError::IllegalPush {
                from: CellCoord::new(3, 2),
                direction: Direction::East,
            })
        );
    }

    #[test]
    fn entry_intent_pushes_pillars_with_room_behind_them() {
        let world = open_grid(5, 10)
            .pillar(CellCoord::new(3, 2))
            .pillar(CellCoord::new(2, 1))
            .pillar(CellCoord::new(2, 0))
            .kind(CellCoord::new(1, 2), TileKind::Wall)
            .build()
            .expect("valid layout");
        let actor = world.actor();

        assert_eq!(
            world.entry_intent(actor, CellCoord::new(3, 2)),
            Some(Intent::PushPillar(Direction::East))
        );
        assert_eq!(
            world.entry_intent(actor, CellCoord::new(3, 3)),
            Some(Intent::Move(Direction::SouthEast))
        );
        assert_eq!(world.entry_intent(actor, CellCoord::new(2, 1)), None, "pillar behind");
        assert_eq!(world.entry_intent(actor, CellCoord::new(1, 2)), None, "wall");
        assert_eq!(world.entry_intent(actor, CellCoord::new(4, 2)), None, "not adjacent");

        let mut pushed = world.clone();
        let mut events = Vec::new();
        let intent = world
            .entry_intent(actor, CellCoord::new(3, 2))
            .expect("pushable");
        let _ = step(&mut pushed, intent, &mut events).expect("entry intents are legal");
        assert_eq!(pushed.actor(), CellCoord::new(3, 2));
    }

    #[test]
    fn moves_into_walls_or_pillars_are_rejected() {
        let mut world = open_grid(3, 10)
            .kind(CellCoord::new(1, 0), TileKind::Wall)
            .pillar(CellCoord::new(2, 1))
            .build()
            .expect("valid layout");
        let mut events = Vec::new();

        for direction in [Direction::North, Direction::East] {
            assert_eq!(
                step(&mut world, Intent::Move(direction), &mut events),
                Err(StepError::IllegalMove {
                    from: CellCoord::new(1, 1),
                    direction,
                })
            );
        }
        assert_eq!(world.turn(), 0);
    }

    #[test]
    fn entering_a_cache_collects_a_stabilizer() {
        let mut world = open_grid(3, 10)
            .kind(CellCoord::new(2, 2), TileKind::Cache)
            .build()
            .expect("valid layout");
        let mut events = Vec::new();

        let _ = step(&mut world, Intent::Move(Direction::SouthEast), &mut events)
            .expect("cache is walkable");

        assert_eq!(world.stabilizers(), 1);
        assert_eq!(
            world.tile(CellCoord::new(2, 2)).expect("inside grid").kind(),
            TileKind::Floor
        );
        assert!(events.contains(&Event::CacheCollected {
            cell: CellCoord::new(2, 2)
        }));
    }

    #[test]
    fn builder_rejects_invalid_placements() {
        assert_eq!(
            WorldSnapshot::builder(0, 4).actor(CellCoord::new(0, 0)).build(),
            Err(LayoutError::EmptyLayout)
        );
        assert_eq!(
            WorldSnapshot::builder(2, 2).build(),
            Err(LayoutError::MissingActor)
        );
        assert_eq!(
            WorldSnapshot::builder(2, 2)
                .actor(CellCoord::new(0, 0))
                .kind(CellCoord::new(0, 0), TileKind::Void)
                .build(),
            Err(LayoutError::ActorNotWalkable {
                cell: CellCoord::new(0, 0)
            })
        );
        assert_eq!(
            WorldSnapshot::builder(2, 2)
                .actor(CellCoord::new(0, 0))
                .pillar(CellCoord::new(0, 0))
                .build(),
            Err(LayoutError::InvalidPillar {
                cell: CellCoord::new(0, 0)
            })
        );
        assert_eq!(
            WorldSnapshot::builder(2, 2)
                .actor(CellCoord::new(0, 0))
                .timer(CellCoord::new(2, 0), 3)
                .build(),
            Err(LayoutError::OutOfBounds {
                cell: CellCoord::new(2, 0)
            })
        );
    }

    #[test]
    fn targets_resolve_to_nearest_matching_tile() {
        let world = WorldSnapshot::builder(7, 1)
            .actor(CellCoord::new(3, 0))
            .kind(CellCoord::new(0, 0), TileKind::Stairs)
            .kind(CellCoord::new(5, 0), TileKind::Stairs)
            .kind(CellCoord::new(6, 0), TileKind::Void)
            .build()
            .expect("valid layout");

        assert_eq!(
            query::resolve_target(&world, Target::Stairs),
            Some(CellCoord::new(5, 0))
        );
        assert_eq!(query::resolve_target(&world, Target::Crystal), None);
        assert_eq!(
            query::resolve_target(&world, Target::Cell(CellCoord::new(6, 0))),
            None
        );
        assert_eq!(
            query::resolve_target(&world, Target::Cell(CellCoord::new(1, 0))),
            Some(CellCoord::new(1, 0))
        );
    }

    #[test]
    fn fingerprint_tracks_content() {
        let world = open_grid(4, 6).build().expect("valid layout");
        let mut stepped = world.clone();
        assert_eq!(world.fingerprint(), stepped.fingerprint());

        let _ = wait(&mut stepped);
        assert_ne!(world.fingerprint(), stepped.fingerprint());
    }

    #[test]
    fn external_collapse_never_revives_or_repeats() {
        let mut world = open_grid(3, 6)
            .pillar(CellCoord::new(0, 0))
            .kind(CellCoord::new(2, 0), TileKind::Wall)
            .build()
            .expect("valid layout");

        assert!(world.collapse(CellCoord::new(0, 0)));
        assert!(!world.collapse(CellCoord::new(0, 0)));
        assert!(!world.collapse(CellCoord::new(2, 0)), "walls are inert");
        assert!(!world.collapse(CellCoord::new(7, 7)));

        let tile = world.tile(CellCoord::new(0, 0)).expect("inside grid");
        assert_eq!(tile.kind(), TileKind::Void);
        assert!(!tile.has_pillar());
    }
}
