#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic candidate route generator.
//!
//! The generator proposes a bounded set of distinct routes from the actor to
//! a goal. Routes are found with an A* search over enterable tiles whose step
//! cost grows when a tile is projected to expire near the moment the actor
//! arrives; the heuristic is the Chebyshev distance field toward the goal.
//! Pillars with free ground behind them are pushed through at extra cost.
//! Searches are repeated over a ladder of risk weights, from every walkable
//! first step, and through nearby stabilizer caches, so the simulator has a
//! varied field to validate. Nothing here guarantees feasibility; the
//! simulator decides.

use std::{cmp::Reverse, collections::BinaryHeap};

use serde::Deserialize;
use sinkhole_core::{CellCoord, Intent, TileKind};
use sinkhole_world::{query, NavigationField, WorldSnapshot};

const STEP_COST: u32 = 10;
const PUSH_COST: u32 = 10;
const WEIGHT_LADDER: [u32; 4] = [0, 4, 12, 40];
const FIRST_STEP_WEIGHTS: [u32; 2] = [4, 40];

/// Tuning knobs for candidate generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Upper bound on the number of routes returned.
    pub max_candidates: usize,
    /// Projected slack below which a tile is treated as risky.
    pub safe_slack: i32,
    /// Number of nearest stabilizer caches considered as detours.
    pub max_cache_detours: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            max_candidates: 24,
            safe_slack: 3,
            max_cache_detours: 2,
        }
    }
}

/// Proposed route from the actor to the goal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Candidate {
    cells: Vec<CellCoord>,
    tightest_slack: i32,
}

impl Candidate {
    /// Wraps an explicit route, scoring it against the snapshot.
    ///
    /// The route must start at the actor; consecutive tiles are expected to
    /// be king moves apart.
    #[must_use]
    pub fn new(world: &WorldSnapshot, cells: Vec<CellCoord>) -> Self {
        Self {
            tightest_slack: tightest_slack(world, &cells),
            cells,
        }
    }

    /// Tiles of the route, starting at the actor and ending at the goal.
    #[must_use]
    pub fn cells(&self) -> &[CellCoord] {
        &self.cells
    }

    /// Number of moves the route takes.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    /// Last tile of the route.
    #[must_use]
    pub fn goal(&self) -> Option<CellCoord> {
        self.cells.last().copied()
    }

    /// Smallest projected `timer - arrival step` over the route's tiles.
    #[must_use]
    pub fn tightest_slack(&self) -> i32 {
        self.tightest_slack
    }
}

/// Candidate generator with reusable search buffers.
#[derive(Clone, Debug, Default)]
pub struct CandidateGenerator {
    config: CandidateConfig,
    scratch: SearchScratch,
}

impl CandidateGenerator {
    /// Creates a generator with the provided tuning.
    #[must_use]
    pub fn new(config: CandidateConfig) -> Self {
        Self {
            config,
            scratch: SearchScratch::default(),
        }
    }

    /// Tuning the generator was created with.
    #[must_use]
    pub fn config(&self) -> &CandidateConfig {
        &self.config
    }

    /// Produces distinct routes toward `goal`, best first.
    ///
    /// Returns an empty set when the goal cannot be reached over solid
    /// ground; returns the single trivial route when the actor already stands
    /// on the goal.
    pub fn generate(&mut self, world: &WorldSnapshot, goal: CellCoord) -> Vec<Candidate> {
        let actor = world.actor();
        if actor == goal {
            return vec![Candidate {
                cells: vec![actor],
                tightest_slack: i32::MAX,
            }];
        }

        let field = NavigationField::toward(world, goal);
        if !field.is_reachable(actor) {
            return Vec::new();
        }

        let safe_slack = self.config.safe_slack;
        let mut routes: Vec<Vec<CellCoord>> = Vec::new();

        for weight in WEIGHT_LADDER {
            let query = RouteQuery {
                start: actor,
                start_depth: 0,
                goal,
                forbidden: None,
                weight,
                safe_slack,
            };
            if let Some(route) = self.scratch.route(world, &field, query) {
                push_unique(&mut routes, route);
            }
        }

        let mut first_steps: Vec<CellCoord> = world
            .neighbors(actor)
            .filter(|cell| {
                world.entry_intent(actor, *cell).is_some() && field.is_reachable(*cell)
            })
            .collect();
        first_steps.sort_by_key(|cell| field.distance(*cell));
        for first in first_steps {
            for weight in FIRST_STEP_WEIGHTS {
                let query = RouteQuery {
                    start: first,
                    start_depth: 1,
                    goal,
                    forbidden: Some(actor),
                    weight,
                    safe_slack,
                };
                if let Some(tail) = self.scratch.route(world, &field, query) {
                    let mut route = Vec::with_capacity(tail.len() + 1);
                    route.push(actor);
                    route.extend(tail);
                    push_unique(&mut routes, route);
                }
            }
        }

        for cache in nearest_caches(world, self.config.max_cache_detours) {
            if cache == goal {
                continue;
            }
            if let Some(route) = self.cache_detour(world, &field, cache, goal) {
                push_unique(&mut routes, route);
            }
        }

        let mut candidates: Vec<Candidate> = routes
            .into_iter()
            .map(|cells| Candidate::new(world, cells))
            .collect();
        candidates.sort_by_key(|candidate| {
            (
                Reverse(candidate.tightest_slack.min(safe_slack)),
                candidate.steps(),
            )
        });
        candidates.truncate(self.config.max_candidates);
        candidates
    }

    fn cache_detour(
        &mut self,
        world: &WorldSnapshot,
        field: &NavigationField,
        cache: CellCoord,
        goal: CellCoord,
    ) -> Option<Vec<CellCoord>> {
        let safe_slack = self.config.safe_slack;
        let toward_cache = NavigationField::toward(world, cache);
        let approach = self.scratch.route(
            world,
            &toward_cache,
            RouteQuery {
                start: world.actor(),
                start_depth: 0,
                goal: cache,
                forbidden: None,
                weight: WEIGHT_LADDER[1],
                safe_slack,
            },
        )?;
        let depth = u32::try_from(approach.len().saturating_sub(1)).ok()?;
        let departure = self.scratch.route(
            world,
            field,
            RouteQuery {
                start: cache,
                start_depth: depth,
                goal,
                forbidden: None,
                weight: WEIGHT_LADDER[1],
                safe_slack,
            },
        )?;

        let mut route = approach;
        route.extend(departure.into_iter().skip(1));
        Some(route)
    }
}

fn push_unique(routes: &mut Vec<Vec<CellCoord>>, route: Vec<CellCoord>) {
    if !routes.contains(&route) {
        routes.push(route);
    }
}

fn nearest_caches(world: &WorldSnapshot, limit: usize) -> Vec<CellCoord> {
    let actor = world.actor();
    let mut caches = query::cells_of_kind(world, TileKind::Cache);
    caches.sort_by_key(|cell| (cell.chebyshev_distance(actor), cell.row(), cell.column()));
    caches.truncate(limit);
    caches
}

fn tightest_slack(world: &WorldSnapshot, cells: &[CellCoord]) -> i32 {
    (1_i32..)
        .zip(cells.iter().skip(1))
        .filter_map(|(arrival, cell)| projected_slack(world, *cell, arrival))
        .min()
        .unwrap_or(i32::MAX)
}

/// Projected `timer - arrival` for a tile, or `None` when the tile never decays.
fn projected_slack(world: &WorldSnapshot, cell: CellCoord, arrival: i32) -> Option<i32> {
    let tile = world.tile(cell)?;
    if tile.is_anchored() {
        return None;
    }
    Some(tile.timer().saturating_sub(arrival))
}

#[derive(Clone, Copy, Debug)]
struct RouteQuery {
    start: CellCoord,
    start_depth: u32,
    goal: CellCoord,
    forbidden: Option<CellCoord>,
    weight: u32,
    safe_slack: i32,
}

#[derive(Clone, Debug, Default)]
struct SearchScratch {
    cost: Vec<u32>,
    depth: Vec<u32>,
    parent: Vec<Option<usize>>,
    closed: Vec<bool>,
    heap: BinaryHeap<Reverse<(u32, u32, u32, u32)>>,
}

impl SearchScratch {
    fn reset(&mut self, cell_count: usize) {
        self.cost.clear();
        self.cost.resize(cell_count, u32::MAX);
        self.depth.clear();
        self.depth.resize(cell_count, 0);
        self.parent.clear();
        self.parent.resize(cell_count, None);
        self.closed.clear();
        self.closed.resize(cell_count, false);
        self.heap.clear();
    }

    fn route(
        &mut self,
        world: &WorldSnapshot,
        field: &NavigationField,
        query: RouteQuery,
    ) -> Option<Vec<CellCoord>> {
        let width = world.columns();
        self.reset(world.tile_count());

        let start_index = index(width, query.start)?;
        let start_estimate = estimate(field, query.start)?;
        self.cost[start_index] = 0;
        self.depth[start_index] = query.start_depth;
        self.heap.push(Reverse((
            start_estimate,
            0,
            query.start.row(),
            query.start.column(),
        )));

        while let Some(Reverse((_, cost, row, column))) = self.heap.pop() {
            let cell = CellCoord::new(column, row);
            let current = index(width, cell)?;
            if self.closed[current] || cost > self.cost[current] {
                continue;
            }
            self.closed[current] = true;

            if cell == query.goal {
                return Some(self.reconstruct(width, current));
            }

            let arrival = self.depth[current].saturating_add(1);
            for neighbor in world.neighbors(cell) {
                if Some(neighbor) == query.forbidden {
                    continue;
                }
                let surcharge = match world.entry_intent(cell, neighbor) {
                    Some(Intent::PushPillar(_)) => PUSH_COST,
                    Some(_) => 0,
                    None => continue,
                };
                let Some(remaining) = estimate(field, neighbor) else {
                    continue;
                };
                let Some(next) = index(width, neighbor) else {
                    continue;
                };
                if self.closed[next] {
                    continue;
                }

                let step = STEP_COST.saturating_add(surcharge).saturating_add(
                    query
                        .weight
                        .saturating_mul(risk(world, neighbor, arrival, query.safe_slack)),
                );
                let next_cost = cost.saturating_add(step);
                if next_cost >= self.cost[next] {
                    continue;
                }

                self.cost[next] = next_cost;
                self.depth[next] = arrival;
                self.parent[next] = Some(current);
                self.heap.push(Reverse((
                    next_cost.saturating_add(remaining),
                    next_cost,
                    neighbor.row(),
                    neighbor.column(),
                )));
            }
        }

        None
    }

    fn reconstruct(&self, width: u32, goal_index: usize) -> Vec<CellCoord> {
        let mut cells = vec![coord(width, goal_index)];
        let mut cursor = goal_index;
        while let Some(previous) = self.parent[cursor] {
            cells.push(coord(width, previous));
            cursor = previous;
        }
        cells.reverse();
        cells
    }
}

fn estimate(field: &NavigationField, cell: CellCoord) -> Option<u32> {
    field
        .distance(cell)
        .map(|distance| u32::from(distance).saturating_mul(STEP_COST))
}

fn risk(world: &WorldSnapshot, cell: CellCoord, arrival: u32, safe_slack: i32) -> u32 {
    let arrival = i32::try_from(arrival).unwrap_or(i32::MAX);
    projected_slack(world, cell, arrival)
        .map(|slack| safe_slack.saturating_sub(slack).max(0).unsigned_abs())
        .unwrap_or(0)
}

fn index(width: u32, cell: CellCoord) -> Option<usize> {
    let column = usize::try_from(cell.column()).ok()?;
    let row = usize::try_from(cell.row()).ok()?;
    let width = usize::try_from(width).ok()?;
    row.checked_mul(width)?.checked_add(column)
}

fn coord(width: u32, index: usize) -> CellCoord {
    let width = usize::try_from(width).unwrap_or(1).max(1);
    let column = u32::try_from(index % width).unwrap_or(u32::MAX);
    let row = u32::try_from(index / width).unwrap_or(u32::MAX);
    CellCoord::new(column, row)
}
