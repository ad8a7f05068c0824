//! TOML level files.
//!
//! ```toml
//! name = "bridge"
//! map = """
//! @..P.>
//! ..+...
//! """
//! timers = """
//! 9 9 3 9 9 9
//! 9 9 9 4 9 9
//! """
//! default_timer = 10
//! stabilizers = 1
//! target = "stairs"            # or "crystal", "cache", { cell = { column = 4, row = 1 } }
//! move_budget = 80
//!
//! [rules]
//! half_rate = true
//!
//! [planner]
//! horizon = 3
//! ```

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use sinkhole_core::{PolicyKind, Target, TileKind};
use sinkhole_system_oracle::{PlannerConfig, RunRequest};
use sinkhole_world::{parse_layout, DecayRules, WorldSnapshot};

/// Timer given to solid tiles the timer grid leaves out.
const DEFAULT_TIMER: i32 = 10;
/// Real turns a level may take unless the file or the command line says otherwise.
pub(crate) const DEFAULT_MOVE_BUDGET: u32 = 200;

/// Level description as written on disk.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LevelFile {
    name: Option<String>,
    map: String,
    #[serde(default)]
    timers: Option<String>,
    #[serde(default = "default_timer")]
    default_timer: i32,
    #[serde(default)]
    stabilizers: u32,
    #[serde(default = "default_target")]
    target: Target,
    #[serde(default)]
    move_budget: Option<u32>,
    #[serde(default)]
    resource_budget: Option<u32>,
    #[serde(default)]
    rules: DecayRules,
    #[serde(default)]
    planner: PlannerConfig,
}

/// Budgets supplied on the command line, overriding the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct BudgetOverrides {
    pub(crate) move_budget: Option<u32>,
    pub(crate) resource_budget: Option<u32>,
}

fn default_timer() -> i32 {
    DEFAULT_TIMER
}

fn default_target() -> Target {
    Target::Stairs
}

impl LevelFile {
    /// Reads and parses a level file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read level file {}", path.display()))?;
        let mut level = Self::parse(&contents)
            .with_context(|| format!("failed to load level {}", path.display()))?;
        if level.name.is_none() {
            level.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        Ok(level)
    }

    /// Parses level file contents.
    pub(crate) fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse level toml contents")
    }

    /// Display name of the level.
    pub(crate) fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Builds the starting snapshot.
    pub(crate) fn snapshot(&self) -> Result<WorldSnapshot> {
        let snapshot = parse_layout(&self.map, self.timers.as_deref(), self.default_timer)
            .context("invalid level map")?
            .stabilizers(self.stabilizers)
            .rules(self.rules)
            .build()
            .context("invalid level layout")?;
        Ok(snapshot)
    }

    /// Assembles a run of this level under the given policy.
    ///
    /// Without a resource budget the run may spend whatever it holds.
    pub(crate) fn request(
        &self,
        policy: PolicyKind,
        overrides: BudgetOverrides,
    ) -> Result<RunRequest> {
        Ok(RunRequest {
            policy,
            move_budget: overrides
                .move_budget
                .or(self.move_budget)
                .unwrap_or(DEFAULT_MOVE_BUDGET),
            resource_budget: overrides
                .resource_budget
                .or(self.resource_budget)
                .unwrap_or(u32::MAX),
            target: self.target,
            level: self.snapshot()?,
            config: self.planner,
        })
    }
}

/// Draws the snapshot with the same glyphs level maps use.
pub(crate) fn render(world: &WorldSnapshot) -> String {
    let mut out = String::with_capacity(world.tile_count() + world.rows() as usize);
    let mut row = 0;
    for (cell, tile) in world.tiles() {
        if cell.row() != row {
            out.push('\n');
            row = cell.row();
        }
        let glyph = if cell == world.actor() {
            '@'
        } else if tile.has_pillar() {
            'P'
        } else if tile.is_anchored() && tile.kind() == TileKind::Floor {
            'A'
        } else {
            match tile.kind() {
                TileKind::Floor => '.',
                TileKind::Void => '_',
                TileKind::Wall => '#',
                TileKind::Stairs => '>',
                TileKind::Crystal => '*',
                TileKind::Cache => '+',
            }
        };
        out.push(glyph);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinkhole_core::{CellCoord, Outcome};
    use sinkhole_system_oracle::run_to_completion;

    const BRIDGE: &str = r#"
        name = "bridge"
        map = """
        @.P
        A+>
        """
        timers = """
        9 3 9
        9 9 9
        """
        stabilizers = 2
        move_budget = 30

        [rules]
        half_rate = true

        [planner]
        horizon = 2
    "#;

    #[test]
    fn full_level_file_builds_its_snapshot() {
        let level = LevelFile::parse(BRIDGE).expect("valid level");
        let world = level.snapshot().expect("valid layout");

        assert_eq!(level.name(), "bridge");
        assert_eq!((world.columns(), world.rows()), (3, 2));
        assert_eq!(world.stabilizers(), 2);
        assert!(world.rules().half_rate);
        assert_eq!(world.rules().chain_penalty, DecayRules::default().chain_penalty);
        assert_eq!(
            world.tile(CellCoord::new(1, 0)).map(|tile| tile.timer()),
            Some(3)
        );
        assert_eq!(level.planner.horizon, 2);
        assert_eq!(level.planner.max_candidates, PlannerConfig::default().max_candidates);
    }

    #[test]
    fn minimal_level_file_falls_back_to_defaults() {
        let level = LevelFile::parse("map = \"@.>\"").expect("valid level");
        let request = level
            .request(PolicyKind::Greedy, BudgetOverrides::default())
            .expect("valid layout");

        assert_eq!(level.name(), "unnamed");
        assert_eq!(request.target, Target::Stairs);
        assert_eq!(request.move_budget, DEFAULT_MOVE_BUDGET);
        assert_eq!(request.resource_budget, u32::MAX);
        assert_eq!(request.config, PlannerConfig::default());
        assert_eq!(
            request.level.tile(CellCoord::new(1, 0)).map(|tile| tile.timer()),
            Some(DEFAULT_TIMER)
        );
    }

    #[test]
    fn command_line_budgets_override_the_file() {
        let level = LevelFile::parse(BRIDGE).expect("valid level");
        let overrides = BudgetOverrides {
            move_budget: None,
            resource_budget: Some(1),
        };

        let request = level
            .request(PolicyKind::Oracle, overrides)
            .expect("valid layout");

        assert_eq!(request.move_budget, 30);
        assert_eq!(request.resource_budget, 1);
    }

    #[test]
    fn cell_targets_are_read_as_tables() {
        let level = LevelFile::parse(
            "map = \"@..\"\ntarget = { cell = { column = 2, row = 0 } }",
        )
        .expect("valid level");

        assert_eq!(level.target, Target::Cell(CellCoord::new(2, 0)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(LevelFile::parse("map = \"@.>\"\nstabiliser = 3").is_err());
    }

    #[test]
    fn broken_maps_surface_as_errors() {
        let level = LevelFile::parse("map = \"..>\"").expect("valid toml");
        assert!(level.snapshot().is_err());
    }

    const SHIPPED: [&str; 4] = [
        include_str!("../../../levels/open_floor.toml"),
        include_str!("../../../levels/rotten_bridge.toml"),
        include_str!("../../../levels/crystal_cellar.toml"),
        include_str!("../../../levels/pillar_gate.toml"),
    ];

    #[test]
    fn shipped_levels_play_to_a_terminal_outcome() {
        for contents in SHIPPED {
            let level = LevelFile::parse(contents).expect("valid level");
            for policy in PolicyKind::ALL {
                let request = level
                    .request(policy, BudgetOverrides::default())
                    .expect("valid layout");
                let budget = request.move_budget;

                let summary = run_to_completion(request)
                    .unwrap_or_else(|error| panic!("{} {policy}: {error}", level.name()));

                assert!(summary.moves_taken <= budget, "{} {policy}", level.name());
                assert_eq!(summary.divergences, 0, "{} {policy}", level.name());
            }
        }
    }

    #[test]
    fn open_and_gated_levels_are_won_by_every_policy() {
        for contents in [SHIPPED[0], SHIPPED[3]] {
            let level = LevelFile::parse(contents).expect("valid level");
            for policy in PolicyKind::ALL {
                let request = level
                    .request(policy, BudgetOverrides::default())
                    .expect("valid layout");

                let summary = run_to_completion(request).expect("run completes");

                assert_eq!(summary.outcome, Outcome::Win, "{} {policy}", level.name());
            }
        }
    }

    #[test]
    fn render_uses_map_glyphs() {
        let level = LevelFile::parse(BRIDGE).expect("valid level");
        let mut world = level.snapshot().expect("valid layout");
        assert!(world.collapse(CellCoord::new(1, 0)));

        assert_eq!(render(&world), "@_P\nA+>");
    }
}
