//! ASCII level layouts.
//!
//! | glyph | tile |
//! |---|---|
//! | `.` | floor |
//! | `#` | wall |
//! | `_` | void |
//! | `>` | stairs |
//! | `*` | crystal |
//! | `+` | stabilizer cache |
//! | `P` | floor with a pillar |
//! | `A` | anchored floor |
//! | `@` | floor with the actor |
//!
//! Blank lines and surrounding whitespace are ignored. The optional timer grid
//! lists one whitespace-separated integer per tile and overrides the default
//! timer of solid tiles.

use sinkhole_core::{CellCoord, TileKind};

use crate::{LayoutError, SnapshotBuilder, WorldSnapshot};

/// Parses an ASCII layout into a snapshot builder.
///
/// The returned builder still accepts inventory and rule settings before
/// [`SnapshotBuilder::build`] validates the result.
pub fn parse_layout(
    map: &str,
    timers: Option<&str>,
    default_timer: i32,
) -> Result<SnapshotBuilder, LayoutError> {
    let lines: Vec<&str> = map
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let first = lines.first().ok_or(LayoutError::EmptyLayout)?;
    let columns = count(first.chars().count());
    let rows = count(lines.len());

    let mut builder = WorldSnapshot::builder(columns, rows).default_timer(default_timer);
    let mut actor: Option<CellCoord> = None;

    for (row, line) in (0_u32..).zip(&lines) {
        let found = count(line.chars().count());
        if found != columns {
            return Err(LayoutError::RaggedRow {
                row,
                expected: columns,
                found,
            });
        }

        for (column, glyph) in (0_u32..).zip(line.chars()) {
            let cell = CellCoord::new(column, row);
            builder = match glyph {
                '.' => builder,
                '#' => builder.kind(cell, TileKind::Wall),
                '_' => builder.kind(cell, TileKind::Void),
                '>' => builder.kind(cell, TileKind::Stairs),
                '*' => builder.kind(cell, TileKind::Crystal),
                '+' => builder.kind(cell, TileKind::Cache),
                'P' => builder.pillar(cell),
                'A' => builder.anchor(cell),
                '@' => {
                    if actor.is_some() {
                        return Err(LayoutError::DuplicateActor { cell });
                    }
                    actor = Some(cell);
                    builder.actor(cell)
                }
                other => return Err(LayoutError::UnknownGlyph { glyph: other, cell }),
            };
        }
    }

    if actor.is_none() {
        return Err(LayoutError::MissingActor);
    }

    if let Some(timers) = timers {
        builder = apply_timers(builder, timers, columns, rows)?;
    }

    Ok(builder)
}

fn apply_timers(
    mut builder: SnapshotBuilder,
    timers: &str,
    columns: u32,
    rows: u32,
) -> Result<SnapshotBuilder, LayoutError> {
    let lines: Vec<&str> = timers
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    for (row, line) in (0_u32..).zip(&lines) {
        if row >= rows {
            return Err(LayoutError::TimerShape { row, columns });
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if count(tokens.len()) != columns {
            return Err(LayoutError::TimerShape { row, columns });
        }

        for (column, token) in (0_u32..).zip(tokens) {
            let timer: i32 = token.parse().map_err(|_| LayoutError::InvalidTimer {
                token: token.to_owned(),
            })?;
            builder = builder.timer(CellCoord::new(column, row), timer);
        }
    }

    if count(lines.len()) != rows {
        return Err(LayoutError::TimerShape {
            row: count(lines.len()),
            columns,
        });
    }

    Ok(builder)
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
