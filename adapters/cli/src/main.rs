#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays level files with the sinkhole planner.

mod level;

use std::{num::NonZeroUsize, path::PathBuf, thread};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sinkhole_core::PolicyKind;
use sinkhole_system_oracle::{
    run_to_completion, Oracle, PlannerError, RunLimits, RunRequest, RunSummary,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::level::{render, BudgetOverrides, LevelFile};

#[derive(Debug, Parser)]
#[command(
    name = "sinkhole",
    version,
    about = "Plans a way across collapsing floors",
    long_about = None
)]
struct Cli {
    /// Emit logs and summaries as JSON lines
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play one level and print every turn
    Run {
        /// Level file to play
        level: PathBuf,
        /// Strategy driving the actor: oracle, tactical or greedy
        #[arg(long, default_value_t = PolicyKind::Oracle)]
        policy: PolicyKind,
        #[command(flatten)]
        budgets: BudgetArgs,
        /// Print only the summary
        #[arg(short, long)]
        quiet: bool,
    },
    /// Play many levels in parallel and print one summary per run
    Batch {
        /// Level files to play
        #[arg(required = true)]
        levels: Vec<PathBuf>,
        /// Strategies to compare (defaults to all of them)
        #[arg(long = "policy")]
        policies: Vec<PolicyKind>,
        #[command(flatten)]
        budgets: BudgetArgs,
        /// Worker threads (defaults to the available parallelism)
        #[arg(short, long)]
        jobs: Option<NonZeroUsize>,
    },
}

#[derive(Clone, Copy, Debug, Args)]
struct BudgetArgs {
    /// Real turns a run may take, overriding the level file
    #[arg(long)]
    move_budget: Option<u32>,
    /// Stabilizers a run may spend, overriding the level file
    #[arg(long)]
    resource_budget: Option<u32>,
}

impl From<BudgetArgs> for BudgetOverrides {
    fn from(args: BudgetArgs) -> Self {
        Self {
            move_budget: args.move_budget,
            resource_budget: args.resource_budget,
        }
    }
}

/// Summary line printed per finished run.
#[derive(Debug, Serialize)]
struct RunLine<'a> {
    level: &'a str,
    policy: PolicyKind,
    #[serde(flatten)]
    summary: RunSummary,
}

/// Entry point for the sinkhole command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Run {
            level,
            policy,
            budgets,
            quiet,
        } => {
            let file = LevelFile::load(&level)?;
            let request = file.request(policy, budgets.into())?;
            let summary = play(request, quiet || cli.json)?;
            print_line(
                &RunLine {
                    level: file.name(),
                    policy,
                    summary,
                },
                cli.json,
            )
        }
        Command::Batch {
            levels,
            policies,
            budgets,
            jobs,
        } => batch(&levels, &policies, budgets.into(), jobs, cli.json),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Plays a single level turn by turn, drawing the board after every turn.
fn play(request: RunRequest, quiet: bool) -> Result<RunSummary> {
    let limits = RunLimits {
        move_budget: request.move_budget,
        resource_budget: request.resource_budget,
    };
    let mut oracle = Oracle::new(
        request.level,
        request.target,
        request.policy,
        limits,
        request.config,
    )?;

    if !quiet {
        println!("turn 0\n{}\n", render(oracle.world()));
    }

    loop {
        let record = oracle.advance()?;
        if !quiet {
            if let Some(intent) = record.intent {
                println!(
                    "turn {} {:?} (stabilizers {})\n{}\n",
                    record.turn,
                    intent,
                    record.snapshot.stabilizers(),
                    render(&record.snapshot)
                );
            }
        }
        if record.terminal.is_some() {
            return oracle.summary().context("finished run has no summary");
        }
    }
}

fn batch(
    levels: &[PathBuf],
    policies: &[PolicyKind],
    overrides: BudgetOverrides,
    jobs: Option<NonZeroUsize>,
    json: bool,
) -> Result<()> {
    let policies = if policies.is_empty() {
        PolicyKind::ALL.as_slice()
    } else {
        policies
    };

    let mut runs = Vec::with_capacity(levels.len() * policies.len());
    for path in levels {
        let file = LevelFile::load(path)?;
        for &policy in policies {
            runs.push((file.name().to_owned(), policy, file.request(policy, overrides)?));
        }
    }

    let workers = jobs
        .or_else(|| thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get);
    let chunk = runs.len().div_ceil(workers).max(1);
    info!(runs = runs.len(), workers, "batch started");

    let outcomes: Vec<(String, PolicyKind, Result<RunSummary, PlannerError>)> =
        thread::scope(|scope| {
            let handles: Vec<_> = runs
                .chunks(chunk)
                .map(|slice| {
                    scope.spawn(move || {
                        slice
                            .iter()
                            .map(|(name, policy, request)| {
                                (name.clone(), *policy, run_to_completion(request.clone()))
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

    if outcomes.len() != runs.len() {
        bail!("{} runs were lost to a panicking worker", runs.len() - outcomes.len());
    }

    let mut failures = 0_usize;
    let mut wins = 0_usize;
    for (name, policy, result) in &outcomes {
        match result {
            Ok(summary) => {
                if summary.outcome.is_win() {
                    wins += 1;
                }
                print_line(
                    &RunLine {
                        level: name,
                        policy: *policy,
                        summary: *summary,
                    },
                    json,
                )?;
            }
            Err(err) => {
                failures += 1;
                error!(level = %name, %policy, error = %err, "run aborted");
            }
        }
    }
    info!(runs = outcomes.len(), wins, failures, "batch finished");

    if failures > 0 {
        bail!("{failures} of {} runs aborted", outcomes.len());
    }
    Ok(())
}

fn print_line(line: &RunLine<'_>, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(line).context("failed to encode run summary")?
        );
        return Ok(());
    }

    let summary = &line.summary;
    let margin = summary
        .tightest_margin
        .map_or_else(|| "-".to_owned(), |margin| margin.to_string());
    println!(
        "{:<16} {:<8} {:<30} moves {:>4}  stabilizers {:>3}  margin {:>4}  replans {:>3}  divergences {:>2}  {:016x}",
        line.level,
        line.policy.name(),
        summary.outcome.to_string(),
        summary.moves_taken,
        summary.resources_used,
        margin,
        summary.replans,
        summary.divergences,
        summary.final_fingerprint,
    );
    Ok(())
}
