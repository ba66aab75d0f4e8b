//! `sync`: apply the target state to the gateway

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use dialoguer::Confirm;
use is_terminal::IsTerminal;
use log::warn;

use crate::cli::commands::diff::standing_warnings;
use crate::cli::{ConnectionArgs, FilterArgs};
use crate::crud::{self, ExecutionContext, Registry};
use crate::diff;
use crate::output::{Masker, human};
use crate::solver::{self, SyncOptions};
use crate::state::{dump, load};

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Target state file (YAML or JSON)
    #[arg(short = 's', long = "state", value_name = "FILE")]
    pub state: PathBuf,
    /// Maximum concurrent operations within a dependency level
    #[arg(long, default_value_t = 10)]
    pub parallelism: usize,
    /// Apply without asking for confirmation
    #[arg(long)]
    pub yes: bool,
    /// Simulate the run without touching the gateway
    #[arg(long)]
    pub dry_run: bool,
    /// Show secret values instead of masking them
    #[arg(long)]
    pub no_mask_values: bool,
}

pub async fn run(args: SyncArgs) -> Result<i32> {
    let client = args.connection.client()?;
    let target = load::load_state(&args.state)
        .with_context(|| format!("loading target state from {}", args.state.display()))?;
    let current = dump::fetch_state(&client, &args.filters.dump_options())
        .await
        .context("fetching current state")?;

    let masker = if args.no_mask_values {
        Masker::disabled()
    } else {
        Masker::from_env()
    };
    let (events, plan_errors) = diff::plan(&current, &target);
    print!("{}", human::render_plan(&events, &masker));
    for warning in standing_warnings(&target) {
        eprintln!("warning: {}", warning);
    }
    for error in &plan_errors {
        eprintln!("error: {}", error);
    }
    if events.is_empty() && plan_errors.is_empty() {
        return Ok(0);
    }

    if !args.yes && !args.dry_run {
        if !std::io::stdin().is_terminal() {
            bail!("refusing to apply without confirmation; pass --yes");
        }
        let proceed = Confirm::new()
            .with_prompt(format!("Apply {} change(s)?", events.len()))
            .default(false)
            .interact()?;
        if !proceed {
            println!("aborted");
            return Ok(0);
        }
    }

    let mut registry = Registry::new();
    let ctx = if args.dry_run {
        crud::dry::register_all(&mut registry)?;
        ExecutionContext::new(None, current)
    } else {
        crud::remote::register_all(&mut registry)?;
        ExecutionContext::new(Some(client), current)
    };

    let options = SyncOptions {
        parallelism: args.parallelism,
        ..Default::default()
    };
    let stop = options.stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight operations");
            stop.trigger();
        }
    });

    let outcome = solver::solve(&registry, &ctx, &target, &options, |record| {
        println!("{} {}", record.op, record.name);
    })
    .await?;
    print!("{}", human::render_summary(&outcome.stats));
    for error in &outcome.errors {
        eprintln!("error: {}", error);
    }
    if outcome.stopped {
        eprintln!("sync interrupted before completion");
    }

    if !outcome.errors.is_empty() || !plan_errors.is_empty() {
        return Ok(1);
    }
    Ok(0)
}
