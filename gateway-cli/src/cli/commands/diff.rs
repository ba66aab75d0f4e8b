//! `diff`: compare target state against the live gateway

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use crate::cli::{ConnectionArgs, FilterArgs};
use crate::diff;
use crate::output::json::ChangeReport;
use crate::output::{BASIC_AUTH_WARNING, Masker, human};
use crate::state::{GatewayState, dump, load};

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Target state file (YAML or JSON)
    #[arg(short = 's', long = "state", value_name = "FILE")]
    pub state: PathBuf,
    /// Emit a JSON change report instead of human-readable text
    #[arg(long)]
    pub json: bool,
    /// Exit with status 2 when changes are pending
    #[arg(long)]
    pub exit_code: bool,
    /// Show secret values instead of masking them
    #[arg(long)]
    pub no_mask_values: bool,
}

pub fn standing_warnings(target: &GatewayState) -> Vec<String> {
    if target.basic_auths.is_empty() {
        Vec::new()
    } else {
        vec![BASIC_AUTH_WARNING.to_string()]
    }
}

pub async fn run(args: DiffArgs) -> Result<i32> {
    let client = args.connection.client()?;
    let target = load::load_state(&args.state)
        .with_context(|| format!("loading target state from {}", args.state.display()))?;
    let current = dump::fetch_state(&client, &args.filters.dump_options())
        .await
        .context("fetching current state")?;
    info!(
        "diffing {} target entities against {} current entities",
        target.total(),
        current.total()
    );

    let (events, errors) = diff::plan(&current, &target);
    let masker = if args.no_mask_values {
        Masker::disabled()
    } else {
        Masker::from_env()
    };
    let warnings = standing_warnings(&target);

    if args.json {
        let report = ChangeReport::from_events(&events, &masker, warnings);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", human::render_plan(&events, &masker));
        for warning in &warnings {
            eprintln!("warning: {}", warning);
        }
    }
    for error in &errors {
        eprintln!("error: {}", error);
    }

    if !errors.is_empty() {
        return Ok(1);
    }
    if args.exit_code && !events.is_empty() {
        return Ok(2);
    }
    Ok(0)
}
