//! `dump`: export the gateway's configuration as a state file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use crate::cli::{ConnectionArgs, FilterArgs};
use crate::state::dump::fetch_state;
use crate::state::load::StateFile;

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output file; `-` writes to stdout
    #[arg(short = 'o', long = "output", default_value = "-", value_name = "FILE")]
    pub output: PathBuf,
}

pub async fn run(args: DumpArgs) -> Result<i32> {
    let client = args.connection.client()?;
    let state = fetch_state(&client, &args.filters.dump_options())
        .await
        .context("fetching current state")?;
    info!("dumped {} entities", state.total());

    let file = StateFile::from_state(&state);
    let yaml = serde_yaml::to_string(&file).context("serializing state file")?;
    if args.output.as_os_str() == "-" {
        print!("{}", yaml);
    } else {
        std::fs::write(&args.output, yaml)
            .with_context(|| format!("writing {}", args.output.display()))?;
        println!("wrote {}", args.output.display());
    }
    Ok(0)
}
