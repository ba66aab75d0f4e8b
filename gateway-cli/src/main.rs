mod api;
mod cli;
mod crud;
mod diff;
mod output;
mod solver;
mod state;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = cli::Cli::parse();
    let code = cli::run(cli).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
