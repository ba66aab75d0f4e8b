//! `ping`: admin API reachability check

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use crate::cli::ConnectionArgs;

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn run(args: PingArgs) -> Result<i32> {
    let client = args.connection.client()?;
    let info = client
        .server_info()
        .await
        .with_context(|| format!("pinging {}", args.connection.addr))?;
    let version = info
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    println!("connected to {} (version {})", client.base_url(), version);
    Ok(0)
}
