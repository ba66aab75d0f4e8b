//! Command-line interface

pub mod commands;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::api::{AdminClient, ConnectionConfig, RetryConfig};
use crate::state::dump::DumpOptions;

#[derive(Parser)]
#[command(
    name = "gateway-cli",
    version,
    about = "Declarative configuration sync for the gateway admin API"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the changes needed to move the gateway to the target state
    Diff(commands::diff::DiffArgs),
    /// Apply the target state to the gateway
    Sync(commands::sync::SyncArgs),
    /// Export the gateway's current configuration as a state file
    Dump(commands::dump::DumpArgs),
    /// Check connectivity to the admin API
    Ping(commands::ping::PingArgs),
}

/// Connection flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Admin API base URL
    #[arg(long, default_value = "http://localhost:8001", env = "GATEWAY_ADDR")]
    pub addr: String,
    /// Extra request header as `Name:Value`, repeatable
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
    /// Skip TLS certificate verification
    #[arg(long)]
    pub tls_skip_verify: bool,
}

impl ConnectionArgs {
    pub fn client(&self) -> Result<AdminClient> {
        let mut headers = Vec::new();
        for raw in &self.headers {
            let Some((name, value)) = raw.split_once(':') else {
                bail!("malformed header '{}', expected NAME:VALUE", raw);
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
        let connection = ConnectionConfig {
            base_url: self.addr.clone(),
            headers,
            timeout: Duration::from_secs(self.timeout),
            tls_skip_verify: self.tls_skip_verify,
        };
        AdminClient::new(&connection, RetryConfig::default())
            .context("building admin API client")
    }
}

/// Scope filters shared by diff, sync and dump.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Keep only entities carrying one of these tags, repeatable
    #[arg(long = "select-tag", value_name = "TAG")]
    pub select_tags: Vec<String>,
    /// Leave consumers and their credentials out of scope
    #[arg(long)]
    pub skip_consumers: bool,
    /// Manage only RBAC roles and endpoint permissions
    #[arg(long)]
    pub rbac_resources_only: bool,
}

impl FilterArgs {
    pub fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            select_tags: self.select_tags.clone(),
            skip_consumers: self.skip_consumers,
            rbac_resources_only: self.rbac_resources_only,
        }
    }
}

/// Dispatch a parsed command, returning the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Diff(args) => commands::diff::run(args).await,
        Command::Sync(args) => commands::sync::run(args).await,
        Command::Dump(args) => commands::dump::run(args).await,
        Command::Ping(args) => commands::ping::run(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_diff() {
        let cli = Cli::try_parse_from([
            "gateway-cli",
            "diff",
            "--state",
            "gateway.yaml",
            "--addr",
            "http://gw:8001",
            "--select-tag",
            "prod",
            "--exit-code",
        ])
        .unwrap();
        let Command::Diff(args) = cli.command else {
            panic!("expected diff");
        };
        assert_eq!(args.connection.addr, "http://gw:8001");
        assert_eq!(args.filters.select_tags, vec!["prod".to_string()]);
        assert!(args.exit_code);
    }

    #[test]
    fn test_malformed_header_rejected() {
        let args = ConnectionArgs {
            addr: "http://localhost:8001".to_string(),
            headers: vec!["not-a-header".to_string()],
            timeout: 60,
            tls_skip_verify: false,
        };
        assert!(args.client().is_err());
    }
}
