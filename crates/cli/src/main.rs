//! repocache command-line tool.
//!
//! Inspects and maintains the key registry and the SQLite cache that
//! repositories share. Configuration is read the same way the library reads
//! it (`REPOCACHE_*` environment, optional `REPOCACHE_CONFIG_FILE`).
//! Logs go to stderr; command output goes to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use repocache_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;

/// Inspect and maintain repository cache keys
#[derive(Parser, Debug)]
#[command(name = "repocache")]
#[command(version)]
#[command(about = "Inspect and maintain repository cache keys")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List the cache keys registered for a repository
    Keys { repository: String },
    /// List every repository with registered keys
    Groups,
    /// Evict every registered key of a repository
    Forget { repository: String },
    /// Delete expired rows from the SQLite cache
    PurgeExpired,
    /// Print the effective configuration as JSON
    Config,
}

fn init_logging(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let config = AppConfig::load()?;
    tracing::debug!(backend = ?config.cache.backend, registry = %config.registry.path().display(), "loaded configuration");

    let output = commands::run(&cli.command, &config).await?;
    if !output.is_empty() {
        println!("{output}");
    }

    Ok(())
}
