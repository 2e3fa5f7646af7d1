//! nlmon command - netlink dumps and multicast monitoring.

mod commands;
mod output;

use std::time::Duration;

use clap::{Parser, Subcommand};
use nlexchange::netlink::HandlerConfig;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "nlmon", version, about = "Netlink exchange tool")]
struct Cli {
    /// Output JSON, one object per frame.
    #[arg(short = 'j', long)]
    json: bool,

    /// Feedback timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump a routing table object.
    #[command(visible_alias = "d")]
    Dump(commands::dump::DumpCmd),

    /// Print multicast notifications.
    #[command(visible_alias = "m", visible_alias = "mon")]
    Monitor(commands::monitor::MonitorCmd),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let config = HandlerConfig::new().timeout(Duration::from_millis(cli.timeout_ms));

    let result = match cli.command {
        Command::Dump(cmd) => cmd.run(config, format).await,
        Command::Monitor(cmd) => cmd.run(config, format).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
