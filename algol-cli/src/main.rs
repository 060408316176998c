//! algol-sh - administrative shell for algol back-end components
//!
//! Evaluates one command against a console and prints the reply.

mod delegate;

use algol_client::{Client, ClientConfig};
use algol_protocol::{DEFAULT_INTERFACE, DEFAULT_PORT};
use clap::Parser;
use colored::Colorize;
use delegate::{GenericDelegate, RenderOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "algol-sh")]
#[command(about = "Administrative shell for algol back-end components")]
#[command(version)]
struct Cli {
    /// Client target to talk as (see --supported-targets)
    #[arg(default_value = "generic")]
    target: String,

    /// Address of the console host
    #[arg(short = 'H', long, env = "ALGOL_SH_HOST", default_value = DEFAULT_INTERFACE)]
    host: String,

    /// Port the console is listening on
    #[arg(short, long, env = "ALGOL_SH_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Do not display command response status
    #[arg(long)]
    no_status: bool,

    /// List the supported client targets and exit
    #[arg(long)]
    supported_targets: bool,

    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Command to evaluate, with its arguments (`key=value` or flags). Must come last.
    #[arg(short = 'e', long = "eval", num_args = 1.., allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if cli.supported_targets {
        let targets = delegate::supported();
        println!("Supported targets [{}]:", targets.len());
        for (i, target) in targets.iter().enumerate() {
            println!("  {}. {}", i + 1, target.target());
        }
        return Ok(());
    }

    let delegate = delegate::find(&cli.target).unwrap_or_else(|| {
        tracing::warn!("Unknown target '{}', using generic", cli.target);
        Box::new(GenericDelegate)
    });

    let tokens = if cli.command.is_empty() {
        vec!["help".to_string()]
    } else {
        cli.command.clone()
    };
    let feed = tokens.join(" ");

    let Some(msg) = delegate.on_feed(&feed, &tokens) else {
        eprintln!("algol-sh: {}", "invalid command".red());
        std::process::exit(1);
    };

    let config = ClientConfig::new(cli.host.as_str(), cli.port)
        .with_request_timeout(Duration::from_secs(cli.timeout));
    let client = Client::connect(config).await.map_err(|e| {
        eprintln!("algol-sh: {}: {}", "connection failed".red(), e);
        e
    })?;

    let reply = client.request(&msg).await.map_err(|e| {
        eprintln!("algol-sh: {}: {}", "error".red(), e);
        e
    })?;

    let options = RenderOptions {
        print_status: !cli.no_status,
        interactive: false,
    };
    println!("{}", delegate.on_response(&reply, &options));

    client.close();
    Ok(())
}
