//! framelink demo host — entry point.
//!
//! ```text
//! framelink-node                     Run send + receive over loopback
//! framelink-node --mode send        Send the test pattern only
//! framelink-node --mode recv       Receive only
//! framelink-node --config <path>    Load a custom config TOML
//! framelink-node --gen-config       Print default config to stdout
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use framelink_node::config::NodeConfig;
use framelink_node::host::{Host, Mode};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framelink-node", about = "framelink loopback demo host")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framelink-node.toml")]
    config: PathBuf,

    /// Which pipelines to run.
    #[arg(long, value_enum, default_value = "both")]
    mode: Mode,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 5)]
    duration: u64,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&NodeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = NodeConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framelink-node v{}", env!("CARGO_PKG_VERSION"));
    info!("source: {}", config.link.source_name);
    info!(
        "pattern: {}x{} @ {} fps",
        config.pattern.width, config.pattern.height, config.link.framerate
    );

    let mut host = Host::new(config, cli.mode)?;
    host.run(Duration::from_secs(cli.duration));

    Ok(())
}
