use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;

use cli::Cli;
use dronetap::config::TapConfig;
use dronetap::Tap;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match TapConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Some(interface) = cli.interface {
        config.interface = interface;
    }

    // CLI debug flag wins, then RUST_LOG, then the config's log_level
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match Tap::new(config).run().await {
        Ok(exit) => std::process::exit(exit.exit_code()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
