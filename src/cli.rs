use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "dronetap")]
#[command(author, version, about = "Passive WiFi Remote-ID drone detection sensor")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/dronetap/dronetap.toml")]
    pub config: PathBuf,

    /// Override the WiFi interface from the config (e.g. wlan1mon)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}
