//! Tap configuration
//!
//! A single TOML document with fail-fast loading: unknown keys and a
//! missing `node_host` are startup errors, while out-of-range values are
//! reset to defaults with a warning. The legacy flat `channels` key is
//! migrated into the per-band plans. The tap UUID survives config
//! overwrites through a dedicated fallback file written atomically with
//! mode 0600.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capture::channels::{classify_channel, Band};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapConfig {
    /// Persistent tap identity; generated and persisted when absent
    #[serde(default)]
    pub tap_uuid: Option<String>,

    /// Human label carried on heartbeats
    #[serde(default = "default_tap_name")]
    pub tap_name: String,

    /// Collector endpoint. Required: a tap with nowhere to report is a
    /// configuration mistake, not a default.
    pub node_host: String,

    #[serde(default = "default_node_port")]
    pub node_port: u16,

    /// WiFi NIC name
    #[serde(default = "default_interface")]
    pub interface: String,

    /// When false the interface is assumed pre-configured for monitor mode
    /// and the hopper stays idle
    #[serde(default = "default_true")]
    pub auto_monitor: bool,

    /// Legacy flat channel list, migrated into the per-band plans
    #[serde(default)]
    pub channels: Option<Vec<u16>>,

    #[serde(default)]
    pub channels_24ghz: Option<Vec<u16>>,

    #[serde(default)]
    pub channels_5ghz: Option<Vec<u16>>,

    #[serde(default)]
    pub channels_6ghz: Option<Vec<u16>>,

    #[serde(default = "default_channel_dwell_ms")]
    pub channel_dwell_ms: u64,

    #[serde(default = "default_tshark_path")]
    pub tshark_path: String,

    /// Static tap position carried on heartbeats
    #[serde(default)]
    pub latitude: f64,

    #[serde(default)]
    pub longitude: f64,

    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_zmq_buffer_size")]
    pub zmq_buffer_size: usize,

    #[serde(default = "default_zmq_hwm")]
    pub zmq_hwm: i32,

    #[serde(default = "default_starvation_timeout_s")]
    pub starvation_timeout_s: u64,

    #[serde(default = "default_tshark_restart_delay_s")]
    pub tshark_restart_delay_s: u64,

    #[serde(default = "default_stale_cleanup_interval_s")]
    pub stale_cleanup_interval_s: u64,

    #[serde(default = "default_watchdog_check_interval_s")]
    pub watchdog_check_interval_s: u64,

    #[serde(default = "default_memory_percent_threshold")]
    pub memory_percent_threshold: f64,
}

impl TapConfig {
    /// Load and validate a configuration file. Parse failures, unknown
    /// keys, and a missing `node_host` are fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;

        let mut config: TapConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.as_ref().display()))?;

        config.validate();
        Ok(config)
    }

    /// Normalize values: migrate the legacy channel key, drop invalid
    /// channels, and reset nonsense timings to defaults.
    fn validate(&mut self) {
        if self.node_port == 0 {
            warn!("invalid node_port 0, using {}", default_node_port());
            self.node_port = default_node_port();
        }

        self.migrate_legacy_channels();

        for (key, band) in [
            ("channels_24ghz", Band::Band2_4GHz),
            ("channels_5ghz", Band::Band5GHz),
            ("channels_6ghz", Band::Band6GHz),
        ] {
            if let Some(channels) = self.band_mut(band) {
                let invalid: Vec<u16> = channels
                    .iter()
                    .copied()
                    .filter(|c| !band.contains(*c))
                    .collect();
                if !invalid.is_empty() {
                    warn!("invalid {} channels removed: {:?}", key, invalid);
                    channels.retain(|c| band.contains(*c));
                }
            }
        }

        // Default plan only when nothing was configured at all
        if self.channels_24ghz.is_none()
            && self.channels_5ghz.is_none()
            && self.channels_6ghz.is_none()
        {
            self.channels_24ghz = Some(default_channels_24ghz());
        }

        if self.merged_channels().is_empty() {
            warn!("no valid channels configured, defaulting to 2.4 GHz channel 6");
            self.channels_24ghz = Some(vec![6]);
        }

        for (name, value, default) in [
            (
                "channel_dwell_ms",
                &mut self.channel_dwell_ms,
                default_channel_dwell_ms(),
            ),
            (
                "heartbeat_interval_s",
                &mut self.heartbeat_interval_s,
                default_heartbeat_interval_s(),
            ),
            (
                "starvation_timeout_s",
                &mut self.starvation_timeout_s,
                default_starvation_timeout_s(),
            ),
            (
                "tshark_restart_delay_s",
                &mut self.tshark_restart_delay_s,
                default_tshark_restart_delay_s(),
            ),
            (
                "stale_cleanup_interval_s",
                &mut self.stale_cleanup_interval_s,
                default_stale_cleanup_interval_s(),
            ),
            (
                "watchdog_check_interval_s",
                &mut self.watchdog_check_interval_s,
                default_watchdog_check_interval_s(),
            ),
        ] {
            if *value == 0 {
                warn!("invalid {}=0, using {}", name, default);
                *value = default;
            }
        }
    }

    /// Migrate the legacy flat `channels` key. Explicit band keys win; a
    /// legacy-only config is classified per channel number.
    fn migrate_legacy_channels(&mut self) {
        let Some(legacy) = self.channels.take() else {
            return;
        };

        let has_band_keys = self.channels_24ghz.is_some()
            || self.channels_5ghz.is_some()
            || self.channels_6ghz.is_some();
        if has_band_keys {
            info!("both legacy 'channels' and band keys present, using band keys");
            return;
        }

        info!("migrating legacy channels={:?} to per-band plans", legacy);
        let mut ch24 = Vec::new();
        let mut ch5 = Vec::new();
        for ch in legacy {
            match classify_channel(ch) {
                Some(Band::Band2_4GHz) => ch24.push(ch),
                Some(Band::Band5GHz) => ch5.push(ch),
                _ => warn!(
                    "legacy channel {} cannot be classified to a band, dropping",
                    ch
                ),
            }
        }
        self.channels_24ghz = Some(ch24);
        self.channels_5ghz = Some(ch5);
        self.channels_6ghz = Some(Vec::new());
    }

    fn band_mut(&mut self, band: Band) -> &mut Option<Vec<u16>> {
        match band {
            Band::Band2_4GHz => &mut self.channels_24ghz,
            Band::Band5GHz => &mut self.channels_5ghz,
            Band::Band6GHz => &mut self.channels_6ghz,
        }
    }

    fn band_channels(&self, band: Band) -> &[u16] {
        let list = match band {
            Band::Band2_4GHz => &self.channels_24ghz,
            Band::Band5GHz => &self.channels_5ghz,
            Band::Band6GHz => &self.channels_6ghz,
        };
        list.as_deref().unwrap_or(&[])
    }

    /// Merged hop sequence: 2.4 then 5 then 6 GHz, deduplicated.
    pub fn merged_channels(&self) -> Vec<u16> {
        crate::capture::hopper::merge_channel_plan(
            self.band_channels(Band::Band2_4GHz),
            self.band_channels(Band::Band5GHz),
            self.band_channels(Band::Band6GHz),
        )
    }

    /// Resolve the tap UUID: config value, then the fallback file, then a
    /// freshly generated one. The result is persisted to the first writable
    /// fallback location so it survives reinstalls.
    pub fn ensure_uuid(&mut self, fallback_paths: &[PathBuf]) -> String {
        if let Some(uuid) = self.tap_uuid.clone().filter(|u| !u.is_empty()) {
            persist_uuid(&uuid, fallback_paths);
            return uuid;
        }

        for path in fallback_paths {
            if let Ok(content) = std::fs::read_to_string(path) {
                let stored = content.trim().to_string();
                if !stored.is_empty() {
                    info!("loaded tap UUID from {}", path.display());
                    self.tap_uuid = Some(stored.clone());
                    return stored;
                }
            }
        }

        let generated = Uuid::new_v4().to_string();
        info!("generated new tap UUID: {}", generated);
        persist_uuid(&generated, fallback_paths);
        self.tap_uuid = Some(generated.clone());
        generated
    }

    /// Default fallback file locations, checked in order.
    pub fn default_uuid_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/var/lib/dronetap/tap_uuid")];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(PathBuf::from(home).join(".dronetap_uuid"));
        }
        paths
    }
}

/// Write the UUID to the first fallback location that accepts it.
fn persist_uuid(uuid: &str, fallback_paths: &[PathBuf]) {
    for path in fallback_paths {
        match atomic_write(path, &format!("{}\n", uuid)) {
            Ok(()) => {
                info!("persisted tap UUID to {}", path.display());
                return;
            }
            Err(e) => {
                warn!("could not persist UUID to {}: {}", path.display(), e);
            }
        }
    }
    warn!("could not persist tap UUID to any fallback location");
}

/// Atomic write with mode 0600: temp file in the same directory, fsync,
/// rename. A power loss leaves either the old or the new content, never a
/// partial file.
fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    match std::fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn default_tap_name() -> String {
    "dronetap".to_string()
}

fn default_node_port() -> u16 {
    5590
}

fn default_interface() -> String {
    "wlan1".to_string()
}

fn default_channels_24ghz() -> Vec<u16> {
    vec![1, 6, 11]
}

fn default_channel_dwell_ms() -> u64 {
    350
}

fn default_tshark_path() -> String {
    "/usr/bin/tshark".to_string()
}

fn default_heartbeat_interval_s() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_zmq_buffer_size() -> usize {
    1000
}

fn default_zmq_hwm() -> i32 {
    1000
}

fn default_starvation_timeout_s() -> u64 {
    30
}

fn default_tshark_restart_delay_s() -> u64 {
    1
}

fn default_stale_cleanup_interval_s() -> u64 {
    60
}

fn default_watchdog_check_interval_s() -> u64 {
    2
}

fn default_memory_percent_threshold() -> f64 {
    90.0
}

fn default_true() -> bool {
    true
}
