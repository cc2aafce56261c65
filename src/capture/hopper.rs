//! Channel hopper
//!
//! Sequences the monitor-mode NIC across the merged channel plan on a dwell
//! timer. The NIC channel is owned exclusively by this task; the heartbeat
//! reads the current channel from the shared atomic. With a single-channel
//! plan the interface is pinned once and the task goes idle.
//!
//! Channel switches go through raw nl80211 netlink when available (<1 ms,
//! no fork) and fall back to the `iw` subprocess (~50 ms) when netlink
//! init or an individual set fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::TapCounters;

use super::channels::channel_to_freq_any;
use super::netlink::{self, Nl80211Channel};

#[derive(Debug, Clone)]
pub struct HopperConfig {
    pub interface: String,
    /// Merged plan, 2.4 GHz first
    pub channels: Vec<u16>,
    pub dwell: Duration,
}

/// Merge per-band channel plans into one ordered hop sequence: 2.4 then 5
/// then 6 GHz, duplicates removed keeping the first occurrence.
pub fn merge_channel_plan(ch24: &[u16], ch5: &[u16], ch6: &[u16]) -> Vec<u16> {
    let mut merged: Vec<u16> = Vec::with_capacity(ch24.len() + ch5.len() + ch6.len());
    for &ch in ch24.iter().chain(ch5).chain(ch6) {
        if !merged.contains(&ch) {
            merged.push(ch);
        }
    }
    merged
}

/// Sets the NIC channel: nl80211 netlink primary, `iw` fallback.
struct ChannelSetter {
    interface: String,
    netlink: Option<Nl80211Channel>,
    ifindex: Option<u32>,
}

impl ChannelSetter {
    fn new(interface: &str) -> Self {
        let netlink = match Nl80211Channel::new() {
            Ok(nl) => Some(nl),
            Err(e) => {
                warn!("netlink init failed, using subprocess fallback: {}", e);
                None
            }
        };
        let ifindex = if netlink.is_some() {
            let idx = netlink::ifindex(interface);
            if idx.is_none() {
                warn!("no ifindex for {}, using subprocess fallback", interface);
            }
            idx
        } else {
            None
        };
        Self {
            interface: interface.to_string(),
            netlink,
            ifindex,
        }
    }

    async fn set_channel(&mut self, channel: u16) -> bool {
        if let (Some(nl), Some(idx)) = (self.netlink.as_mut(), self.ifindex) {
            if let Some(freq) = channel_to_freq_any(channel) {
                if nl.set_channel(idx, freq) {
                    debug!("set channel {} (netlink)", channel);
                    return true;
                }
                debug!(
                    "netlink set_channel failed for ch {} freq={}, falling back to iw",
                    channel, freq
                );
            } else {
                warn!("no frequency known for channel {}", channel);
            }
        }
        set_channel_iw(&self.interface, channel).await
    }
}

/// Hopper task. Exits at the next dwell boundary on shutdown.
pub async fn run(config: HopperConfig, counters: Arc<TapCounters>, mut shutdown: watch::Receiver<bool>) {
    if config.channels.is_empty() {
        debug!("no channel plan, hopper idle");
        return;
    }

    let mut setter = ChannelSetter::new(&config.interface);

    if config.channels.len() == 1 {
        let ch = config.channels[0];
        info!("single channel mode: pinning {} to channel {}", config.interface, ch);
        if setter.set_channel(ch).await {
            counters.set_current_channel(ch);
        }
        return;
    }

    info!(
        "channel hopper started: {:?} (dwell {:?})",
        config.channels, config.dwell
    );

    let mut index = 0usize;
    let mut ticker = tokio::time::interval(config.dwell);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ch = config.channels[index];
                index = (index + 1) % config.channels.len();
                if setter.set_channel(ch).await {
                    counters.set_current_channel(ch);
                }
            }
            _ = shutdown.changed() => {
                info!("channel hopper stopping");
                return;
            }
        }
    }
}

/// Subprocess fallback: `iw dev <iface> set channel <ch>`. Failures are
/// logged and skipped; the next dwell tick tries the next channel.
async fn set_channel_iw(interface: &str, channel: u16) -> bool {
    let result = Command::new("iw")
        .args(["dev", interface, "set", "channel"])
        .arg(channel.to_string())
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            debug!("set channel {} (iw)", channel);
            true
        }
        Ok(output) => {
            warn!(
                "iw set channel {} failed: {}",
                channel,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            warn!("failed to run iw: {}", e);
            false
        }
    }
}
