//! dronetap: passive WiFi Remote-ID sensor
//!
//! A fixed set of cooperating tasks wired by channels:
//!
//! - capture reader: owns the dissector subprocess, feeds a bounded frame
//!   channel (blocking send: backpressure, never drop)
//! - processor: sole owner of the UAV state table; parser, correlator, and
//!   spoof detector run here with no internal suspension points
//! - channel hopper: timer-driven, sole owner of the NIC channel
//! - heartbeat: timer-driven telemetry
//! - watchdog: starvation and memory-pressure checks, recovery-by-exit
//! - publisher: owns the outbound queue and the ZMQ socket; overflow drops
//!   newest
//!
//! Cross-task state is limited to atomic counters; everything else is
//! message passing.

pub mod capture;
pub mod config;
pub mod detect;
pub mod health;
pub mod protocol;
pub mod remoteid;
pub mod transport;
pub mod watchdog;

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use capture::frame::FrameRecord;
use capture::hopper::{self, HopperConfig};
use capture::tshark::{self, TsharkConfig};
use config::TapConfig;
use detect::correlator::Correlator;
use detect::fingerprint::FingerprintMatcher;
use detect::parser::{FrameParser, ParseOutcome};
use protocol::TapHeartbeat;
use transport::{Publisher, PublisherConfig, PublisherHandle};
use watchdog::{ExitReason, WatchdogConfig};

/// Depth of the capture → processor channel
const FRAME_QUEUE_DEPTH: usize = 512;

/// Counters shared across tasks. Writers are the producing tasks; the
/// heartbeat and watchdog only read.
#[derive(Debug, Default)]
pub struct TapCounters {
    frames_total: AtomicU64,
    frames_parsed: AtomicU64,
    parse_errors: AtomicU64,
    capture_errors: AtomicU64,
    tshark_running: AtomicBool,
    current_channel: AtomicU16,
}

impl TapCounters {
    pub fn inc_frames_total(&self) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_parsed(&self) {
        self.frames_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_capture_errors(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_tshark_running(&self, running: bool) {
        self.tshark_running.store(running, Ordering::Relaxed);
    }

    pub fn set_current_channel(&self, channel: u16) {
        self.current_channel.store(channel, Ordering::Relaxed);
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    pub fn frames_parsed(&self) -> u64 {
        self.frames_parsed.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn capture_errors(&self) -> u64 {
        self.capture_errors.load(Ordering::Relaxed)
    }

    pub fn tshark_running(&self) -> bool {
        self.tshark_running.load(Ordering::Relaxed)
    }

    pub fn current_channel(&self) -> u16 {
        self.current_channel.load(Ordering::Relaxed)
    }
}

/// How the tap ended, mapped to the process exit code the supervisor sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapExit {
    Shutdown,
    Starvation,
    MemoryPressure,
}

impl TapExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            TapExit::Shutdown => 0,
            TapExit::Starvation => watchdog::EXIT_STARVATION,
            TapExit::MemoryPressure => watchdog::EXIT_MEMORY_PRESSURE,
        }
    }
}

impl From<ExitReason> for TapExit {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::Starvation => TapExit::Starvation,
            ExitReason::MemoryPressure => TapExit::MemoryPressure,
        }
    }
}

/// The assembled sensor.
pub struct Tap {
    config: TapConfig,
    tap_uuid: String,
}

impl Tap {
    pub fn new(mut config: TapConfig) -> Self {
        let tap_uuid = config.ensure_uuid(&TapConfig::default_uuid_paths());
        Self { config, tap_uuid }
    }

    /// Run until shutdown or a watchdog exit.
    pub async fn run(self) -> Result<TapExit> {
        let started = Instant::now();
        let counters = Arc::new(TapCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let channels = self.config.merged_channels();
        info!(
            "dronetap v{} starting: tap {} on {} -> {}:{}",
            env!("CARGO_PKG_VERSION"),
            self.tap_uuid,
            self.config.interface,
            self.config.node_host,
            self.config.node_port,
        );
        info!(
            "channels: {:?} (dwell {} ms)",
            channels, self.config.channel_dwell_ms
        );

        if let Some(&first) = channels.first() {
            counters.set_current_channel(first);
        }

        // Publisher
        let (publisher_handle, publisher) = Publisher::channel(PublisherConfig {
            host: self.config.node_host.clone(),
            port: self.config.node_port,
            buffer_size: self.config.zmq_buffer_size,
            hwm: self.config.zmq_hwm,
        });
        let publisher_task = tokio::spawn(async move {
            if let Err(e) = publisher.run().await {
                error!("publisher failed: {}", e);
            }
        });

        // Capture driver
        let (frame_tx, frame_rx) = mpsc::channel::<FrameRecord>(FRAME_QUEUE_DEPTH);
        let capture_task = tokio::spawn(tshark::run(
            TsharkConfig {
                tshark_path: self.config.tshark_path.clone(),
                interface: self.config.interface.clone(),
                restart_delay: Duration::from_secs(self.config.tshark_restart_delay_s),
            },
            frame_tx,
            Arc::clone(&counters),
            shutdown_rx.clone(),
        ));

        // Channel hopper: only when this process owns the interface setup
        let hopper_task = if self.config.auto_monitor {
            Some(tokio::spawn(hopper::run(
                HopperConfig {
                    interface: self.config.interface.clone(),
                    channels: channels.clone(),
                    dwell: Duration::from_millis(self.config.channel_dwell_ms),
                },
                Arc::clone(&counters),
                shutdown_rx.clone(),
            )))
        } else {
            info!("auto_monitor disabled, channel hopper idle");
            None
        };

        // Processor
        let fingerprints = Arc::new(FingerprintMatcher::new());
        let parser = FrameParser::new(Arc::clone(&fingerprints));
        let correlator = Correlator::new(
            self.tap_uuid.clone(),
            self.config.starvation_timeout_s,
            fingerprints,
        );
        let processor_task = tokio::spawn(run_processor(
            frame_rx,
            parser,
            correlator,
            publisher_handle.clone(),
            Arc::clone(&counters),
            Duration::from_secs(self.config.stale_cleanup_interval_s),
            shutdown_rx.clone(),
        ));

        // Heartbeat
        let heartbeat_task = tokio::spawn(run_heartbeat(
            HeartbeatContext {
                tap_uuid: self.tap_uuid.clone(),
                tap_name: self.config.tap_name.clone(),
                interface: self.config.interface.clone(),
                latitude: self.config.latitude,
                longitude: self.config.longitude,
                channels,
                interval: Duration::from_secs(self.config.heartbeat_interval_s),
                started,
            },
            publisher_handle.clone(),
            Arc::clone(&counters),
            shutdown_rx.clone(),
        ));
        drop(publisher_handle);

        // Watchdog
        let mut watchdog_task = tokio::spawn(watchdog::run(
            WatchdogConfig {
                starvation_timeout: Duration::from_secs(self.config.starvation_timeout_s),
                memory_percent_threshold: self.config.memory_percent_threshold,
                check_interval: Duration::from_secs(self.config.watchdog_check_interval_s),
            },
            Arc::clone(&counters),
            shutdown_rx,
        ));

        let mut watchdog_done = false;
        let exit = tokio::select! {
            signal = shutdown_signal() => {
                info!("{} received, shutting down", signal);
                TapExit::Shutdown
            }
            reason = &mut watchdog_task => {
                watchdog_done = true;
                match reason {
                    Ok(Some(reason)) => TapExit::from(reason),
                    _ => TapExit::Shutdown,
                }
            }
        };

        // Each task exits at its next suspension point; the processor
        // drains the frame channel, then the publisher flushes and stops.
        let _ = shutdown_tx.send(true);
        for (name, task) in [
            ("capture", Some(capture_task)),
            ("hopper", hopper_task),
            ("processor", Some(processor_task)),
            ("heartbeat", Some(heartbeat_task)),
        ]
        .into_iter()
        .filter_map(|(n, t)| t.map(|t| (n, t)))
        {
            if tokio::time::timeout(Duration::from_secs(8), task).await.is_err() {
                warn!("{} task did not stop in time", name);
            }
        }
        let _ = tokio::time::timeout(Duration::from_secs(8), publisher_task).await;
        if !watchdog_done {
            let _ = tokio::time::timeout(Duration::from_secs(2), watchdog_task).await;
        }

        info!(
            "stopped: {} frames, {} parsed, {} parse errors, {} capture errors",
            counters.frames_total(),
            counters.frames_parsed(),
            counters.parse_errors(),
            counters.capture_errors(),
        );
        Ok(exit)
    }
}

async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = term.recv() => "SIGTERM",
    }
}

/// Processor task: the single owner of the UAV table. Parser, correlator,
/// and spoof detector all run inline here, so per-MAC ordering is the
/// channel's FIFO ordering.
async fn run_processor(
    mut frame_rx: mpsc::Receiver<FrameRecord>,
    parser: FrameParser,
    mut correlator: Correlator,
    publisher: PublisherHandle,
    counters: Arc<TapCounters>,
    cleanup_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cleanup = tokio::time::interval(cleanup_interval);
    cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let handle_record =
        |record: FrameRecord, correlator: &mut Correlator, publisher: &PublisherHandle| {
            match parser.parse(&record) {
                ParseOutcome::Detection(event) => {
                    counters.inc_frames_parsed();
                    let report = correlator.apply(event);
                    publisher.publish_uav(report);
                }
                ParseOutcome::Malformed => counters.inc_parse_errors(),
                ParseOutcome::Ignored => {}
            }
        };

    loop {
        tokio::select! {
            maybe = frame_rx.recv() => {
                match maybe {
                    Some(record) => handle_record(record, &mut correlator, &publisher),
                    None => {
                        debug!("frame channel closed, processor stopping");
                        return;
                    }
                }
            }
            _ = cleanup.tick() => {
                let removed = correlator.evict_stale(Utc::now());
                if removed > 0 {
                    debug!("evicted {} stale tracks", removed);
                }
            }
            _ = shutdown.changed() => {
                // Best-effort drain, then let the publisher flush
                while let Ok(record) = frame_rx.try_recv() {
                    handle_record(record, &mut correlator, &publisher);
                }
                info!("processor stopping ({} tracks)", correlator.track_count());
                return;
            }
        }
    }
}

struct HeartbeatContext {
    tap_uuid: String,
    tap_name: String,
    interface: String,
    latitude: f64,
    longitude: f64,
    channels: Vec<u16>,
    interval: Duration,
    started: Instant,
}

/// Heartbeat task: samples host health and pipeline counters on a timer.
async fn run_heartbeat(
    ctx: HeartbeatContext,
    publisher: PublisherHandle,
    counters: Arc<TapCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The immediate first tick would heartbeat before anything has run
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                publisher.publish_heartbeat(build_heartbeat(&ctx, &counters));
            }
            _ = shutdown.changed() => {
                debug!("heartbeat stopping");
                return;
            }
        }
    }
}

fn build_heartbeat(ctx: &HeartbeatContext, counters: &TapCounters) -> TapHeartbeat {
    let host = health::sample();
    TapHeartbeat {
        kind: protocol::MSG_TAP_HEARTBEAT.to_string(),
        protocol_version: protocol::PROTOCOL_VERSION,
        tap_uuid: ctx.tap_uuid.clone(),
        tap_name: ctx.tap_name.clone(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        interface: ctx.interface.clone(),
        channel: counters.current_channel(),
        cpu_load: host.cpu_load,
        cpu_percent: host.cpu_percent,
        memory_used: host.memory_used,
        memory_percent: host.memory_percent,
        temperature: host.temperature,
        disk_free: host.disk_free,
        disk_writes_total: host.disk_writes_total,
        latitude: ctx.latitude,
        longitude: ctx.longitude,
        frames_total: counters.frames_total(),
        frames_parsed: counters.frames_parsed(),
        tshark_running: counters.tshark_running(),
        tap_uptime: (ctx.started.elapsed().as_secs_f64() * 10.0).round() / 10.0,
        channels: ctx.channels.clone(),
        capture_errors: counters.capture_errors(),
    }
}
