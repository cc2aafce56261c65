//! Dissector subprocess driver
//!
//! Owns the tshark child process: spawns it with a kernel-side BPF capture
//! filter, reads EK NDJSON from stdout line by line, and respawns it on any
//! exit. Backpressure is the frame channel: when the processor lags, the
//! reader blocks and the dissector's own pipe buffering provides flow
//! control. Frames are never dropped here.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::TapCounters;

use super::frame::FrameRecord;

/// Kernel BPF filter: only management frames reach userspace. This is the
/// dominant performance win; data and control frames never cross the pipe.
pub const CAPTURE_FILTER: &str = "type mgt";

#[derive(Debug, Clone)]
pub struct TsharkConfig {
    pub tshark_path: String,
    pub interface: String,
    pub restart_delay: Duration,
}

impl TsharkConfig {
    /// Build the dissector argv.
    ///
    /// Filtering is capture-time only. A display filter (`-Y`) would discard
    /// management frames the parser still wants to see, so this builder has
    /// no input that could produce one.
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "-i".into(),
            self.interface.clone(),
            "-T".into(),
            "ek".into(),
            "-n".into(),
            "-l".into(),
            "-f".into(),
            CAPTURE_FILTER.into(),
        ]
    }
}

/// Capture task: spawn, read, respawn until shutdown.
pub async fn run(
    config: TsharkConfig,
    frame_tx: mpsc::Sender<FrameRecord>,
    counters: Arc<TapCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let mut child = match Command::new(&config.tshark_path)
            .args(config.build_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!("failed to spawn {}: {}", config.tshark_path, e);
                counters.inc_capture_errors();
                if wait_or_shutdown(config.restart_delay, &mut shutdown).await {
                    return;
                }
                continue;
            }
        };

        info!("dissector started, pid={:?}", child.id());
        counters.set_tshark_running(true);

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        let stdout = match child.stdout.take() {
            Some(out) => out,
            None => {
                warn!("dissector has no stdout pipe");
                counters.set_tshark_running(false);
                let _ = child.kill().await;
                counters.inc_capture_errors();
                if wait_or_shutdown(config.restart_delay, &mut shutdown).await {
                    return;
                }
                continue;
            }
        };

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            counters.inc_frames_total();
                            if let Some(record) = FrameRecord::from_ek_line(&line) {
                                // Blocking send is deliberate: backpressure,
                                // never drop at this stage
                                if frame_tx.send(record).await.is_err() {
                                    debug!("frame channel closed");
                                    break;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!("dissector stdout read error: {}", e);
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    stop_child(&mut child).await;
                    counters.set_tshark_running(false);
                    return;
                }
            }
        }

        counters.set_tshark_running(false);
        let status = child.wait().await;

        if *shutdown.borrow() {
            // Clean shutdown: the exit is expected and not counted
            return;
        }

        counters.inc_capture_errors();
        match status {
            Ok(status) => warn!(
                "dissector exited ({}), restarting in {:?}",
                status, config.restart_delay
            ),
            Err(e) => warn!(
                "dissector wait failed: {}, restarting in {:?}",
                e, config.restart_delay
            ),
        }

        if wait_or_shutdown(config.restart_delay, &mut shutdown).await {
            return;
        }
    }
}

/// Sleep for the restart backoff; returns true when shutdown arrived first.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}

/// SIGINT first so tshark flushes its capture cleanly, then SIGKILL if it
/// ignores us.
async fn stop_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        info!("stopping dissector pid={}", pid);
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
        if tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .is_ok()
        {
            return;
        }
        warn!("dissector ignored SIGINT, killing");
    }
    let _ = child.kill().await;
}

/// tshark writes useful progress to stderr; keep it out of the frame path
/// but in the logs.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line.contains("Capturing on") || line.contains("packets captured") {
            info!("tshark: {}", line);
        } else {
            debug!("tshark: {}", line);
        }
    }
}
