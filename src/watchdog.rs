//! Pipeline watchdog
//!
//! Periodically checks frame flow and memory pressure. Both failure modes
//! end in a deliberate process exit with a distinguished code: the external
//! supervisor restarts the process and can tell the causes apart in its
//! logs. Recovery-by-exit beats in-process repair here because the
//! collector tolerates gaps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info};

use crate::health;
use crate::TapCounters;

/// Exit code for the no-frames-seen watchdog
pub const EXIT_STARVATION: i32 = 82;
/// Exit code for the memory-pressure watchdog
pub const EXIT_MEMORY_PRESSURE: i32 = 83;

/// Why the watchdog wants the process gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Starvation,
    MemoryPressure,
}

impl ExitReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::Starvation => EXIT_STARVATION,
            ExitReason::MemoryPressure => EXIT_MEMORY_PRESSURE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub starvation_timeout: Duration,
    pub memory_percent_threshold: f64,
    pub check_interval: Duration,
}

/// The decision state: tracks when the frame counter last advanced.
pub struct Watchdog {
    config: WatchdogConfig,
    last_frames: u64,
    last_advance: Instant,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            last_frames: 0,
            last_advance: Instant::now(),
        }
    }

    /// One tick of the watchdog. Returns the exit reason when a limit is
    /// crossed.
    pub fn check(&mut self, frames_total: u64, memory_percent: f64, now: Instant) -> Option<ExitReason> {
        if frames_total != self.last_frames {
            self.last_frames = frames_total;
            self.last_advance = now;
        } else if now.duration_since(self.last_advance) >= self.config.starvation_timeout {
            return Some(ExitReason::Starvation);
        }

        if memory_percent >= self.config.memory_percent_threshold {
            return Some(ExitReason::MemoryPressure);
        }

        None
    }
}

/// Watchdog task. Returns `Some(reason)` when the process must exit,
/// `None` on orderly shutdown.
pub async fn run(
    config: WatchdogConfig,
    counters: Arc<TapCounters>,
    mut shutdown: watch::Receiver<bool>,
) -> Option<ExitReason> {
    let mut watchdog = Watchdog::new(config.clone());
    let mut ticker = tokio::time::interval(config.check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frames = counters.frames_total();
                let memory_percent = health::sample().memory_percent;
                if let Some(reason) = watchdog.check(frames, memory_percent, Instant::now()) {
                    match reason {
                        ExitReason::Starvation => error!(
                            "no frames for {:?}, exiting for supervisor restart",
                            config.starvation_timeout
                        ),
                        ExitReason::MemoryPressure => error!(
                            "memory at {:.1}% (threshold {:.1}%), exiting for supervisor restart",
                            memory_percent, config.memory_percent_threshold
                        ),
                    }
                    return Some(reason);
                }
            }
            _ = shutdown.changed() => {
                info!("watchdog stopping");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            starvation_timeout: Duration::from_secs(30),
            memory_percent_threshold: 90.0,
            check_interval: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_starvation_trips_after_timeout() {
        let mut wd = Watchdog::new(config());
        let t0 = Instant::now();

        assert_eq!(wd.check(10, 50.0, t0), None);
        // Counter advances: no starvation
        assert_eq!(wd.check(20, 50.0, t0 + Duration::from_secs(29)), None);
        // Stuck but under the timeout
        assert_eq!(wd.check(20, 50.0, t0 + Duration::from_secs(58)), None);
        // Stuck past the timeout
        assert_eq!(
            wd.check(20, 50.0, t0 + Duration::from_secs(60)),
            Some(ExitReason::Starvation)
        );
    }

    #[test]
    fn test_memory_pressure_trips_at_threshold() {
        let mut wd = Watchdog::new(config());
        let t0 = Instant::now();
        assert_eq!(wd.check(1, 89.9, t0), None);
        assert_eq!(wd.check(2, 90.0, t0), Some(ExitReason::MemoryPressure));
        assert_eq!(wd.check(3, 95.0, t0), Some(ExitReason::MemoryPressure));
    }

    #[test]
    fn test_exit_codes_distinguished() {
        assert_ne!(EXIT_STARVATION, EXIT_MEMORY_PRESSURE);
        assert_ne!(EXIT_STARVATION, 0);
        assert_eq!(ExitReason::Starvation.exit_code(), EXIT_STARVATION);
        assert_eq!(ExitReason::MemoryPressure.exit_code(), EXIT_MEMORY_PRESSURE);
    }
}
