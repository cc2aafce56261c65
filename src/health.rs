//! Host health sampling for heartbeats
//!
//! Reads load, memory, temperature, disk free space, and cumulative disk
//! writes straight from procfs/sysfs. Everything degrades to null rather
//! than failing: a tap without a thermal sensor still heartbeats.

use std::ffi::CString;
use std::fs;

/// One snapshot of host health.
#[derive(Debug, Clone, Default)]
pub struct SystemHealth {
    /// 1-minute load average
    pub cpu_load: f64,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f64,
    /// Degrees Celsius, when a thermal zone exists
    pub temperature: Option<f64>,
    pub disk_free: Option<u64>,
    /// Cumulative bytes written to whole block devices, SD-wear proxy
    pub disk_writes_total: Option<u64>,
}

/// Sample current host health. Never fails; unavailable metrics are zero
/// or null.
pub fn sample() -> SystemHealth {
    let mut health = SystemHealth::default();

    if let Some(load) = fs::read_to_string("/proc/loadavg")
        .ok()
        .as_deref()
        .and_then(parse_loadavg)
    {
        health.cpu_load = load;
        let ncpu = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        health.cpu_percent = ((load / ncpu as f64 * 100.0).min(100.0) * 10.0).round() / 10.0;
    }

    if let Some((total, available)) = fs::read_to_string("/proc/meminfo")
        .ok()
        .as_deref()
        .and_then(parse_meminfo)
    {
        health.memory_total = total;
        health.memory_used = total.saturating_sub(available);
        if total > 0 {
            health.memory_percent =
                (health.memory_used as f64 / total as f64 * 1000.0).round() / 10.0;
        }
    }

    health.temperature = fs::read_to_string("/sys/class/thermal/thermal_zone0/temp")
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|millideg| millideg as f64 / 1000.0);

    health.disk_free = statvfs_free("/");

    health.disk_writes_total = fs::read_to_string("/proc/diskstats")
        .ok()
        .as_deref()
        .and_then(parse_diskstats);

    health
}

/// First field of /proc/loadavg.
fn parse_loadavg(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

/// (MemTotal, MemAvailable) from /proc/meminfo, in bytes.
fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb(rest);
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }
    Some((total?, available?))
}

fn parse_kb(rest: &str) -> Option<u64> {
    rest.split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()
        .map(|kb| kb * 1024)
}

/// Sum sectors written (field 10) over whole block devices in
/// /proc/diskstats: `mmcblk*` without a partition suffix, or bare `sdX`.
/// Sectors are 512 bytes regardless of the device's logical block size.
fn parse_diskstats(content: &str) -> Option<u64> {
    let mut total_sectors: u64 = 0;
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let dev = parts[2];
        let whole_mmc = dev.starts_with("mmcblk") && !dev.contains('p');
        let whole_sd = dev.starts_with("sd")
            && dev.len() >= 3
            && dev.chars().last().is_some_and(|c| c.is_ascii_alphabetic());
        if whole_mmc || whole_sd {
            total_sectors += parts[9].parse::<u64>().unwrap_or(0);
        }
    }
    (total_sectors > 0).then_some(total_sectors * 512)
}

/// Free bytes on the filesystem holding `path`.
fn statvfs_free(path: &str) -> Option<u64> {
    let c_path = CString::new(path).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    (rc == 0).then(|| stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 12345\n"), Some(0.52));
        assert_eq!(parse_loadavg(""), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:        3884912 kB\n\
                       MemFree:          123456 kB\n\
                       MemAvailable:    2000000 kB\n";
        let (total, available) = parse_meminfo(content).unwrap();
        assert_eq!(total, 3_884_912 * 1024);
        assert_eq!(available, 2_000_000 * 1024);
        assert!(parse_meminfo("MemTotal: 100 kB\n").is_none());
    }

    #[test]
    fn test_parse_diskstats() {
        let content = "\
 179       0 mmcblk0 10846 4713 866314 7385 6453 8554 2242766 29338 0 12528 36723\n\
 179       1 mmcblk0p1 331 590 10922 243 2 0 2 5 0 125 249\n\
   8       0 sda 500 0 4000 100 250 0 80000 50 0 100 150\n\
   8       1 sda1 100 0 800 20 50 0 1000 10 0 20 30\n";
        // mmcblk0: 2242766 sectors + sda: 80000 sectors; partitions skipped
        assert_eq!(
            parse_diskstats(content),
            Some((2_242_766 + 80_000) * 512)
        );
        assert_eq!(parse_diskstats(""), None);
    }

    #[test]
    fn test_sample_never_panics() {
        let health = sample();
        assert!(health.memory_percent >= 0.0 && health.memory_percent <= 100.0);
    }
}
