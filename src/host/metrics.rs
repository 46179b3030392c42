//! Host Metrics Providers
//!
//! Samples memory, CPU, load and uptime for activity logging. The procfs
//! provider reads the Linux `/proc` filesystem; the null provider reports
//! zeroes on hosts without it.

use crate::domain::{MetricsBackend, MetricsProvider, SystemUsage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the procfs provider
#[derive(Debug, Clone)]
pub struct ProcfsConfig {
    /// Path to procfs (for testing)
    pub proc_path: PathBuf,
    /// Window between the two CPU counter reads
    pub cpu_sample_interval: Duration,
}

impl Default for ProcfsConfig {
    fn default() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
            cpu_sample_interval: Duration::from_secs(1),
        }
    }
}

// =============================================================================
// Procfs Provider
// =============================================================================

/// Reads usage from `/proc/meminfo`, `/proc/stat`, `/proc/loadavg` and
/// `/proc/uptime`
pub struct ProcfsMetrics {
    config: ProcfsConfig,
}

impl ProcfsMetrics {
    pub fn new(config: ProcfsConfig) -> Self {
        Self { config }
    }

    async fn read(&self, name: &str) -> Result<String> {
        let path = self.config.proc_path.join(name);
        fs::read_to_string(&path).await.map_err(|e| {
            Error::dependency("procfs", format!("{}: {}", path.display(), e))
        })
    }

    async fn cpu_usage_percent(&self) -> Result<f64> {
        let first = parse_cpu_times(&self.read("stat").await?)?;
        tokio::time::sleep(self.config.cpu_sample_interval).await;
        let second = parse_cpu_times(&self.read("stat").await?)?;
        Ok(cpu_percent_between(first, second))
    }
}

#[async_trait]
impl MetricsProvider for ProcfsMetrics {
    async fn sample(&self) -> Result<SystemUsage> {
        let (total_kb, available_kb) = parse_meminfo(&self.read("meminfo").await?)?;
        let load_avg_1m = parse_loadavg(&self.read("loadavg").await?)?;
        let uptime_secs = parse_uptime(&self.read("uptime").await?)?;
        let cpu_usage_percent = self.cpu_usage_percent().await?;

        let used_kb = total_kb.saturating_sub(available_kb);
        let memory_used_percent = if total_kb == 0 {
            0.0
        } else {
            used_kb as f64 * 100.0 / total_kb as f64
        };

        let usage = SystemUsage {
            memory_total_mb: total_kb / 1024,
            memory_used_mb: used_kb / 1024,
            memory_used_percent,
            cpu_usage_percent,
            load_avg_1m,
            uptime_secs,
        };
        debug!("Sampled system usage: {:?}", usage);
        Ok(usage)
    }

    fn backend(&self) -> MetricsBackend {
        MetricsBackend::Procfs
    }
}

// =============================================================================
// Null Provider
// =============================================================================

/// Provider for hosts without a supported metrics source
#[derive(Debug, Default)]
pub struct NullMetrics;

#[async_trait]
impl MetricsProvider for NullMetrics {
    async fn sample(&self) -> Result<SystemUsage> {
        Ok(SystemUsage::default())
    }

    fn backend(&self) -> MetricsBackend {
        MetricsBackend::None
    }
}

// =============================================================================
// Parsers
// =============================================================================

/// `(MemTotal, MemAvailable)` in KiB
fn parse_meminfo(content: &str) -> Result<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let value = parts.next().and_then(|v| v.parse::<u64>().ok());
        match key {
            Some("MemTotal:") => total = value,
            Some("MemAvailable:") => available = value,
            Some("MemFree:") => free = value,
            _ => {}
        }
    }

    let total = total.ok_or_else(|| Error::dependency("procfs", "meminfo missing MemTotal"))?;
    Ok((total, available.or(free).unwrap_or(0)))
}

fn parse_loadavg(content: &str) -> Result<f64> {
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| Error::dependency("procfs", "malformed loadavg"))
}

fn parse_uptime(content: &str) -> Result<u64> {
    content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|secs| secs as u64)
        .ok_or_else(|| Error::dependency("procfs", "malformed uptime"))
}

/// `(busy, total)` jiffies from the aggregate `cpu` line
fn parse_cpu_times(content: &str) -> Result<(u64, u64)> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| Error::dependency("procfs", "stat missing cpu line"))?;

    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return Err(Error::dependency("procfs", "malformed cpu line"));
    }

    let total: u64 = values.iter().sum();
    // idle + iowait
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Ok((total.saturating_sub(idle), total))
}

fn cpu_percent_between(first: (u64, u64), second: (u64, u64)) -> f64 {
    let busy = second.0.saturating_sub(first.0);
    let total = second.1.saturating_sub(first.1);
    if total == 0 {
        0.0
    } else {
        busy as f64 * 100.0 / total as f64
    }
}
