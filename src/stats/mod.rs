//! Container resource usage samples as reported by the runtime's stats endpoint, and the
//! metrics derived from them.
//!
//! Every record the runtime streams carries both the current CPU counters (`cpu_stats`) and
//! the ones from the immediately preceding read (`precpu_stats`), so a single
//! [`ContainerStats`] is enough to compute a utilization delta without keeping history.
//!
//! # Main types
//!
//! - [`ContainerStats`]: one decoded sample.
//! - [`Metric`]: the utilization figures pushed to a sink, computed by [`calc`].
//!
//! Runtimes omit fields depending on the platform (no `percpu_usage` on cgroup v2, no
//! `networks` for host-networked containers, no `system_cpu_usage` in the very first
//! `precpu_stats`), so every field decodes to its zero value when absent.

pub mod calc;
mod metric;

pub use metric::Metric;

use std::collections::HashMap;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};

/// Aggregate and per-core CPU time consumed by the container, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct CpuUsage {
    #[serde(rename = "total_usage")]
    pub total: u64,
    #[serde(rename = "percpu_usage", deserialize_with = "null_as_default")]
    pub per_cpu: Vec<u64>,
}

/// One set of CPU counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct CpuStats {
    #[serde(rename = "cpu_usage")]
    pub usage: CpuUsage,
    /// Host CPU time across all cores, in nanoseconds.
    #[serde(rename = "system_cpu_usage")]
    pub system: u64,
    pub online_cpus: u32,
}

impl CpuStats {
    /// Number of CPUs available to the container.
    ///
    /// Falls back to the number of per-core counters when the runtime does not report
    /// `online_cpus`, and to one when neither is known.
    pub fn online_cpus(&self) -> u32 {
        if self.online_cpus > 0 {
            return self.online_cpus;
        }
        u32::try_from(self.usage.per_cpu.len())
            .unwrap_or(u32::MAX)
            .max(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: u64,
    pub limit: u64,
}

/// Counters of a single network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct InterfaceStats {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

impl AddAssign for InterfaceStats {
    fn add_assign(&mut self, rhs: Self) {
        self.rx_bytes = self.rx_bytes.saturating_add(rhs.rx_bytes);
        self.rx_packets = self.rx_packets.saturating_add(rhs.rx_packets);
        self.rx_errors = self.rx_errors.saturating_add(rhs.rx_errors);
        self.rx_dropped = self.rx_dropped.saturating_add(rhs.rx_dropped);
        self.tx_bytes = self.tx_bytes.saturating_add(rhs.tx_bytes);
        self.tx_packets = self.tx_packets.saturating_add(rhs.tx_packets);
        self.tx_errors = self.tx_errors.saturating_add(rhs.tx_errors);
        self.tx_dropped = self.tx_dropped.saturating_add(rhs.tx_dropped);
    }
}

/// One point-in-time sample of a container.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct ContainerStats {
    /// When the runtime read the sample.
    pub read: DateTime<Utc>,
    #[serde(rename = "cpu_stats")]
    pub cpu: CpuStats,
    #[serde(rename = "precpu_stats")]
    pub precpu: CpuStats,
    #[serde(rename = "memory_stats")]
    pub memory: MemoryStats,
    #[serde(deserialize_with = "null_as_default")]
    pub networks: HashMap<String, InterfaceStats>,
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de> + Default,
{
    let value: Option<T> = serde::Deserialize::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
