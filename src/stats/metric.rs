use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::container::{Container, ContainerName, Labels};

use super::{ContainerStats, calc};

/// Utilization figures derived from one [`ContainerStats`] sample.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Metric {
    pub name: ContainerName,
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_usage: u64,
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
}

impl Metric {
    pub fn from_sample(container: &Container, stats: &ContainerStats) -> Self {
        let network = calc::network_totals(&stats.networks);

        Self {
            name: container.name().clone(),
            labels: Arc::clone(container.labels()),
            timestamp: stats.read,
            cpu_percent: calc::cpu_percent(&stats.cpu, &stats.precpu),
            memory_percent: calc::memory_percent(&stats.memory),
            memory_usage: stats.memory.usage,
            rx_bytes_total: network.rx_bytes,
            tx_bytes_total: network.tx_bytes,
        }
    }
}
