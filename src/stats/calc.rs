//! Pure utilization calculations over decoded samples.
//!
//! None of these functions keep state; a CPU percentage is derived from the two sets of
//! counters embedded in a single record.

use std::collections::HashMap;

use super::{CpuStats, InterfaceStats, MemoryStats};

/// CPU utilization between `previous` and `current`, scaled so that one fully busy core is
/// `100.0`.
///
/// Returns `0.0` unless both the container and the host CPU time advanced; counter
/// regressions never produce a negative value.
pub fn cpu_percent(current: &CpuStats, previous: &CpuStats) -> f64 {
    let cpu_delta = current.usage.total.saturating_sub(previous.usage.total);
    let system_delta = current.system.saturating_sub(previous.system);

    if cpu_delta == 0 || system_delta == 0 {
        return 0.0;
    }

    (cpu_delta as f64 / system_delta as f64) * f64::from(current.online_cpus()) * 100.0
}

/// Memory usage relative to the limit, `0.0` when no limit is reported.
pub fn memory_percent(memory: &MemoryStats) -> f64 {
    if memory.limit == 0 {
        return 0.0;
    }

    memory.usage as f64 / memory.limit as f64 * 100.0
}

/// Sums the counters of every reported interface.
pub fn network_totals(networks: &HashMap<String, InterfaceStats>) -> InterfaceStats {
    networks
        .values()
        .cloned()
        .fold(InterfaceStats::default(), |mut total, iface| {
            total += iface;
            total
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CpuUsage;

    fn cpu(total: u64, system: u64, online_cpus: u32) -> CpuStats {
        CpuStats {
            usage: CpuUsage {
                total,
                per_cpu: Vec::new(),
            },
            system,
            online_cpus,
        }
    }

    #[test]
    fn test_cpu_percent_half_of_one_core() {
        let current = cpu(1_500_000, 6_000_000, 1);
        let previous = cpu(1_000_000, 5_000_000, 1);
        assert_eq!(cpu_percent(&current, &previous), 50.0);
    }

    #[test]
    fn test_cpu_percent_one_full_core() {
        let current = cpu(1_500_000, 5_500_000, 1);
        let previous = cpu(1_000_000, 5_000_000, 1);
        assert_eq!(cpu_percent(&current, &previous), 100.0);
    }

    #[test]
    fn test_cpu_percent_scales_with_online_cpus() {
        let current = cpu(1_500_000, 6_000_000, 4);
        let previous = cpu(1_000_000, 5_000_000, 4);
        assert_eq!(cpu_percent(&current, &previous), 200.0);
    }

    #[test]
    fn test_cpu_percent_same_sample_is_zero() {
        let sample = cpu(1_000_000, 5_000_000, 2);
        assert_eq!(cpu_percent(&sample, &sample), 0.0);
    }

    #[test]
    fn test_cpu_percent_without_system_delta() {
        let current = cpu(2_000_000, 5_000_000, 1);
        let previous = cpu(1_000_000, 5_000_000, 1);
        assert_eq!(cpu_percent(&current, &previous), 0.0);

        // first sample: precpu counters are all zero
        let current = cpu(2_000_000, 0, 1);
        assert_eq!(cpu_percent(&current, &CpuStats::default()), 0.0);
    }

    #[test]
    fn test_cpu_percent_counter_regression() {
        let current = cpu(1_000_000, 4_000_000, 1);
        let previous = cpu(2_000_000, 5_000_000, 1);
        assert_eq!(cpu_percent(&current, &previous), 0.0);
    }

    #[test]
    fn test_cpu_percent_bounds() {
        let previous = cpu(0, 0, 3);
        for (cpu_delta, system_delta) in [(0, 10), (1, 10), (5, 10), (10, 10), (7, 1_000_000)] {
            let current = cpu(cpu_delta, system_delta, 3);
            let percent = cpu_percent(&current, &previous);
            assert!(
                (0.0..=300.0).contains(&percent),
                "cpu_delta={cpu_delta}, system_delta={system_delta}: {percent}"
            );
        }
    }

    #[test]
    fn test_memory_percent() {
        assert_eq!(memory_percent(&MemoryStats { usage: 10, limit: 0 }), 0.0);
        assert_eq!(memory_percent(&MemoryStats { usage: 0, limit: 0 }), 0.0);
        assert_eq!(memory_percent(&MemoryStats { usage: 0, limit: 512 }), 0.0);
        assert_eq!(memory_percent(&MemoryStats { usage: 512, limit: 512 }), 100.0);
        assert_eq!(memory_percent(&MemoryStats { usage: 128, limit: 512 }), 25.0);
    }

    #[test]
    fn test_network_totals() {
        assert_eq!(network_totals(&HashMap::new()), InterfaceStats::default());

        let networks = HashMap::from([
            (
                "eth0".to_owned(),
                InterfaceStats {
                    rx_bytes: 100,
                    tx_bytes: 300,
                    ..Default::default()
                },
            ),
            (
                "eth1".to_owned(),
                InterfaceStats {
                    rx_bytes: u64::from(u32::MAX),
                    tx_bytes: 30,
                    ..Default::default()
                },
            ),
        ]);
        let totals = network_totals(&networks);
        assert_eq!(totals.rx_bytes, u64::from(u32::MAX) + 100);
        assert_eq!(totals.tx_bytes, 330);
    }
}
