//! CPU topology detection and worker thread placement.
//!
//! The worker pool can pin each worker to its own core. Pinning keeps a
//! worker's queue and the task data it touches in one core's private caches,
//! and keeps neighbouring pipeline stages from migrating onto the same core.
//!
//! # Detection
//!
//! Uses `num_cpus` for physical/logical core counts and `core_affinity` for
//! pinning. On most systems, core IDs 0..N map to separate physical cores
//! before SMT siblings are enumerated, so `Auto` places workers on the lowest
//! IDs first.

use core_affinity::CoreId;
use serde::{Deserialize, Serialize};

/// CPU topology information detected at runtime.
#[derive(Debug, Clone)]
pub struct CpuTopology {
    /// Total logical cores (including SMT/hyperthreads).
    pub logical_cores: usize,
    /// Total physical cores.
    pub physical_cores: usize,
    /// Whether SMT (hyperthreading) is enabled.
    pub has_smt: bool,
    /// Available core IDs for pinning.
    pub available_cores: Vec<usize>,
}

impl CpuTopology {
    /// Detects the CPU topology of the current system.
    #[must_use]
    pub fn detect() -> Self {
        let logical_cores = num_cpus::get();
        let physical_cores = num_cpus::get_physical();
        let has_smt = logical_cores > physical_cores;

        // Get available core IDs from core_affinity
        let available_cores = core_affinity::get_core_ids()
            .map(|ids| ids.into_iter().map(|id| id.id).collect())
            .unwrap_or_else(|| (0..logical_cores).collect());

        Self {
            logical_cores,
            physical_cores,
            has_smt,
            available_cores,
        }
    }

    /// Assigns one core per worker, physical cores first.
    ///
    /// Workers beyond the number of available cores stay unpinned rather than
    /// doubling up on a core that already runs a worker.
    #[must_use]
    pub fn place_workers(&self, workers: usize) -> Vec<Option<usize>> {
        let limit = if self.has_smt {
            // Leave SMT siblings alone while physical cores remain.
            self.physical_cores.max(1).min(self.available_cores.len())
        } else {
            self.available_cores.len()
        };
        (0..workers)
            .map(|id| {
                if id < limit {
                    self.available_cores.get(id).copied()
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Configuration for CPU pinning of pool workers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuConfig {
    /// Disable CPU pinning entirely.
    #[default]
    Disabled,
    /// Auto-detect topology and pin worker `i` to the `i`-th physical core.
    Auto,
    /// User-specified core per worker (`None` = unpinned). Workers past the
    /// end of the list are unpinned.
    Manual(Vec<Option<usize>>),
}

impl CpuConfig {
    /// Resolves the config to one optional core per worker.
    #[must_use]
    pub fn resolve(&self, workers: usize) -> Vec<Option<usize>> {
        match self {
            Self::Disabled => vec![None; workers],
            Self::Auto => CpuTopology::detect().place_workers(workers),
            Self::Manual(cores) => (0..workers)
                .map(|id| cores.get(id).copied().flatten())
                .collect(),
        }
    }
}

/// Pins the current thread to the specified core.
///
/// Returns `true` if pinning succeeded, `false` otherwise.
/// Pinning may fail if the core ID is invalid or the OS denies the request.
pub fn pin_to_core(core_id: usize) -> bool {
    let core = CoreId { id: core_id };
    core_affinity::set_for_current(core)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_detection_returns_valid_counts() {
        let topo = CpuTopology::detect();

        assert!(topo.logical_cores > 0, "should have at least 1 logical core");
        assert!(topo.physical_cores > 0, "should have at least 1 physical core");
        assert!(
            topo.logical_cores >= topo.physical_cores,
            "logical >= physical"
        );
        assert!(!topo.available_cores.is_empty(), "should have available cores");
    }

    #[test]
    fn placement_uses_distinct_available_cores() {
        let topo = CpuTopology::detect();
        let placement = topo.place_workers(topo.logical_cores + 2);

        let pinned: Vec<usize> = placement.iter().flatten().copied().collect();
        for core in &pinned {
            assert!(
                topo.available_cores.contains(core),
                "core {core} should be in available set"
            );
        }
        let mut unique = pinned.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), pinned.len(), "no two workers share a core");
        assert!(placement.last().unwrap().is_none(), "excess workers unpinned");
    }

    #[test]
    fn placement_skips_smt_siblings() {
        let topo = CpuTopology {
            logical_cores: 8,
            physical_cores: 4,
            has_smt: true,
            available_cores: (0..8).collect(),
        };
        assert_eq!(
            topo.place_workers(6),
            vec![Some(0), Some(1), Some(2), Some(3), None, None]
        );
    }

    #[test]
    fn cpu_config_disabled_returns_unpinned() {
        assert_eq!(CpuConfig::Disabled.resolve(3), vec![None, None, None]);
    }

    #[test]
    fn cpu_config_manual_uses_specified_cores() {
        let config = CpuConfig::Manual(vec![Some(5), None, Some(7)]);
        assert_eq!(
            config.resolve(4),
            vec![Some(5), None, Some(7), None]
        );
    }

    #[test]
    fn cpu_config_auto_resolves_one_entry_per_worker() {
        assert_eq!(CpuConfig::Auto.resolve(3).len(), 3);
    }
}
