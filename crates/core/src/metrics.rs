// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from interrupt paths without taking the controller lock.
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    dispatched: AtomicU64,
    spurious_lines: AtomicU64,
    convergence_failures: AtomicU64,
    wake_replays: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub spurious_lines: u64,
    pub convergence_failures: u64,
    pub wake_replays: u64,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.dispatched.store(0, Ordering::SeqCst);
        self.spurious_lines.store(0, Ordering::SeqCst);
        self.convergence_failures.store(0, Ordering::SeqCst);
        self.wake_replays.store(0, Ordering::SeqCst);
    }

    pub fn record_dispatch(&self, count: u64) {
        self.dispatched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_spurious_line(&self) {
        self.spurious_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_convergence_failure(&self) {
        self.convergence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_replay(&self, count: u64) {
        self.wake_replays.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    pub fn get_convergence_failures(&self) -> u64 {
        self.convergence_failures.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::SeqCst),
            spurious_lines: self.spurious_lines.load(Ordering::SeqCst),
            convergence_failures: self.convergence_failures.load(Ordering::SeqCst),
            wake_replays: self.wake_replays.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let m = ControllerMetrics::new();
        m.record_dispatch(3);
        m.record_spurious_line();
        m.record_wake_replay(2);
        assert_eq!(m.get_dispatched(), 3);
        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                dispatched: 3,
                spurious_lines: 1,
                convergence_failures: 0,
                wake_replays: 2,
            }
        );
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
