// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Health aggregation.
//!
//! Two capabilities — `health_status()` and `add_failure_listener()` —
//! stand in for an inheritance-based health hierarchy. A supervisor is
//! itself a component, so nesting is achieved by registering one supervisor
//! with another, not by subclassing.

mod supervisor;

pub use supervisor::HealthSupervisor;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// A component whose health can be observed. `HealthSupervisor` implements
/// this too — a supervisor is itself a supervised component, which is how
/// supervisors nest.
pub trait HealthComponent: Send + Sync {
    fn health_status(&self) -> HealthStatus;

    /// Registers `listener` to receive `on_failure`/`on_recovered` edge
    /// events for this component.
    fn add_failure_listener(&self, listener: Box<dyn FailureListener>);
}

/// Receives edge-triggered health transitions — never a steady-state ping.
pub trait FailureListener: Send + Sync {
    fn on_failure(&self);
    fn on_recovered(&self);
}

/// A simple leaf component whose status is set directly by its owner (used
/// for the partition's own health probe and the Raft health probe).
pub struct LeafHealthProbe {
    inner: std::sync::Mutex<LeafInner>,
}

struct LeafInner {
    status: HealthStatus,
    listeners: Vec<Box<dyn FailureListener>>,
}

impl LeafHealthProbe {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(LeafInner {
                status: HealthStatus::Healthy,
                listeners: Vec::new(),
            }),
        }
    }

    /// Sets the status, firing the appropriate edge event to every
    /// registered listener iff the status actually changed.
    pub fn set_status(&self, status: HealthStatus) {
        let mut guard = self.inner.lock().unwrap();
        if guard.status == status {
            return;
        }
        guard.status = status;
        for listener in &guard.listeners {
            match status {
                HealthStatus::Unhealthy => listener.on_failure(),
                HealthStatus::Healthy => listener.on_recovered(),
            }
        }
    }
}

impl Default for LeafHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthComponent for LeafHealthProbe {
    fn health_status(&self) -> HealthStatus {
        self.inner.lock().unwrap().status
    }

    fn add_failure_listener(&self, listener: Box<dyn FailureListener>) {
        self.inner.lock().unwrap().listeners.push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use test_log::test;

    struct CountingListener {
        failures: Arc<AtomicUsize>,
        recoveries: Arc<AtomicUsize>,
    }

    impl FailureListener for CountingListener {
        fn on_failure(&self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn on_recovered(&self) {
            self.recoveries.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn leaf_probe_only_fires_on_edges() {
        let probe = LeafHealthProbe::new();
        let failures = Arc::new(AtomicUsize::new(0));
        let recoveries = Arc::new(AtomicUsize::new(0));
        probe.add_failure_listener(Box::new(CountingListener {
            failures: failures.clone(),
            recoveries: recoveries.clone(),
        }));

        // Already healthy; setting healthy again must not fire.
        probe.set_status(HealthStatus::Healthy);
        assert_eq!(failures.load(Ordering::SeqCst), 0);

        probe.set_status(HealthStatus::Unhealthy);
        probe.set_status(HealthStatus::Unhealthy);
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        probe.set_status(HealthStatus::Healthy);
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);
    }
}
