// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{FailureListener, HealthComponent, HealthStatus};
use crate::metric_definitions::set_health_gauge;

struct SupervisorInner {
    children: HashMap<String, HealthStatus>,
    aggregate: HealthStatus,
    listeners: Vec<Box<dyn FailureListener>>,
}

/// Aggregates the health of registered components: `Unhealthy` iff any
/// registered component is `Unhealthy`. A supervisor is itself a
/// `HealthComponent`, so nesting another supervisor is just another
/// `register` call.
pub struct HealthSupervisor {
    name: String,
    inner: Mutex<SupervisorInner>,
}

impl HealthSupervisor {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(SupervisorInner {
                children: HashMap::new(),
                aggregate: HealthStatus::Healthy,
                listeners: Vec::new(),
            }),
        })
    }

    /// Registers `component` under `component_id`, subscribing this
    /// supervisor to its failure/recovery edges so the aggregate can be
    /// recomputed as children change.
    pub fn register(self: &Arc<Self>, component_id: impl Into<String>, component: &dyn HealthComponent) {
        let component_id = component_id.into();
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .children
                .insert(component_id.clone(), component.health_status());
        }
        component.add_failure_listener(Box::new(ChildListener {
            supervisor: self.clone(),
            component_id,
        }));
        self.recompute();
    }

    fn on_child_status(&self, component_id: &str, status: HealthStatus) {
        if let Some(entry) = self.inner.lock().unwrap().children.get_mut(component_id) {
            *entry = status;
        }
        self.recompute();
    }

    fn recompute(&self) {
        let mut inner = self.inner.lock().unwrap();
        let new_aggregate = if inner.children.values().any(|s| *s == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        if new_aggregate == inner.aggregate {
            return;
        }
        inner.aggregate = new_aggregate;
        set_health_gauge(&self.name, new_aggregate);
        for listener in &inner.listeners {
            match new_aggregate {
                HealthStatus::Unhealthy => listener.on_failure(),
                HealthStatus::Healthy => listener.on_recovered(),
            }
        }
    }
}

impl HealthComponent for HealthSupervisor {
    fn health_status(&self) -> HealthStatus {
        self.inner.lock().unwrap().aggregate
    }

    fn add_failure_listener(&self, listener: Box<dyn FailureListener>) {
        self.inner.lock().unwrap().listeners.push(listener);
    }
}

struct ChildListener {
    supervisor: Arc<HealthSupervisor>,
    component_id: String,
}

impl FailureListener for ChildListener {
    fn on_failure(&self) {
        self.supervisor
            .on_child_status(&self.component_id, HealthStatus::Unhealthy);
    }

    fn on_recovered(&self) {
        self.supervisor
            .on_child_status(&self.component_id, HealthStatus::Healthy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::LeafHealthProbe;
    use test_log::test;

    #[test]
    fn aggregate_unhealthy_iff_any_child_unhealthy() {
        let supervisor = HealthSupervisor::new("partition[N1/P0]");
        let a = LeafHealthProbe::new();
        let b = LeafHealthProbe::new();
        supervisor.register("raft", &a);
        supervisor.register("services", &b);

        assert_eq!(supervisor.health_status(), HealthStatus::Healthy);

        b.set_status(HealthStatus::Unhealthy);
        assert_eq!(supervisor.health_status(), HealthStatus::Unhealthy);

        a.set_status(HealthStatus::Unhealthy);
        assert_eq!(supervisor.health_status(), HealthStatus::Unhealthy);

        b.set_status(HealthStatus::Healthy);
        assert_eq!(
            supervisor.health_status(),
            HealthStatus::Unhealthy,
            "still unhealthy because `a` has not recovered"
        );

        a.set_status(HealthStatus::Healthy);
        assert_eq!(supervisor.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn nested_supervisors_forward_aggregate() {
        let leaf_supervisor = HealthSupervisor::new("leaf-group");
        let leaf = LeafHealthProbe::new();
        leaf_supervisor.register("leaf", &leaf);

        let top = HealthSupervisor::new("top");
        top.register("leaf-group", leaf_supervisor.as_ref());

        leaf.set_status(HealthStatus::Unhealthy);
        assert_eq!(top.health_status(), HealthStatus::Unhealthy);
    }
}
