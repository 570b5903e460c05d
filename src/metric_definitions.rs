// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Optional to have but adds description/help message to the metrics emitted
/// to the metrics' sink.
use metrics::{describe_counter, describe_gauge, Unit};

use crate::health::HealthStatus;

pub fn describe_metrics() {
    describe_gauge!(
        "partition.health",
        Unit::Count,
        "1 if the component is healthy, 0 if unhealthy"
    );

    describe_counter!(
        "partition.transition.steps_total",
        Unit::Count,
        "Transition steps executed by the partition transition engine, by phase and outcome"
    );

    describe_counter!(
        "partition.install_failure.total",
        Unit::Count,
        "Install failures observed by the partition actor"
    );
}

pub(crate) fn set_health_gauge(component: &str, status: HealthStatus) {
    let value = match status {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Unhealthy => 0.0,
    };
    metrics::gauge!("partition.health", value, "component" => component.to_string());
}

pub(crate) fn record_step(phase: &'static str, step: &'static str, outcome: &'static str) {
    metrics::counter!(
        "partition.transition.steps_total",
        "phase" => phase,
        "step" => step,
        "outcome" => outcome,
    )
    .increment(1);
}

pub(crate) fn record_install_failure(role: &'static str) {
    metrics::counter!("partition.install_failure.total", "role" => role).increment(1);
}
