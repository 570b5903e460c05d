// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Contracts towards the Raft implementation. Leader election, log
//! replication and snapshot transfer live outside this crate; it only
//! depends on the narrow surface it reads from or calls into.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::health::{FailureListener, HealthComponent, HealthStatus, LeafHealthProbe};
use crate::identifiers::Term;
use crate::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub u64);

/// Notified by Raft whenever this member's role changes.
pub trait RoleChangeListener: Send + Sync {
    fn on_role_changed(&self, role: Role, term: Term);
}

/// Notified by Raft when the partition suffers an unrecoverable fault —
/// distinct from an ordinary role change, and handled by tearing the
/// partition down to `Inactive` rather than by any recipe transition.
pub trait RaftFaultListener: Send + Sync {
    fn on_raft_fault(&self);
}

/// An opaque handle to whatever persists snapshot bytes; read directly off
/// the Raft partition, never through the actor.
pub trait SnapshotStoreHandle: Send + Sync {}

/// The Raft partition as seen by the controller: read-only except for
/// `step_down`, which is safe to call at any time.
pub trait RaftPartitionHandle: Send + Sync {
    fn current_role_and_term(&self) -> (Role, Term);

    /// Invites Raft to elect a new leader. Safe to call repeatedly and at
    /// any time; Raft itself decides whether a step-down is a no-op.
    fn step_down(&self);

    fn snapshot_store(&self) -> Arc<dyn SnapshotStoreHandle>;

    fn subscribe_role_changes(&self, listener: Arc<dyn RoleChangeListener>) -> SubscriptionToken;
    fn unsubscribe_role_changes(&self, token: SubscriptionToken);

    fn subscribe_fault(&self, listener: Arc<dyn RaftFaultListener>) -> SubscriptionToken;
    fn unsubscribe_fault(&self, token: SubscriptionToken);
}

/// Observes the underlying Raft partition for unrecoverable faults and
/// launders them into a clean transition to `Inactive`. It is itself a
/// supervised `HealthComponent`, registered alongside the partition's own
/// health probe.
pub struct RaftHealthProbe {
    leaf: LeafHealthProbe,
    on_fault: Box<dyn Fn() + Send + Sync>,
}

impl RaftHealthProbe {
    /// `on_fault` is invoked (non-blocking) whenever the Raft partition
    /// reports a fault; the caller wires this to
    /// `PartitionActorHandle::on_raft_fault`.
    pub fn new(on_fault: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            leaf: LeafHealthProbe::new(),
            on_fault: Box::new(on_fault),
        })
    }
}

impl HealthComponent for RaftHealthProbe {
    fn health_status(&self) -> HealthStatus {
        self.leaf.health_status()
    }

    fn add_failure_listener(&self, listener: Box<dyn FailureListener>) {
        self.leaf.add_failure_listener(listener);
    }
}

impl RaftFaultListener for RaftHealthProbe {
    fn on_raft_fault(&self) {
        self.leaf.set_status(HealthStatus::Unhealthy);
        (self.on_fault)();
    }
}

/// Test double generating sequential subscription tokens; a production
/// implementation wraps whatever identifiers the real Raft partition hands
/// back.
#[cfg(test)]
pub(crate) struct TokenGenerator(AtomicU64);

#[cfg(test)]
impl TokenGenerator {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub(crate) fn next(&self) -> SubscriptionToken {
        SubscriptionToken(self.0.fetch_add(1, Ordering::SeqCst))
    }
}
