// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The actor-confined state every transition reads and mutates. Never shared
//! across actors; the partition actor is its only writer.
//!
//! Split in two so disk-space, pause/resume and snapshot requests can
//! interleave with an in-flight transition: [`PartitionContext`] holds the
//! cheap, always-owned bookkeeping the actor mutates directly between every
//! await, while [`ServiceState`] holds the installable service handles and
//! is *taken* by value for the duration of a transition, consumed and
//! rebuilt rather than mutated in place.

use std::sync::Arc;

use crate::identifiers::{PartitionActorId, Term};
use crate::raft::RaftPartitionHandle;
use crate::role::ControllerRole;
use crate::services::{
    ExporterDirectorHandle, LogStorageHandle, SnapshotDirectorHandle, StreamProcessorHandle,
};

pub struct PartitionContext {
    pub id: PartitionActorId,
    /// The controller role last *dispatched* (not necessarily finished
    /// installing) — `None` until the first role change has been observed,
    /// which matters for the collapsing rule in `Role::to_controller_role`.
    pub role: Option<ControllerRole>,
    pub term: Term,
    pub disk_space_available: bool,
    pub processing_paused: bool,
    pub services_installed: bool,
    pub raft: Arc<dyn RaftPartitionHandle>,
}

impl PartitionContext {
    pub fn new(id: PartitionActorId, raft: Arc<dyn RaftPartitionHandle>) -> Self {
        Self {
            id,
            role: None,
            term: Term(0),
            disk_space_available: true,
            processing_paused: false,
            services_installed: false,
            raft,
        }
    }

    /// The sole authority the disk-space path consults to decide whether to
    /// resume.
    pub fn should_process(&self) -> bool {
        self.disk_space_available && !self.processing_paused
    }
}

#[derive(Default)]
pub struct ServiceState {
    pub log_storage: Option<Arc<dyn LogStorageHandle>>,
    pub stream_processor: Option<Arc<dyn StreamProcessorHandle>>,
    pub snapshot_director: Option<Arc<dyn SnapshotDirectorHandle>>,
    pub exporter_director: Option<Arc<dyn ExporterDirectorHandle>>,
}

impl ServiceState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Drops every handle. Called by the transition engine between the
    /// teardown and install phases: once a partition goes inactive, every
    /// installable service handle must be absent.
    pub fn clear(&mut self) {
        *self = Self::empty();
    }
}

#[cfg(test)]
pub(crate) fn invariants_hold(ctx: &PartitionContext, state: &ServiceState) -> bool {
    if ctx.role == Some(ControllerRole::Leader) && ctx.services_installed {
        if state.stream_processor.is_none()
            || state.snapshot_director.is_none()
            || state.exporter_director.is_none()
        {
            return false;
        }
    }
    if ctx.role == Some(ControllerRole::Inactive)
        && (state.log_storage.is_some()
            || state.stream_processor.is_some()
            || state.snapshot_director.is_some()
            || state.exporter_director.is_some())
    {
        return false;
    }
    true
}
