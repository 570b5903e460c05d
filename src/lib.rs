// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Per-node, per-partition controller: a single-threaded actor that
//! serializes Raft role changes, service installation and external pressure
//! signals (disk space, pause/resume, shutdown) into one ordered mailbox,
//! drives a [`transition`] engine between leader/follower/inactive recipes,
//! and aggregates sub-component [`health`] into a single failure signal.
//!
//! The Raft implementation, the stream processor internals and the
//! persistence of snapshots and log storage bytes are external
//! collaborators, represented here only by the narrow traits this crate
//! reads from or calls into (see [`raft`] and [`services`]).

pub mod actor;
pub mod context;
pub mod health;
pub mod identifiers;
pub mod listener;
pub mod metric_definitions;
pub mod options;
pub mod raft;
pub mod role;
pub mod services;
pub mod transition;

pub use actor::{ActorError, PartitionActorHandle};
pub use identifiers::{NodeId, PartitionActorId, PartitionId, Term};
pub use options::Options;
pub use role::{ControllerRole, Role};
