// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identity and term types shared by every module in this crate.

use std::fmt;

/// A node in the cluster. Opaque outside of display/equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// One replicated shard of the workflow log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PartitionId(pub u64);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Monotonic Raft epoch. Used both as an opaque token handed to listeners and
/// as the guard compared at completion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Term(pub u64);

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(node, partition)` identity used to derive the actor's tracing span name
/// and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionActorId {
    pub node_id: NodeId,
    pub partition_id: PartitionId,
}

impl PartitionActorId {
    pub fn new(node_id: NodeId, partition_id: PartitionId) -> Self {
        Self {
            node_id,
            partition_id,
        }
    }
}

impl fmt::Display for PartitionActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition[{}/{}]", self.node_id, self.partition_id)
    }
}
