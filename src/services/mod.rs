// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Contracts for the node-local sidecar services the transition engine
//! installs and tears down. Each installable service exposes at minimum:
//! construct (from context), start, close.
//!
//! Their actual implementations (log storage, the stream processor, a
//! snapshot director, an exporter director) live outside this crate — this
//! module only carries the narrow trait each recipe step depends on, plus a
//! test double for each.

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::identifiers::PartitionActorId;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} failed to start: {reason}")]
    StartFailed { service: &'static str, reason: String },
    #[error("{service} failed to close cleanly: {reason}")]
    CloseFailed { service: &'static str, reason: String },
}

/// Whether the stream processor should apply records to state (`Processing`,
/// on a leader) or merely replay them to stay caught up (`ReplayOnly`, on a
/// follower).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Processing,
    ReplayOnly,
}

pub trait LogStorageHandle: Send + Sync {}

#[async_trait]
pub trait StreamProcessorHandle: Send + Sync {
    /// Idempotent: calling this on an already-paused processor is a no-op.
    async fn pause_processing(&self);
    /// Idempotent; safe to call on an already-running processor.
    async fn resume_processing(&self);
}

#[async_trait]
pub trait SnapshotDirectorHandle: Send + Sync {
    async fn force_snapshot(&self);
}

pub trait ExporterDirectorHandle: Send + Sync {}

/// Constructs and tears down sidecar services on behalf of the transition
/// steps. Standing in for the real wiring (Raft log reader, RocksDB-backed
/// storage, the invoker, ...), all of which live outside this component.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn start_log_storage(
        &self,
        id: PartitionActorId,
    ) -> Result<std::sync::Arc<dyn LogStorageHandle>, ServiceError>;

    async fn close_log_storage(&self, handle: std::sync::Arc<dyn LogStorageHandle>);

    async fn start_stream_processor(
        &self,
        id: PartitionActorId,
        mode: ProcessingMode,
    ) -> Result<std::sync::Arc<dyn StreamProcessorHandle>, ServiceError>;

    async fn close_stream_processor(&self, handle: std::sync::Arc<dyn StreamProcessorHandle>);

    async fn start_snapshot_director(
        &self,
        id: PartitionActorId,
    ) -> Result<std::sync::Arc<dyn SnapshotDirectorHandle>, ServiceError>;

    async fn close_snapshot_director(&self, handle: std::sync::Arc<dyn SnapshotDirectorHandle>);

    async fn start_exporter_director(
        &self,
        id: PartitionActorId,
    ) -> Result<std::sync::Arc<dyn ExporterDirectorHandle>, ServiceError>;

    async fn close_exporter_director(&self, handle: std::sync::Arc<dyn ExporterDirectorHandle>);
}
