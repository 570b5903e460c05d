// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Concrete transition steps and the recipes that compose them into roles.
//! Leader and follower recipes share most steps but differ in whether
//! certain services are present.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Recipe, StepError, TransitionStep};
use crate::context::ServiceState;
use crate::identifiers::PartitionActorId;
use crate::role::ControllerRole;
use crate::services::{ProcessingMode, ServiceFactory};

/// Shared construction dependencies every step needs. Cheap to clone —
/// just an `Arc` to the service factory.
#[derive(Clone)]
pub struct StepDeps {
    pub factory: Arc<dyn ServiceFactory>,
}

struct LogStorageStep {
    deps: StepDeps,
}

#[async_trait]
impl TransitionStep for LogStorageStep {
    fn name(&self) -> &'static str {
        "log_storage"
    }

    async fn prepare(&self, state: &mut ServiceState) -> Result<(), StepError> {
        if let Some(handle) = state.log_storage.take() {
            self.deps.factory.close_log_storage(handle).await;
        }
        Ok(())
    }

    async fn install(
        &self,
        id: PartitionActorId,
        state: &mut ServiceState,
    ) -> Result<(), StepError> {
        let handle = self
            .deps
            .factory
            .start_log_storage(id)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        state.log_storage = Some(handle);
        Ok(())
    }
}

struct StreamProcessorStep {
    deps: StepDeps,
    mode: ProcessingMode,
}

#[async_trait]
impl TransitionStep for StreamProcessorStep {
    fn name(&self) -> &'static str {
        "stream_processor"
    }

    async fn prepare(&self, state: &mut ServiceState) -> Result<(), StepError> {
        if let Some(handle) = state.stream_processor.take() {
            self.deps.factory.close_stream_processor(handle).await;
        }
        Ok(())
    }

    async fn install(
        &self,
        id: PartitionActorId,
        state: &mut ServiceState,
    ) -> Result<(), StepError> {
        let handle = self
            .deps
            .factory
            .start_stream_processor(id, self.mode)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        state.stream_processor = Some(handle);
        Ok(())
    }
}

struct SnapshotDirectorStep {
    deps: StepDeps,
}

#[async_trait]
impl TransitionStep for SnapshotDirectorStep {
    fn name(&self) -> &'static str {
        "snapshot_director"
    }

    async fn prepare(&self, state: &mut ServiceState) -> Result<(), StepError> {
        if let Some(handle) = state.snapshot_director.take() {
            self.deps.factory.close_snapshot_director(handle).await;
        }
        Ok(())
    }

    async fn install(
        &self,
        id: PartitionActorId,
        state: &mut ServiceState,
    ) -> Result<(), StepError> {
        let handle = self
            .deps
            .factory
            .start_snapshot_director(id)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        state.snapshot_director = Some(handle);
        Ok(())
    }
}

struct ExporterDirectorStep {
    deps: StepDeps,
}

#[async_trait]
impl TransitionStep for ExporterDirectorStep {
    fn name(&self) -> &'static str {
        "exporter_director"
    }

    async fn prepare(&self, state: &mut ServiceState) -> Result<(), StepError> {
        if let Some(handle) = state.exporter_director.take() {
            self.deps.factory.close_exporter_director(handle).await;
        }
        Ok(())
    }

    async fn install(
        &self,
        id: PartitionActorId,
        state: &mut ServiceState,
    ) -> Result<(), StepError> {
        let handle = self
            .deps
            .factory
            .start_exporter_director(id)
            .await
            .map_err(|e| StepError::new(self.name(), e))?;
        state.exporter_director = Some(handle);
        Ok(())
    }
}

/// Builds the ordered step list for `role`. A leader installs log storage,
/// a processing-mode stream processor, a snapshot director and an exporter
/// director, in that order. A follower installs only log storage and a
/// replay-only stream processor. Inactive has no steps — tearing down to
/// it always leaves every handle absent.
pub fn recipe_for(role: ControllerRole, deps: StepDeps) -> Recipe {
    match role {
        ControllerRole::Leader => vec![
            Box::new(LogStorageStep { deps: deps.clone() }),
            Box::new(StreamProcessorStep {
                deps: deps.clone(),
                mode: ProcessingMode::Processing,
            }),
            Box::new(SnapshotDirectorStep { deps: deps.clone() }),
            Box::new(ExporterDirectorStep { deps }),
        ],
        ControllerRole::Follower => vec![
            Box::new(LogStorageStep { deps: deps.clone() }),
            Box::new(StreamProcessorStep {
                deps,
                mode: ProcessingMode::ReplayOnly,
            }),
        ],
        ControllerRole::Inactive => vec![],
    }
}
