// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Test doubles for the sidecar service contracts. There is no real log
//! storage, stream processor, snapshot director or exporter director in
//! this crate — scenario tests drive the actor against these instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    ExporterDirectorHandle, LogStorageHandle, ProcessingMode, ServiceError, ServiceFactory,
    SnapshotDirectorHandle, StreamProcessorHandle,
};
use crate::identifiers::PartitionActorId;

pub struct MockLogStorage;
impl LogStorageHandle for MockLogStorage {}

pub struct MockExporterDirector;
impl ExporterDirectorHandle for MockExporterDirector {}

#[derive(Default)]
pub struct MockStreamProcessor {
    pub pause_count: AtomicUsize,
    pub resume_count: AtomicUsize,
    pub mode: Mutex<Option<ProcessingMode>>,
}

#[async_trait]
impl StreamProcessorHandle for MockStreamProcessor {
    async fn pause_processing(&self) {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn resume_processing(&self) {
        self.resume_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockSnapshotDirector {
    pub force_snapshot_count: AtomicUsize,
}

#[async_trait]
impl SnapshotDirectorHandle for MockSnapshotDirector {
    async fn force_snapshot(&self) {
        self.force_snapshot_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A named failure point: the next `start_*` call matching `step` returns
/// `Err` instead of succeeding.
#[derive(Default)]
struct MockState {
    fail_on_start: Option<&'static str>,
    calls: Vec<String>,
}

#[derive(Default, Clone)]
pub struct MockServiceFactory {
    state: Arc<Mutex<MockState>>,
    pub last_stream_processor: Arc<Mutex<Option<Arc<MockStreamProcessor>>>>,
    pub last_snapshot_director: Arc<Mutex<Option<Arc<MockSnapshotDirector>>>>,
}

impl MockServiceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_start(&self, step: &'static str) {
        self.state.lock().unwrap().fail_on_start = Some(step);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }

    fn should_fail(&self, step: &'static str) -> bool {
        self.state.lock().unwrap().fail_on_start == Some(step)
    }
}

#[async_trait]
impl ServiceFactory for MockServiceFactory {
    async fn start_log_storage(
        &self,
        _id: PartitionActorId,
    ) -> Result<Arc<dyn LogStorageHandle>, ServiceError> {
        self.record("start_log_storage");
        if self.should_fail("log_storage") {
            return Err(ServiceError::StartFailed {
                service: "log_storage",
                reason: "injected test failure".into(),
            });
        }
        Ok(Arc::new(MockLogStorage))
    }

    async fn close_log_storage(&self, _handle: Arc<dyn LogStorageHandle>) {
        self.record("close_log_storage");
    }

    async fn start_stream_processor(
        &self,
        _id: PartitionActorId,
        mode: ProcessingMode,
    ) -> Result<Arc<dyn StreamProcessorHandle>, ServiceError> {
        self.record("start_stream_processor");
        if self.should_fail("stream_processor") {
            return Err(ServiceError::StartFailed {
                service: "stream_processor",
                reason: "injected test failure".into(),
            });
        }
        let processor = Arc::new(MockStreamProcessor::default());
        *processor.mode.lock().unwrap() = Some(mode);
        *self.last_stream_processor.lock().unwrap() = Some(processor.clone());
        Ok(processor)
    }

    async fn close_stream_processor(&self, _handle: Arc<dyn StreamProcessorHandle>) {
        self.record("close_stream_processor");
    }

    async fn start_snapshot_director(
        &self,
        _id: PartitionActorId,
    ) -> Result<Arc<dyn SnapshotDirectorHandle>, ServiceError> {
        self.record("start_snapshot_director");
        if self.should_fail("snapshot_director") {
            return Err(ServiceError::StartFailed {
                service: "snapshot_director",
                reason: "injected test failure".into(),
            });
        }
        let director = Arc::new(MockSnapshotDirector::default());
        *self.last_snapshot_director.lock().unwrap() = Some(director.clone());
        Ok(director)
    }

    async fn close_snapshot_director(&self, _handle: Arc<dyn SnapshotDirectorHandle>) {
        self.record("close_snapshot_director");
    }

    async fn start_exporter_director(
        &self,
        _id: PartitionActorId,
    ) -> Result<Arc<dyn ExporterDirectorHandle>, ServiceError> {
        self.record("start_exporter_director");
        if self.should_fail("exporter_director") {
            return Err(ServiceError::StartFailed {
                service: "exporter_director",
                reason: "injected test failure".into(),
            });
        }
        Ok(Arc::new(MockExporterDirector))
    }

    async fn close_exporter_director(&self, _handle: Arc<dyn ExporterDirectorHandle>) {
        self.record("close_exporter_director");
    }
}
