// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Partition-listener fan-out. Listeners are registered once at startup and
//! retained for the actor's lifetime, in insertion order.

use async_trait::async_trait;
use thiserror::Error;

use crate::identifiers::{PartitionId, Term};

#[derive(Debug, Error)]
#[error("partition listener failed: {0}")]
pub struct ListenerError(pub anyhow::Error);

/// Placeholder for the log-stream handle a real listener would read from.
/// The stream processor internals that produce it live outside this crate;
/// listeners here only observe that one was handed to them at the right
/// term.
pub type LogStream = ();

/// An external observer notified when this partition becomes leader or
/// follower.
#[async_trait]
pub trait PartitionListener: Send + Sync {
    async fn on_becoming_leader(
        &self,
        partition_id: PartitionId,
        term: Term,
        log_stream: LogStream,
    ) -> Result<(), ListenerError>;

    async fn on_becoming_follower(
        &self,
        partition_id: PartitionId,
        term: Term,
    ) -> Result<(), ListenerError>;
}

/// Calls every listener in registration order and awaits each in turn,
/// returning the first error (if any) after every listener has been
/// invoked. Errors from later listeners are logged and dropped; the
/// *first* failure is what the actor treats as an install failure.
pub async fn notify_becoming_leader(
    listeners: &[std::sync::Arc<dyn PartitionListener>],
    partition_id: PartitionId,
    term: Term,
) -> Result<(), ListenerError> {
    let mut first_error = None;
    for listener in listeners {
        if let Err(err) = listener.on_becoming_leader(partition_id, term, ()).await {
            tracing::warn!(%partition_id, %term, error = %err.0, "partition listener failed on becoming leader");
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub async fn notify_becoming_follower(
    listeners: &[std::sync::Arc<dyn PartitionListener>],
    partition_id: PartitionId,
    term: Term,
) -> Result<(), ListenerError> {
    let mut first_error = None;
    for listener in listeners {
        if let Err(err) = listener.on_becoming_follower(partition_id, term).await {
            tracing::warn!(%partition_id, %term, error = %err.0, "partition listener failed on becoming follower");
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingListener {
        pub leader_calls: Mutex<Vec<(PartitionId, Term)>>,
        pub follower_calls: Mutex<Vec<(PartitionId, Term)>>,
        pub fail_next: AtomicUsize,
    }

    impl RecordingListener {
        pub fn fail_next_call(&self) {
            self.fail_next.store(1, Ordering::SeqCst);
        }

        fn maybe_fail(&self) -> Result<(), ListenerError> {
            if self.fail_next.swap(0, Ordering::SeqCst) == 1 {
                Err(ListenerError(anyhow::anyhow!("injected listener failure")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PartitionListener for RecordingListener {
        async fn on_becoming_leader(
            &self,
            partition_id: PartitionId,
            term: Term,
            _log_stream: (),
        ) -> Result<(), ListenerError> {
            self.leader_calls.lock().unwrap().push((partition_id, term));
            self.maybe_fail()
        }

        async fn on_becoming_follower(
            &self,
            partition_id: PartitionId,
            term: Term,
        ) -> Result<(), ListenerError> {
            self.follower_calls
                .lock()
                .unwrap()
                .push((partition_id, term));
            self.maybe_fail()
        }
    }
}
