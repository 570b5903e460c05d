// Copyright (c) 2023 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The partition actor: a single-threaded cooperative task that serializes
//! every role change, health signal, and external call through a mailbox,
//! drained by a `tokio::select!` loop over its command and actuator streams.
//!
//! A transition's prepare/install work runs on a spawned task rather than
//! inline in the mailbox loop, so the loop keeps draining role-change and
//! pressure-signal messages while a transition is in flight; see `context`
//! module docs for why `ServiceState` is split out to make that safe.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::context::{PartitionContext, ServiceState};
use crate::health::{FailureListener, HealthComponent, HealthStatus, HealthSupervisor, LeafHealthProbe};
use crate::identifiers::{PartitionActorId, Term};
use crate::listener::{notify_becoming_follower, notify_becoming_leader, PartitionListener};
use crate::metric_definitions::record_install_failure;
use crate::options::Options;
use crate::raft::{
    RaftFaultListener, RaftHealthProbe, RaftPartitionHandle, RoleChangeListener, SubscriptionToken,
};
use crate::role::{ControllerRole, Role};
use crate::services::{ServiceFactory, SnapshotDirectorHandle, StreamProcessorHandle};
use crate::transition::steps::{recipe_for, StepDeps};
use crate::transition::{TransitionEngine, TransitionError};

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("partition actor is no longer running")]
    Closed,
}

impl<T> From<mpsc::error::SendError<T>> for ActorError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ActorError::Closed
    }
}

impl From<oneshot::error::RecvError> for ActorError {
    fn from(_: oneshot::error::RecvError) -> Self {
        ActorError::Closed
    }
}

enum ActorMessage {
    NewRole {
        role: Role,
        term: Term,
        reply: oneshot::Sender<()>,
    },
    RaftFault {
        reply: oneshot::Sender<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    HealthFailure,
    HealthRecovered,
    DiskSpaceAvailable {
        reply: oneshot::Sender<()>,
    },
    DiskSpaceNotAvailable {
        reply: oneshot::Sender<()>,
    },
    PauseProcessing {
        reply: oneshot::Sender<()>,
    },
    ResumeProcessing {
        reply: oneshot::Sender<()>,
    },
    TriggerSnapshot {
        reply: oneshot::Sender<()>,
    },
    GetStreamProcessor {
        reply: oneshot::Sender<Option<Arc<dyn StreamProcessorHandle>>>,
    },
    AddFailureListener {
        listener: Box<dyn FailureListener>,
    },
}

/// A cheaply `Clone`-able handle to a running partition actor. This is the
/// only thing external callers hold; the actor body itself is moved into a
/// spawned task so it stays the sole writer to its `PartitionContext`.
#[derive(Clone)]
pub struct PartitionActorHandle {
    id: PartitionActorId,
    sender: mpsc::Sender<ActorMessage>,
    raft: Arc<dyn RaftPartitionHandle>,
}

impl PartitionActorHandle {
    pub fn id(&self) -> PartitionActorId {
        self.id
    }

    pub async fn on_new_role(&self, role: Role, term: Term) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::NewRole { role, term, reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    /// Wired to the Raft-health probe's fault callback. The returned future
    /// completes once the resulting transition to Inactive finishes.
    pub async fn on_raft_fault(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ActorMessage::RaftFault { reply }).await?;
        rx.await.map_err(Into::into)
    }

    /// Idempotent: concurrent callers all complete exactly when the single
    /// drain to Inactive completes, rather than each driving their own.
    pub async fn close_async(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ActorMessage::Close { reply }).await?;
        rx.await.map_err(Into::into)
    }

    pub async fn on_disk_space_available(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::DiskSpaceAvailable { reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    pub async fn on_disk_space_not_available(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::DiskSpaceNotAvailable { reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    pub async fn pause_processing(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::PauseProcessing { reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    pub async fn resume_processing(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::ResumeProcessing { reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    pub async fn trigger_snapshot(&self) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::TriggerSnapshot { reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    pub async fn get_stream_processor(
        &self,
    ) -> Result<Option<Arc<dyn StreamProcessorHandle>>, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ActorMessage::GetStreamProcessor { reply })
            .await?;
        rx.await.map_err(Into::into)
    }

    /// Read directly off the Raft partition handle; safe without an actor
    /// hop since the snapshot store never changes while the actor is alive.
    pub fn get_snapshot_store(&self) -> Arc<dyn crate::raft::SnapshotStoreHandle> {
        self.raft.snapshot_store()
    }

    pub async fn add_failure_listener(
        &self,
        listener: Box<dyn FailureListener>,
    ) -> Result<(), ActorError> {
        self.sender
            .send(ActorMessage::AddFailureListener { listener })
            .await
            .map_err(|_| ActorError::Closed)
    }
}

struct ActorFailureForwarder {
    sender: mpsc::Sender<ActorMessage>,
}

impl FailureListener for ActorFailureForwarder {
    fn on_failure(&self) {
        if self.sender.try_send(ActorMessage::HealthFailure).is_err() {
            warn!("partition actor mailbox full, dropping health-failure edge");
        }
    }

    fn on_recovered(&self) {
        if self.sender.try_send(ActorMessage::HealthRecovered).is_err() {
            warn!("partition actor mailbox full, dropping health-recovered edge");
        }
    }
}

/// Forwards Raft's synchronous callbacks into the mailbox with `try_send`
/// rather than spawning a task per event — spawned tasks would race each
/// other for scheduling and could reorder role changes relative to the order
/// Raft delivered them. A direct, non-blocking send from the calling thread
/// preserves call order exactly and never blocks Raft's own thread.
struct RoleForwarder {
    sender: mpsc::Sender<ActorMessage>,
}

impl RoleChangeListener for RoleForwarder {
    fn on_role_changed(&self, role: Role, term: Term) {
        let (reply, _rx) = oneshot::channel();
        if self
            .sender
            .try_send(ActorMessage::NewRole { role, term, reply })
            .is_err()
        {
            warn!(%term, role = %role, "partition actor mailbox full, dropping role change");
        }
    }
}

struct FaultForwarder {
    sender: mpsc::Sender<ActorMessage>,
}

impl RaftFaultListener for FaultForwarder {
    fn on_raft_fault(&self) {
        let (reply, _rx) = oneshot::channel();
        if self
            .sender
            .try_send(ActorMessage::RaftFault { reply })
            .is_err()
        {
            warn!("partition actor mailbox full, dropping raft fault notification");
        }
    }
}

/// Outcome of one completed transition, carried back from the spawned
/// transition task to the actor loop.
struct TransitionOutcome {
    state: ServiceState,
    result: Result<(), TransitionError>,
    term: Term,
    target_role: ControllerRole,
}

struct ActorState {
    ctx: PartitionContext,
    service_state: Option<ServiceState>,
    installed_role: ControllerRole,
    next_requested: Option<(ControllerRole, Term)>,
    closing: bool,
    closed: bool,
    close_waiters: Vec<oneshot::Sender<()>>,
    raft_fault_waiters: Vec<oneshot::Sender<()>>,
    external_failure_listener: Option<Box<dyn FailureListener>>,
}

/// Drives the actor's public surface; owns its Context and is the only
/// writer to it. Lives entirely inside the task spawned by
/// [`PartitionActor::start`].
struct PartitionActor {
    id: PartitionActorId,
    mailbox: mpsc::Receiver<ActorMessage>,
    state: ActorState,
    in_flight: Option<tokio::task::JoinHandle<TransitionOutcome>>,
    step_deps: StepDeps,
    listeners: Vec<Arc<dyn PartitionListener>>,
    own_probe: Arc<LeafHealthProbe>,
    #[allow(dead_code)]
    supervisor: Arc<HealthSupervisor>,
    raft: Arc<dyn RaftPartitionHandle>,
    role_token: SubscriptionToken,
    fault_token: SubscriptionToken,
}

impl PartitionActorHandle {
    /// Wires up the health supervisor tree and subscriptions, then spawns
    /// the actor task to drive its mailbox loop.
    pub fn start(
        id: PartitionActorId,
        raft: Arc<dyn RaftPartitionHandle>,
        factory: Arc<dyn ServiceFactory>,
        listeners: Vec<Arc<dyn PartitionListener>>,
        options: Options,
    ) -> PartitionActorHandle {
        let (sender, mailbox) = mpsc::channel(options.mailbox_capacity);
        let handle = PartitionActorHandle {
            id,
            sender: sender.clone(),
            raft: raft.clone(),
        };

        // Step 5: start the health supervisor, register this partition's
        // own health probe and the Raft health probe underneath it.
        let supervisor = HealthSupervisor::new(id.to_string());
        let own_probe = Arc::new(LeafHealthProbe::new());
        supervisor.register("controller", own_probe.as_ref());
        supervisor.add_failure_listener(Box::new(ActorFailureForwarder {
            sender: sender.clone(),
        }));

        let fault_forwarder = FaultForwarder {
            sender: sender.clone(),
        };
        let raft_probe = RaftHealthProbe::new(move || fault_forwarder.on_raft_fault());
        supervisor.register("raft", raft_probe.as_ref());
        let fault_token = raft.subscribe_fault(raft_probe.clone());

        // Step 2: register self as Raft role-change listener.
        let role_token = raft.subscribe_role_changes(Arc::new(RoleForwarder {
            sender: sender.clone(),
        }));

        // Step 4: read the current role/term and drive an initial
        // role-change event as if it had just arrived.
        let (initial_role, initial_term) = raft.current_role_and_term();

        let ctx = PartitionContext::new(id, raft.clone());
        let state = ActorState {
            ctx,
            service_state: Some(ServiceState::empty()),
            installed_role: ControllerRole::Inactive,
            next_requested: None,
            closing: false,
            closed: false,
            close_waiters: Vec::new(),
            raft_fault_waiters: Vec::new(),
            external_failure_listener: None,
        };

        let actor = PartitionActor {
            id,
            mailbox,
            state,
            in_flight: None,
            step_deps: StepDeps { factory },
            listeners,
            own_probe,
            supervisor,
            raft,
            role_token,
            fault_token,
        };

        tokio::spawn(actor.run(initial_role, initial_term));

        handle
    }
}

async fn poll_in_flight(
    slot: &mut Option<tokio::task::JoinHandle<TransitionOutcome>>,
) -> TransitionOutcome {
    match slot {
        Some(handle) => {
            let outcome = handle
                .await
                .expect("transition task panicked; this is a bug");
            *slot = None;
            outcome
        }
        None => std::future::pending().await,
    }
}

fn role_label(role: ControllerRole) -> &'static str {
    match role {
        ControllerRole::Leader => "leader",
        ControllerRole::Follower => "follower",
        ControllerRole::Inactive => "inactive",
    }
}

impl PartitionActor {
    async fn run(mut self, initial_role: Role, initial_term: Term) {
        self.dispatch_new_role(initial_role, initial_term);

        loop {
            let in_flight = &mut self.in_flight;
            tokio::select! {
                biased;

                maybe_msg = self.mailbox.recv() => {
                    match maybe_msg {
                        Some(msg) => self.handle_message(msg).await,
                        None => break,
                    }
                }

                outcome = poll_in_flight(in_flight) => {
                    self.handle_transition_complete(outcome).await;
                }
            }

            if self.state.closed {
                break;
            }
        }

        debug!(id = %self.id, "partition actor loop exited");
    }

    async fn handle_message(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::NewRole { role, term, reply } => {
                if !self.state.closing {
                    self.dispatch_new_role(role, term);
                }
                let _ = reply.send(());
            }
            ActorMessage::RaftFault { reply } => {
                self.state.raft_fault_waiters.push(reply);
                if !self.state.closing {
                    self.force_inactive();
                }
            }
            ActorMessage::Close { reply } => {
                if self.state.closed {
                    let _ = reply.send(());
                    return;
                }
                self.state.close_waiters.push(reply);
                if self.state.closing {
                    return;
                }
                self.state.closing = true;
                self.state.next_requested = None;
                if self.in_flight.is_none() {
                    self.start_transition(ControllerRole::Inactive, self.state.ctx.term);
                }
            }
            ActorMessage::HealthFailure => {
                if let Some(listener) = &self.state.external_failure_listener {
                    listener.on_failure();
                }
            }
            ActorMessage::HealthRecovered => {
                if let Some(listener) = &self.state.external_failure_listener {
                    listener.on_recovered();
                }
            }
            ActorMessage::DiskSpaceAvailable { reply } => {
                self.state.ctx.disk_space_available = true;
                self.reconcile_processing().await;
                let _ = reply.send(());
            }
            ActorMessage::DiskSpaceNotAvailable { reply } => {
                self.state.ctx.disk_space_available = false;
                self.reconcile_processing().await;
                let _ = reply.send(());
            }
            ActorMessage::PauseProcessing { reply } => {
                self.state.ctx.processing_paused = true;
                self.reconcile_processing().await;
                let _ = reply.send(());
            }
            ActorMessage::ResumeProcessing { reply } => {
                self.state.ctx.processing_paused = false;
                self.reconcile_processing().await;
                let _ = reply.send(());
            }
            ActorMessage::TriggerSnapshot { reply } => {
                if let Some(state) = &self.state.service_state {
                    if let Some(director) = &state.snapshot_director {
                        director.force_snapshot().await;
                    }
                }
                let _ = reply.send(());
            }
            ActorMessage::GetStreamProcessor { reply } => {
                let handle = self
                    .state
                    .service_state
                    .as_ref()
                    .and_then(|s| s.stream_processor.clone());
                let _ = reply.send(handle);
            }
            ActorMessage::AddFailureListener { listener } => {
                self.state.external_failure_listener = Some(listener);
            }
        }
    }

    /// Collapses `role` relative to the previously installed controller
    /// role and either starts a transition immediately or queues it to run
    /// after the in-flight one.
    fn dispatch_new_role(&mut self, role: Role, term: Term) {
        let previous = self.state.ctx.role;
        // Term is recorded before dispatch regardless of whether this event
        // ends up collapsing to a no-op.
        self.state.ctx.term = term;

        let Some(new_role) = role.to_controller_role(previous) else {
            return;
        };
        self.state.ctx.role = Some(new_role);

        if self.in_flight.is_some() {
            self.state.next_requested = Some((new_role, term));
        } else {
            self.start_transition(new_role, term);
        }
    }

    /// A Raft-level fault bypasses the normal collapsing rule entirely — it
    /// always drives a transition to Inactive.
    fn force_inactive(&mut self) {
        self.state.ctx.role = Some(ControllerRole::Inactive);
        if self.in_flight.is_some() {
            self.state.next_requested = Some((ControllerRole::Inactive, self.state.ctx.term));
        } else {
            self.start_transition(ControllerRole::Inactive, self.state.ctx.term);
        }
    }

    fn start_transition(&mut self, target_role: ControllerRole, term: Term) {
        let previous_recipe = recipe_for(self.state.installed_role, self.step_deps.clone());
        let new_recipe = recipe_for(target_role, self.step_deps.clone());
        let service_state = self
            .state
            .service_state
            .take()
            .expect("no transition already in flight");
        let id = self.id;
        let engine = TransitionEngine::new();

        self.state.installed_role = target_role;

        let handle = tokio::spawn(async move {
            let (state, result) = engine
                .execute(id, service_state, &previous_recipe, &new_recipe)
                .await;
            TransitionOutcome {
                state,
                result,
                term,
                target_role,
            }
        });
        self.in_flight = Some(handle);
    }

    async fn handle_transition_complete(&mut self, outcome: TransitionOutcome) {
        let TransitionOutcome {
            state,
            result,
            term,
            target_role,
        } = outcome;
        self.state.service_state = Some(state);

        // Stale-completion guard: a newer role change already moved
        // `ctx.term` past the term this transition started under. We still
        // keep the installed `ServiceState` (the engine already performed
        // the real teardown/install) but must not call listeners with the
        // stale term.
        let stale = term != self.state.ctx.term;

        match &result {
            Ok(()) => {
                if !stale {
                    self.state.ctx.services_installed = target_role != ControllerRole::Inactive;
                    self.own_probe.set_status(HealthStatus::Healthy);
                }
            }
            Err(err) => {
                warn!(id = %self.id, role = role_label(target_role), %term, error = %err, "transition install failed");
                self.on_install_failure(target_role).await;
            }
        }

        if result.is_ok() && !stale {
            let listener_result = match target_role {
                ControllerRole::Leader => {
                    notify_becoming_leader(&self.listeners, self.id.partition_id, term).await
                }
                ControllerRole::Follower => {
                    notify_becoming_follower(&self.listeners, self.id.partition_id, term).await
                }
                ControllerRole::Inactive => Ok(()),
            };
            if listener_result.is_err() {
                self.on_install_failure(target_role).await;
            } else {
                info!(id = %self.id, role = role_label(target_role), %term, "transition complete");
            }
        } else if result.is_ok() && stale {
            debug!(id = %self.id, role = role_label(target_role), %term, current_term = %self.state.ctx.term, "dropping stale transition completion");
        }

        // The installed handle (if any) now reflects on-disk reality;
        // reconcile pause state against whatever flags changed while this
        // transition was in flight.
        self.reconcile_processing().await;

        if target_role == ControllerRole::Inactive {
            for waiter in self.state.raft_fault_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }

        if let Some((next_role, next_term)) = self.state.next_requested.take() {
            self.start_transition(next_role, next_term);
            return;
        }

        if self.state.closing {
            if target_role == ControllerRole::Inactive {
                self.finalize_close();
            } else {
                self.start_transition(ControllerRole::Inactive, self.state.ctx.term);
            }
        }
    }

    async fn on_install_failure(&mut self, target_role: ControllerRole) {
        record_install_failure(role_label(target_role));
        self.state.ctx.services_installed = false;
        self.own_probe.set_status(HealthStatus::Unhealthy);
        if self.state.ctx.role == Some(ControllerRole::Leader) {
            self.state.ctx.raft.step_down();
        }
    }

    /// Idempotent by contract; safe to call unconditionally whenever flags
    /// change or a transition hands the state back.
    async fn reconcile_processing(&mut self) {
        if let Some(state) = &self.state.service_state {
            if let Some(stream_processor) = &state.stream_processor {
                if self.state.ctx.should_process() {
                    stream_processor.resume_processing().await;
                } else {
                    stream_processor.pause_processing().await;
                }
            }
        }
    }

    fn finalize_close(&mut self) {
        self.raft.unsubscribe_role_changes(self.role_token);
        self.raft.unsubscribe_fault(self.fault_token);
        self.state.closed = true;
        for waiter in self.state.close_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
