// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! What the operator under test sees.
//!
//! An operator implements [`Charm`]. For every delivered event it receives a
//! [`Framework`], its only route to the environment, and an
//! [`EventHandle`] describing the event. Through the framework it can reach
//! the hook tools and Pebble, emit further events (handled depth-first before
//! `emit` returns), and defer the event it is handling.

use std::ops::Deref;

use tracing::debug;

use crate::backend::{ModelBackend, PebbleClient, SimulatedBackend};
use crate::env::DispatchEnv;
use crate::error::{HarnessError, ModelError, ModelResult};
use crate::event::{DeferredEvent, Event, EventOrigin, handle_path};
use crate::state::StatusInfo;
use crate::trace::{EmitRecord, TraceRecord};

/// An operator under test.
pub trait Charm {
    /// Handle one event. Errors abort the dispatch.
    fn handle(&self, fw: &mut Framework<'_>, event: &EventHandle) -> anyhow::Result<()>;
}

/// A [`Charm`] backed by a closure. See [`from_fn`].
#[derive(Clone, Copy)]
pub struct FnCharm<F>(F);

impl<F> Charm for FnCharm<F>
where
    F: Fn(&mut Framework<'_>, &EventHandle) -> anyhow::Result<()>,
{
    fn handle(&self, fw: &mut Framework<'_>, event: &EventHandle) -> anyhow::Result<()> {
        (self.0)(fw, event)
    }
}

impl<F> std::fmt::Debug for FnCharm<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnCharm")
    }
}

/// Build a [`Charm`] from a closure.
///
/// ```rust
/// use charm_scenario::{EventKind, StatusInfo, from_fn};
///
/// let charm = from_fn(|fw, event| {
///     if event.kind == EventKind::Start {
///         fw.model().status_set(StatusInfo::active("ready"), false)?;
///     }
///     Ok(())
/// });
/// # let _ = charm;
/// ```
pub fn from_fn<F>(f: F) -> FnCharm<F>
where
    F: Fn(&mut Framework<'_>, &EventHandle) -> anyhow::Result<()>,
{
    FnCharm(f)
}

/// An event as delivered: the event plus its framework handle.
#[derive(Debug, Clone, PartialEq)]
pub struct EventHandle {
    handle_path: String,
    key: u64,
    name: String,
    origin: EventOrigin,
    event: Event,
}

impl EventHandle {
    /// Framework handle path, e.g. `charm/on/start[3]`.
    pub fn handle_path(&self) -> &str {
        &self.handle_path
    }

    /// Framework key.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Event name as the framework resolved it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the event arrived.
    pub fn origin(&self) -> EventOrigin {
        self.origin
    }

    /// The underlying event.
    pub fn event(&self) -> &Event {
        &self.event
    }
}

impl Deref for EventHandle {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

/// The operator's view of one dispatch.
pub struct Framework<'a> {
    backend: &'a mut SimulatedBackend,
    env: &'a DispatchEnv,
    charm: &'a dyn Charm,
    max_depth: usize,
    next_key: u64,
    stack: Vec<EventHandle>,
    deferred: Vec<(EventOrigin, DeferredEvent)>,
    collected: Option<Vec<StatusInfo>>,
    failed_in: Option<String>,
}

/// What the framework hands back to the runtime when a dispatch ends.
pub(crate) struct FrameworkOutcome {
    pub deferred: Vec<(EventOrigin, DeferredEvent)>,
    pub failed_in: Option<String>,
}

impl<'a> Framework<'a> {
    pub(crate) fn new(
        backend: &'a mut SimulatedBackend,
        env: &'a DispatchEnv,
        charm: &'a dyn Charm,
        max_depth: usize,
        next_key: u64,
    ) -> Self {
        Self {
            backend,
            env,
            charm,
            max_depth,
            next_key,
            stack: Vec::new(),
            deferred: Vec::new(),
            collected: None,
            failed_in: None,
        }
    }

    /// Hook tools.
    pub fn model(&mut self) -> &mut dyn ModelBackend {
        &mut *self.backend
    }

    /// Workload containers.
    pub fn pebble(&mut self) -> &mut dyn PebbleClient {
        &mut *self.backend
    }

    /// The dispatch environment.
    pub fn env(&self) -> &DispatchEnv {
        self.env
    }

    /// This unit's name.
    pub fn unit_name(&self) -> String {
        self.backend.unit_name()
    }

    /// This application's name.
    pub fn app_name(&self) -> String {
        self.backend.app_name()
    }

    /// Nesting depth of the event being handled; 0 for top-level events.
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    /// Emit a custom event and handle it before returning.
    pub fn emit(&mut self, event: Event) -> anyhow::Result<()> {
        if self.stack.len() > self.max_depth {
            return Err(HarnessError::EmitDepthExceeded {
                event: event.name(),
                max_depth: self.max_depth,
                trace: Box::default(),
            }
            .into());
        }
        let key = self.allocate_key();
        let path = handle_path(&event, key);
        self.deliver(event, EventOrigin::Custom, path, key)
    }

    /// Defer the event being handled to the next dispatch.
    pub fn defer(&mut self) -> ModelResult<()> {
        let current = self
            .stack
            .last()
            .ok_or_else(|| ModelError::CannotDefer("no event is being handled".to_string()))?;
        if !current.kind.is_deferrable() {
            return Err(ModelError::CannotDefer(current.name.clone()));
        }
        if self
            .deferred
            .iter()
            .any(|(_, d)| d.handle_path == current.handle_path)
        {
            return Ok(());
        }
        debug!(event = %current.name, handle = %current.handle_path, "deferring event");
        let record = TraceRecord::Defer {
            event: current.name.clone(),
            handle_path: current.handle_path.clone(),
        };
        self.deferred.push((
            current.origin,
            DeferredEvent {
                handle_path: current.handle_path.clone(),
                key: current.key,
                event: current.event.clone(),
            },
        ));
        self.backend.record(record);
        Ok(())
    }

    /// Offer a status while handling a collect-status event. The highest
    /// priority offer is set when the event completes.
    pub fn add_status(&mut self, status: StatusInfo) -> ModelResult<()> {
        match self.collected.as_mut() {
            Some(collected) => {
                collected.push(status);
                Ok(())
            }
            None => Err(ModelError::InvalidStatus(format!(
                "{status} offered outside collect-status"
            ))),
        }
    }

    pub(crate) fn allocate_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.backend.state().leader
    }

    pub(crate) fn deliver(
        &mut self,
        event: Event,
        origin: EventOrigin,
        handle_path: String,
        key: u64,
    ) -> anyhow::Result<()> {
        let name = match origin {
            EventOrigin::External => self.env.event_name().unwrap_or_else(|| event.name()),
            _ => event.name(),
        };
        let depth = self.stack.len();
        debug!(event = %name, ?origin, depth, "delivering event");
        self.backend.record(TraceRecord::Emit(EmitRecord {
            event: name.clone(),
            handle_path: handle_path.clone(),
            origin,
            depth,
        }));

        let handle = EventHandle {
            handle_path,
            key,
            name,
            origin,
            event,
        };
        self.stack.push(handle.clone());
        let charm = self.charm;
        let result = charm.handle(self, &handle);
        self.stack.pop();
        if result.is_err() && self.failed_in.is_none() {
            self.failed_in = Some(handle.name);
        }
        result
    }

    pub(crate) fn begin_collect(&mut self) {
        self.collected = Some(Vec::new());
    }

    pub(crate) fn finish_collect(&mut self) -> Vec<StatusInfo> {
        self.collected.take().unwrap_or_default()
    }

    pub(crate) fn into_outcome(self) -> FrameworkOutcome {
        FrameworkOutcome {
            deferred: self.deferred,
            failed_in: self.failed_in,
        }
    }
}

impl std::fmt::Debug for Framework<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("unit", &self.backend.unit_name())
            .field("depth", &self.depth())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// The offer with the highest priority; the first one wins a tie.
pub(crate) fn highest_priority(statuses: Vec<StatusInfo>) -> Option<StatusInfo> {
    statuses.into_iter().fold(None, |best, status| match best {
        Some(best) if best.name.priority() >= status.name.priority() => Some(best),
        _ => Some(status),
    })
}
