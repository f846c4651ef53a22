// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The dispatch state machine.
//!
//! One [`Runtime::dispatch`] walks these phases:
//!
//! 1. **Preparing**: validate the event and the State, copy the State into a
//!    fresh [`SimulatedBackend`], build the environment shim.
//! 2. **Executing**: run the pre-event hook, then deliver the event. Custom
//!    events the operator emits are handled depth-first.
//! 3. **DrainingDeferrals**: redeliver every event that was already in the
//!    deferred queue, once each, in queue order. Events deferred during this
//!    dispatch wait for the next one.
//! 4. **Committing**: run the post-event hook, collect statuses, deliver
//!    `pre-commit` and `commit`.
//! 5. **Done** with the output State, or **Failed** with the operator's
//!    error and the trace up to the failure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::backend::{ActionOutput, SimulatedBackend};
use crate::config::HarnessConfig;
use crate::consistency::{check_event, check_state};
use crate::env::DispatchEnv;
use crate::error::{HarnessError, Result};
use crate::event::{DeferredEvent, Event, EventKind, EventOrigin, handle_path};
use crate::framework::{Charm, Framework, highest_priority};
use crate::meta::CharmMeta;
use crate::state::State;
use crate::trace::Trace;

/// Where a dispatch is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// Not started.
    Idle,
    /// Validating and setting up.
    Preparing,
    /// Delivering the dispatched event.
    Executing,
    /// Redelivering previously deferred events.
    DrainingDeferrals,
    /// Post-event hook, status collection and commit events.
    Committing,
    /// Finished with an output State.
    Done,
    /// Aborted.
    Failed,
}

/// A caller-supplied closure run against the framework.
pub type Hook<'a> = &'a dyn Fn(&mut Framework<'_>) -> anyhow::Result<()>;

/// Closures run around the dispatched event.
#[derive(Default, Clone, Copy)]
pub struct DispatchHooks<'a> {
    /// Runs before the dispatched event is delivered.
    pub pre_event: Option<Hook<'a>>,
    /// Runs after deferred events are drained, before commit.
    pub post_event: Option<Hook<'a>>,
}

impl std::fmt::Debug for DispatchHooks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHooks")
            .field("pre_event", &self.pre_event.is_some())
            .field("post_event", &self.post_event.is_some())
            .finish()
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Output {
    /// The State after the dispatch.
    pub state: State,
    /// Everything the dispatch recorded.
    pub trace: Trace,
    /// What the action handler reported, for action events.
    pub action: Option<ActionOutput>,
}

impl Output {
    /// Whether the action handler called `action-fail`.
    pub fn action_failed(&self) -> bool {
        self.action.as_ref().is_some_and(ActionOutput::failed)
    }

    /// Results set by the action handler.
    pub fn action_results(&self) -> Option<&Map<String, Value>> {
        self.action.as_ref().map(|a| &a.results)
    }
}

/// Runs one dispatch.
#[derive(Debug)]
pub struct Runtime<'a> {
    meta: Arc<CharmMeta>,
    config: &'a HarnessConfig,
    phase: DispatchPhase,
}

impl<'a> Runtime<'a> {
    /// A runtime for operators described by `meta`.
    pub fn new(meta: Arc<CharmMeta>, config: &'a HarnessConfig) -> Self {
        Self {
            meta,
            config,
            phase: DispatchPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> DispatchPhase {
        self.phase
    }

    fn transition(&mut self, next: DispatchPhase) {
        debug!(from = ?self.phase, to = ?next, "dispatch phase");
        self.phase = next;
    }

    /// Dispatch `event` to `charm` against a copy of `state`.
    #[instrument(skip_all, fields(event = %event.name(), unit = state.unit_id))]
    pub fn dispatch(
        &mut self,
        charm: &dyn Charm,
        event: &Event,
        state: &State,
        hooks: DispatchHooks<'_>,
    ) -> Result<Output> {
        self.transition(DispatchPhase::Preparing);
        if let Err(err) = check_event(event, state, &self.meta)
            .and_then(|()| check_state(state, &self.meta, self.config))
        {
            warn!(error = %err, "dispatch rejected");
            self.transition(DispatchPhase::Failed);
            return Err(err);
        }

        let mut working = state.clone();
        let pending = std::mem::take(&mut working.deferred);
        let next_key = pending.iter().map(|d| d.key).max().map_or(1, |k| k + 1);
        let env = DispatchEnv::build(event, state, &self.meta, self.config);
        let mut backend = SimulatedBackend::new(
            working,
            Arc::clone(&self.meta),
            self.config.juju_version,
            event,
        );

        let (result, outcome) = {
            let mut fw = Framework::new(
                &mut backend,
                &env,
                charm,
                self.config.max_emit_depth,
                next_key,
            );
            let result = self.execute(&mut fw, event, &pending, hooks);
            (result, fw.into_outcome())
        };

        if let Err(error) = result {
            let failed_in = outcome.failed_in.unwrap_or_else(|| event.name());
            warn!(failed_in = %failed_in, error = %error, "charm raised");
            self.transition(DispatchPhase::Failed);
            let trace = Box::new(backend.take_trace());
            return Err(match error.downcast::<HarnessError>() {
                Ok(HarnessError::EmitDepthExceeded {
                    event, max_depth, ..
                }) => HarnessError::EmitDepthExceeded {
                    event,
                    max_depth,
                    trace,
                },
                Ok(other) => HarnessError::UncaughtCharm {
                    event: failed_in,
                    error: other.into(),
                    trace,
                },
                Err(error) => HarnessError::UncaughtCharm {
                    event: failed_in,
                    error,
                    trace,
                },
            });
        }

        let (redelivered, fresh): (Vec<_>, Vec<_>) = outcome
            .deferred
            .into_iter()
            .partition(|(origin, _)| *origin == EventOrigin::Redelivered);
        let queue: Vec<DeferredEvent> = redelivered
            .into_iter()
            .chain(fresh)
            .map(|(_, deferred)| deferred)
            .collect();
        backend.state_mut().deferred = queue;

        let (state, trace, action) = backend.into_parts();
        self.transition(DispatchPhase::Done);
        info!(
            records = trace.len(),
            deferred = state.deferred.len(),
            "dispatch complete"
        );
        Ok(Output {
            state,
            trace,
            action,
        })
    }

    fn execute(
        &mut self,
        fw: &mut Framework<'_>,
        event: &Event,
        pending: &[DeferredEvent],
        hooks: DispatchHooks<'_>,
    ) -> anyhow::Result<()> {
        if let Some(pre_event) = hooks.pre_event {
            pre_event(fw)?;
        }

        self.transition(DispatchPhase::Executing);
        let key = fw.allocate_key();
        fw.deliver(event.clone(), EventOrigin::External, handle_path(event, key), key)?;

        self.transition(DispatchPhase::DrainingDeferrals);
        for deferred in pending {
            fw.deliver(
                deferred.event.clone(),
                EventOrigin::Redelivered,
                deferred.handle_path.clone(),
                deferred.key,
            )?;
        }

        self.transition(DispatchPhase::Committing);
        if let Some(post_event) = hooks.post_event {
            post_event(fw)?;
        }
        if fw.is_leader() {
            self.collect_status(fw, Event::collect_app_status(), true)?;
        }
        self.collect_status(fw, Event::collect_unit_status(), false)?;
        if self.config.framework_events {
            for lifecycle in [Event::new(EventKind::PreCommit), Event::new(EventKind::Commit)] {
                let key = fw.allocate_key();
                let path = handle_path(&lifecycle, key);
                fw.deliver(lifecycle, EventOrigin::Lifecycle, path, key)?;
            }
        }
        Ok(())
    }

    fn collect_status(
        &self,
        fw: &mut Framework<'_>,
        event: Event,
        app: bool,
    ) -> anyhow::Result<()> {
        fw.begin_collect();
        let key = fw.allocate_key();
        let path = handle_path(&event, key);
        let delivered = fw.deliver(event, EventOrigin::Lifecycle, path, key);
        let offered = fw.finish_collect();
        delivered?;
        if let Some(status) = highest_priority(offered) {
            debug!(status = %status, app, "collected status");
            fw.model().status_set(status, app)?;
        }
        Ok(())
    }
}
