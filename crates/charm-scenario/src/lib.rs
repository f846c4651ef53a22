// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Charm Scenario - state-transition testing for event-driven Juju operators.
//!
//! A test describes everything the unit can observe as a [`State`], picks an
//! [`Event`], and runs the operator once. The operator talks to a simulated
//! backend instead of a live controller; the test gets back a new State and a
//! [`Trace`] of every hook tool call and event delivery.
//!
//! ```text
//! input State ──► Context::run(charm, event) ──► Output { state, trace, action }
//!                       │
//!                       ├─ Preparing          check State and Event, copy State
//!                       ├─ Executing          deliver event, nested emits depth-first
//!                       ├─ DrainingDeferrals  redeliver the queued events once
//!                       └─ Committing         collect-status, pre-commit, commit
//! ```
//!
//! # Features
//!
//! - **Copy isolation**: the input State is never modified; every dispatch
//!   owns its backend and its copy.
//! - **Access rules**: relation databag ownership, leadership, secret grants
//!   and Pebble connectivity fail the way the real agent fails.
//! - **Deferral**: deferred events persist in `State::deferred` and are
//!   redelivered, once, on the next dispatch.
//! - **Trace**: calls, emissions and deferrals in the exact order they
//!   happened.
//!
//! # Quick Start
//!
//! ```rust
//! use charm_scenario::{CharmMeta, Context, Event, EventKind, Relation, State, from_fn};
//!
//! let ctx = Context::new(CharmMeta::new("web").with_requires("db", "pg"));
//! let charm = from_fn(|fw, event| {
//!     if event.kind == EventKind::RelationChanged {
//!         let id = event.relation_id().unwrap_or_default();
//!         let unit = fw.unit_name();
//!         fw.model().relation_set(id, &unit, "k", "v".into())?;
//!     }
//!     Ok(())
//! });
//!
//! let relation = Relation::new(1, "db", "pg");
//! let state = State::new().with_leader(true).with_relation(relation.clone());
//! let out = ctx.run(&charm, Event::relation_changed(&relation), &state).unwrap();
//!
//! assert_eq!(out.state.relation(1).unwrap().local_unit_data["k"], "v");
//! assert_eq!(out.trace.successful_calls("relation-set").count(), 1);
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SCENARIO_JUJU_VERSION` | `3.4.0` | Simulated Juju version |
//! | `SCENARIO_MAX_EMIT_DEPTH` | `32` | Bound on nested custom events |
//! | `SCENARIO_FRAMEWORK_EVENTS` | `true` | Deliver `pre-commit` and `commit` |
//! | `SCENARIO_CHARM_DIR` | `/var/lib/juju/charm` | `JUJU_CHARM_DIR` in the shim |
//! | `SCENARIO_DEBUG` | `false` | Set `JUJU_DEBUG` in the shim |
//!
//! The library never installs a `tracing` subscriber; binaries and tests do.
//! Operator `juju-log` lines are forwarded under the `charm` target.

#![deny(missing_docs)]

pub mod backend;
pub mod config;
pub mod consistency;
pub mod context;
pub mod env;
pub mod error;
pub mod event;
pub mod framework;
pub mod meta;
pub mod runtime;
pub mod sequences;
pub mod state;
pub mod trace;

// Main types
pub use context::{Context, Scene};
pub use error::{HarnessError, ModelError, ModelResult, Result};
pub use event::{Action, DeferredEvent, Event, EventKind, EventOrigin};
pub use framework::{Charm, EventHandle, FnCharm, Framework, from_fn};
pub use runtime::{DispatchHooks, DispatchPhase, Output};
pub use trace::{CallOutcome, CallRecord, EmitRecord, Trace, TraceRecord};

// Configuration and metadata
pub use config::{ConfigError, HarnessConfig, JujuVersion};
pub use meta::{
    ActionMeta, ActionParam, CharmMeta, ConfigOption, ConfigType, ContainerMeta, ParamType,
    StorageMeta,
};

// State documents
pub use state::{
    Check, CheckInfo, CheckStatus, ConfigValue, Container, ExecOutput, JujuLogLine, Layer,
    LogLevel, Mount, Network, Port, Relation, Secret, SecretOwner, Service, ServiceStatus, State,
    Status, StatusInfo, StatusName, Storage, StoredState,
};

// Backend seam
pub use backend::{
    ActionOutput, ModelBackend, PebbleClient, SecretInfo, SecretOptions, SecretReadMode,
    SimulatedBackend,
};

// Sequences
pub use sequences::{check_builtin_sequences, startup_sequence, teardown_sequence};
