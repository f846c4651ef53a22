// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Test entry point.
//!
//! A [`Context`] pairs an operator's metadata with the harness settings and
//! runs dispatches. It holds nothing mutable, so one context can be shared
//! by any number of tests, including across threads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::error::Result;
use crate::event::Event;
use crate::framework::Charm;
use crate::meta::CharmMeta;
use crate::runtime::{DispatchHooks, Output, Runtime};
use crate::state::State;

/// Runs an operator against States.
#[derive(Debug, Clone)]
pub struct Context {
    meta: Arc<CharmMeta>,
    config: HarnessConfig,
}

impl Context {
    /// A context with default settings.
    pub fn new(meta: CharmMeta) -> Self {
        Self {
            meta: Arc::new(meta),
            config: HarnessConfig::new(),
        }
    }

    /// A context with settings read from `SCENARIO_*` variables.
    pub fn from_env(meta: CharmMeta) -> Result<Self> {
        Ok(Self::new(meta).with_config(HarnessConfig::from_env()?))
    }

    /// Replace the settings.
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// The operator's metadata.
    pub fn meta(&self) -> &CharmMeta {
        &self.meta
    }

    /// Current settings.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Dispatch `event` against a copy of `state`. `state` is never modified.
    pub fn run(&self, charm: &dyn Charm, event: Event, state: &State) -> Result<Output> {
        self.run_with_hooks(charm, event, state, DispatchHooks::default())
    }

    /// [`run`](Self::run) with closures around the event.
    pub fn run_with_hooks(
        &self,
        charm: &dyn Charm,
        event: Event,
        state: &State,
        hooks: DispatchHooks<'_>,
    ) -> Result<Output> {
        Runtime::new(Arc::clone(&self.meta), &self.config).dispatch(charm, &event, state, hooks)
    }

    /// Dispatch a [`Scene`].
    pub fn run_scene(&self, charm: &dyn Charm, scene: &Scene) -> Result<Output> {
        self.run(charm, scene.event.clone(), &scene.state)
    }
}

/// A State and the event to dispatch against it, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Input State.
    #[serde(default)]
    pub state: State,
    /// Event to dispatch.
    pub event: Event,
}

impl Scene {
    /// A scene.
    pub fn new(state: State, event: Event) -> Self {
        Self { state, event }
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
