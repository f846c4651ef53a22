// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pebble layer, plan, service and check types.
//!
//! Layers are combined in order into a plan. A service or check that already
//! exists in the plan is merged or replaced according to its `override`
//! field; a layer that redefines an existing entry without one is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a layer entry combines with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    /// Overwrite set fields, extend maps and lists.
    Merge,
    /// Drop the old definition entirely.
    Replace,
}

/// Whether `replan` starts a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    /// Started by replan.
    Enabled,
    /// Only started explicitly.
    #[default]
    Disabled,
}

/// Current state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Running.
    Active,
    /// Not running.
    #[default]
    Inactive,
    /// Exited and not restarting.
    Error,
}

/// A service definition inside a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Service {
    /// Combination rule.
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_kind: Option<Override>,
    /// One-line summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Start on replan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<Startup>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Run as this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Start after these services.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    /// Start before these services.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    /// Services that must also run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

impl Service {
    /// A merge-override service running `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            override_kind: Some(Override::Merge),
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Set the override kind.
    pub fn with_override(mut self, kind: Override) -> Self {
        self.override_kind = Some(kind);
        self
    }

    /// Set the startup mode.
    pub fn with_startup(mut self, startup: Startup) -> Self {
        self.startup = Some(startup);
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    fn merge(&mut self, other: &Service) {
        self.override_kind = other.override_kind.or(self.override_kind);
        merge_opt(&mut self.summary, &other.summary);
        merge_opt(&mut self.command, &other.command);
        merge_opt(&mut self.user, &other.user);
        if other.startup.is_some() {
            self.startup = other.startup;
        }
        self.environment.extend(other.environment.clone());
        self.after.extend(other.after.iter().cloned());
        self.before.extend(other.before.iter().cloned());
        self.requires.extend(other.requires.iter().cloned());
    }
}

/// Check severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckLevel {
    /// Liveness.
    Alive,
    /// Readiness.
    Ready,
}

/// Current state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Passing.
    #[default]
    Up,
    /// Failing past its threshold.
    Down,
    /// Stopped.
    Inactive,
}

/// A health check definition inside a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Check {
    /// Combination rule.
    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_kind: Option<Override>,
    /// Severity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<CheckLevel>,
    /// Interval between runs, e.g. `10s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Failures before the check is down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    /// Command run by an exec check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    /// URL fetched by an http check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    /// Port probed by a tcp check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<u16>,
}

impl Check {
    fn merge(&mut self, other: &Check) {
        self.override_kind = other.override_kind.or(self.override_kind);
        if other.level.is_some() {
            self.level = other.level;
        }
        if other.threshold.is_some() {
            self.threshold = other.threshold;
        }
        if other.tcp.is_some() {
            self.tcp = other.tcp;
        }
        merge_opt(&mut self.period, &other.period);
        merge_opt(&mut self.exec, &other.exec);
        merge_opt(&mut self.http, &other.http);
    }
}

fn merge_opt(target: &mut Option<String>, other: &Option<String>) {
    if other.is_some() {
        target.clone_from(other);
    }
}

/// A Pebble configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Layer {
    /// One-line summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Services by name.
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    /// Checks by name.
    #[serde(default)]
    pub checks: BTreeMap<String, Check>,
}

impl Layer {
    /// An empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service.
    pub fn with_service(mut self, name: impl Into<String>, service: Service) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Add a check.
    pub fn with_check(mut self, name: impl Into<String>, check: Check) -> Self {
        self.checks.insert(name.into(), check);
        self
    }

    /// Fold `other` into this layer.
    pub fn combine(&mut self, other: &Layer) -> Result<(), String> {
        if other.summary.is_some() {
            self.summary.clone_from(&other.summary);
        }
        if other.description.is_some() {
            self.description.clone_from(&other.description);
        }
        for (name, service) in &other.services {
            match (self.services.get_mut(name), service.override_kind) {
                (None, _) | (Some(_), Some(Override::Replace)) => {
                    self.services.insert(name.clone(), service.clone());
                }
                (Some(existing), Some(Override::Merge)) => existing.merge(service),
                (Some(_), None) => {
                    return Err(format!(
                        "layer must define \"override\" for service \"{name}\""
                    ));
                }
            }
        }
        for (name, check) in &other.checks {
            match (self.checks.get_mut(name), check.override_kind) {
                (None, _) | (Some(_), Some(Override::Replace)) => {
                    self.checks.insert(name.clone(), check.clone());
                }
                (Some(existing), Some(Override::Merge)) => existing.merge(check),
                (Some(_), None) => {
                    return Err(format!("layer must define \"override\" for check \"{name}\""));
                }
            }
        }
        Ok(())
    }
}

/// A layer with its label, in the order it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledLayer {
    /// Layer label.
    pub label: String,
    /// Layer content.
    pub layer: Layer,
}

/// The effective configuration produced by combining all layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Plan {
    /// Services by name.
    pub services: BTreeMap<String, Service>,
    /// Checks by name.
    pub checks: BTreeMap<String, Check>,
}

impl Plan {
    /// Combine `layers` in order.
    pub fn from_layers(layers: &[LabeledLayer]) -> Result<Self, String> {
        let mut combined = Layer::new();
        for labeled in layers {
            combined
                .combine(&labeled.layer)
                .map_err(|e| format!("layer \"{}\": {e}", labeled.label))?;
        }
        Ok(Self {
            services: combined.services,
            checks: combined.checks,
        })
    }
}

/// Service status as reported by `get_services`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Startup mode from the plan.
    pub startup: Startup,
    /// Current state.
    pub current: ServiceStatus,
}

impl ServiceInfo {
    /// Whether the service is running.
    pub fn is_running(&self) -> bool {
        self.current == ServiceStatus::Active
    }
}

/// Check state as reported by `get_checks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInfo {
    /// Check name.
    pub name: String,
    /// Severity.
    #[serde(default)]
    pub level: Option<CheckLevel>,
    /// Current state.
    #[serde(default)]
    pub status: CheckStatus,
    /// Consecutive failures.
    #[serde(default)]
    pub failures: u32,
    /// Failures before the check is down.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
}

fn default_threshold() -> u32 {
    3
}

impl CheckInfo {
    /// A check that is up with no failures.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: None,
            status: CheckStatus::Up,
            failures: 0,
            threshold: default_threshold(),
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: CheckStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the failure count.
    pub fn with_failures(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }

    /// Set the level.
    pub fn with_level(mut self, level: CheckLevel) -> Self {
        self.level = Some(level);
        self
    }
}
