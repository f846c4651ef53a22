// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend traits for environment access.
//!
//! An operator reaches its environment through two seams:
//! - [`ModelBackend`]: the hook tools (config, relations, secrets, status,
//!   ports, networks, storage, actions, logging, stored state)
//! - [`PebbleClient`]: the per-container workload API
//!
//! Every method has a default that fails with
//! [`ModelError::NotImplemented`], so a backend that does not provide a
//! primitive refuses it loudly instead of returning made-up data.
//! [`SimulatedBackend`] implements both traits against a working copy of a
//! [`State`](crate::State) and records every call in the trace.

mod pebble;
mod relations;
mod secrets;
mod simulated;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};
use crate::state::{
    CheckInfo, CheckLevel, ConfigValue, Databag, ExecOutput, FileInfo, Layer, LogLevel, Network,
    Plan, Port, RelationId, RotatePolicy, SecretOwner, ServiceInfo, StatusInfo,
};

pub use simulated::{ActionOutput, SimulatedBackend};

/// Which revision `secret-get` returns to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretReadMode {
    /// The tracked revision.
    #[default]
    Tracked,
    /// The latest revision, without tracking it.
    Peek,
    /// The latest revision, and track it from now on.
    Refresh,
}

/// Optional metadata for `secret-add` and `secret-set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SecretOptions {
    /// Label.
    #[serde(default)]
    pub label: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Expiry time.
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
    /// Rotation policy.
    #[serde(default)]
    pub rotate: Option<RotatePolicy>,
}

impl SecretOptions {
    /// Options with only a label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

/// Result of `secret-info-get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInfo {
    /// Secret id.
    pub id: String,
    /// Label.
    pub label: Option<String>,
    /// Latest revision.
    pub revision: u32,
    /// Owner.
    pub owner: SecretOwner,
    /// Expiry time.
    pub expires: Option<DateTime<Utc>>,
    /// Rotation policy.
    pub rotation: Option<RotatePolicy>,
    /// Description.
    pub description: Option<String>,
}

fn not_implemented<T>(call: &'static str) -> ModelResult<T> {
    Err(ModelError::NotImplemented { call })
}

/// Hook tools available to an operator.
pub trait ModelBackend {
    /// This unit's name, `<app>/<id>`.
    fn unit_name(&self) -> String;

    /// This application's name.
    fn app_name(&self) -> String;

    /// `is-leader`
    fn is_leader(&mut self) -> ModelResult<bool> {
        not_implemented("is-leader")
    }

    /// `config-get`
    fn config_get(&mut self) -> ModelResult<BTreeMap<String, ConfigValue>> {
        not_implemented("config-get")
    }

    /// `relation-ids`
    fn relation_ids(&mut self, _endpoint: &str) -> ModelResult<Vec<RelationId>> {
        not_implemented("relation-ids")
    }

    /// `relation-list`
    fn relation_list(&mut self, _relation_id: RelationId) -> ModelResult<Vec<String>> {
        not_implemented("relation-list")
    }

    /// Name of the application at the other end of a relation.
    fn relation_remote_app_name(&mut self, _relation_id: RelationId) -> ModelResult<String> {
        not_implemented("relation-remote-app-name")
    }

    /// `relation-get` for the databag owned by `member`.
    fn relation_get(&mut self, _relation_id: RelationId, _member: &str) -> ModelResult<Databag> {
        not_implemented("relation-get")
    }

    /// `relation-set` on the databag owned by `member`. An empty string
    /// removes the key.
    fn relation_set(
        &mut self,
        _relation_id: RelationId,
        _member: &str,
        _key: &str,
        _value: Value,
    ) -> ModelResult<()> {
        not_implemented("relation-set")
    }

    /// `status-get`
    fn status_get(&mut self, _app: bool) -> ModelResult<StatusInfo> {
        not_implemented("status-get")
    }

    /// `status-set`
    fn status_set(&mut self, _status: StatusInfo, _app: bool) -> ModelResult<()> {
        not_implemented("status-set")
    }

    /// `application-version-set`
    fn application_version_set(&mut self, _version: &str) -> ModelResult<()> {
        not_implemented("application-version-set")
    }

    /// `open-port`
    fn open_port(&mut self, _port: Port) -> ModelResult<()> {
        not_implemented("open-port")
    }

    /// `close-port`
    fn close_port(&mut self, _port: Port) -> ModelResult<()> {
        not_implemented("close-port")
    }

    /// `opened-ports`
    fn opened_ports(&mut self) -> ModelResult<Vec<Port>> {
        not_implemented("opened-ports")
    }

    /// `network-get`
    fn network_get(
        &mut self,
        _binding: &str,
        _relation_id: Option<RelationId>,
    ) -> ModelResult<Network> {
        not_implemented("network-get")
    }

    /// `secret-get` by id, label or both. With both, the label is bound to
    /// the secret.
    fn secret_get(
        &mut self,
        _id: Option<&str>,
        _label: Option<&str>,
        _mode: SecretReadMode,
    ) -> ModelResult<Databag> {
        not_implemented("secret-get")
    }

    /// `secret-info-get`
    fn secret_info_get(&mut self, _id: Option<&str>, _label: Option<&str>) -> ModelResult<SecretInfo> {
        not_implemented("secret-info-get")
    }

    /// `secret-add`; returns the new id.
    fn secret_add(
        &mut self,
        _content: Databag,
        _owner: SecretOwner,
        _options: SecretOptions,
    ) -> ModelResult<String> {
        not_implemented("secret-add")
    }

    /// `secret-set`; new content creates a revision.
    fn secret_set(
        &mut self,
        _id: &str,
        _content: Option<Databag>,
        _options: SecretOptions,
    ) -> ModelResult<()> {
        not_implemented("secret-set")
    }

    /// `secret-grant` to the remote application, or to one remote unit.
    fn secret_grant(
        &mut self,
        _id: &str,
        _relation_id: RelationId,
        _unit: Option<&str>,
    ) -> ModelResult<()> {
        not_implemented("secret-grant")
    }

    /// `secret-revoke`
    fn secret_revoke(
        &mut self,
        _id: &str,
        _relation_id: RelationId,
        _unit: Option<&str>,
    ) -> ModelResult<()> {
        not_implemented("secret-revoke")
    }

    /// `secret-remove` of one revision, or the whole secret.
    fn secret_remove(&mut self, _id: &str, _revision: Option<u32>) -> ModelResult<()> {
        not_implemented("secret-remove")
    }

    /// `secret-ids`: secrets owned by this unit or its application.
    fn secret_ids(&mut self) -> ModelResult<Vec<String>> {
        not_implemented("secret-ids")
    }

    /// `storage-list`
    fn storage_list(&mut self, _name: &str) -> ModelResult<Vec<String>> {
        not_implemented("storage-list")
    }

    /// `storage-get`
    fn storage_get(&mut self, _storage_id: &str, _attribute: &str) -> ModelResult<String> {
        not_implemented("storage-get")
    }

    /// `storage-add`
    fn storage_add(&mut self, _name: &str, _count: u32) -> ModelResult<()> {
        not_implemented("storage-add")
    }

    /// `action-get`
    fn action_get(&mut self) -> ModelResult<Map<String, Value>> {
        not_implemented("action-get")
    }

    /// `action-set`
    fn action_set(&mut self, _results: Map<String, Value>) -> ModelResult<()> {
        not_implemented("action-set")
    }

    /// `action-log`
    fn action_log(&mut self, _message: &str) -> ModelResult<()> {
        not_implemented("action-log")
    }

    /// `action-fail`
    fn action_fail(&mut self, _message: &str) -> ModelResult<()> {
        not_implemented("action-fail")
    }

    /// `juju-log`
    fn juju_log(&mut self, _level: LogLevel, _message: &str) -> ModelResult<()> {
        not_implemented("juju-log")
    }

    /// Load stored state by framework handle path; missing state is empty.
    fn stored_state_get(&mut self, _handle_path: &str) -> ModelResult<Map<String, Value>> {
        not_implemented("stored-state-get")
    }

    /// Replace stored state at a framework handle path.
    fn stored_state_set(
        &mut self,
        _handle_path: &str,
        _content: Map<String, Value>,
    ) -> ModelResult<()> {
        not_implemented("stored-state-set")
    }
}

/// Workload container API.
pub trait PebbleClient {
    /// Whether Pebble in `container` answers.
    fn can_connect(&mut self, _container: &str) -> bool {
        false
    }

    /// Combined plan.
    fn get_plan(&mut self, _container: &str) -> ModelResult<Plan> {
        not_implemented("pebble-get-plan")
    }

    /// Add a layer, or fold it into an existing one when `combine` is set.
    fn add_layer(
        &mut self,
        _container: &str,
        _label: &str,
        _layer: &Layer,
        _combine: bool,
    ) -> ModelResult<()> {
        not_implemented("pebble-add-layer")
    }

    /// Start enabled services and restart changed ones.
    fn replan(&mut self, _container: &str) -> ModelResult<()> {
        not_implemented("pebble-replan")
    }

    /// Status of the named services, or all when `names` is empty.
    fn get_services(&mut self, _container: &str, _names: &[&str]) -> ModelResult<Vec<ServiceInfo>> {
        not_implemented("pebble-get-services")
    }

    /// Start services.
    fn start_services(&mut self, _container: &str, _names: &[&str]) -> ModelResult<()> {
        not_implemented("pebble-start")
    }

    /// Stop services.
    fn stop_services(&mut self, _container: &str, _names: &[&str]) -> ModelResult<()> {
        not_implemented("pebble-stop")
    }

    /// Restart services.
    fn restart_services(&mut self, _container: &str, _names: &[&str]) -> ModelResult<()> {
        not_implemented("pebble-restart")
    }

    /// Write a file.
    fn push(
        &mut self,
        _container: &str,
        _path: &str,
        _data: &[u8],
        _make_dirs: bool,
    ) -> ModelResult<()> {
        not_implemented("pebble-push")
    }

    /// Read a file.
    fn pull(&mut self, _container: &str, _path: &str) -> ModelResult<Vec<u8>> {
        not_implemented("pebble-pull")
    }

    /// List a directory.
    fn list_files(&mut self, _container: &str, _path: &str) -> ModelResult<Vec<FileInfo>> {
        not_implemented("pebble-list-files")
    }

    /// Create a directory.
    fn make_dir(&mut self, _container: &str, _path: &str, _make_parents: bool) -> ModelResult<()> {
        not_implemented("pebble-make-dir")
    }

    /// Remove a path.
    fn remove_path(&mut self, _container: &str, _path: &str, _recursive: bool) -> ModelResult<()> {
        not_implemented("pebble-remove-path")
    }

    /// Run a command and wait for it; non-zero exit is an error.
    fn exec(&mut self, _container: &str, _command: &[&str]) -> ModelResult<ExecOutput> {
        not_implemented("pebble-exec")
    }

    /// Check states, filtered by level and names.
    fn get_checks(
        &mut self,
        _container: &str,
        _level: Option<CheckLevel>,
        _names: &[&str],
    ) -> ModelResult<Vec<CheckInfo>> {
        not_implemented("pebble-get-checks")
    }

    /// Start checks; returns the ones that changed.
    fn start_checks(&mut self, _container: &str, _names: &[&str]) -> ModelResult<Vec<String>> {
        not_implemented("pebble-start-checks")
    }

    /// Stop checks; returns the ones that changed.
    fn stop_checks(&mut self, _container: &str, _names: &[&str]) -> ModelResult<Vec<String>> {
        not_implemented("pebble-stop-checks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    impl ModelBackend for NullBackend {
        fn unit_name(&self) -> String {
            "app/0".to_string()
        }

        fn app_name(&self) -> String {
            "app".to_string()
        }
    }

    impl PebbleClient for NullBackend {}

    #[test]
    fn test_defaults_refuse_with_not_implemented() {
        let mut backend = NullBackend;
        assert_eq!(
            backend.config_get(),
            Err(ModelError::NotImplemented { call: "config-get" })
        );
        let err = backend.relation_get(1, "app").unwrap_err();
        assert_eq!(err.code(), "NotImplementedError");
        assert!(!backend.can_connect("workload"));
        assert!(matches!(
            backend.pull("workload", "/etc/x"),
            Err(ModelError::NotImplemented { call: "pebble-pull" })
        ));
    }
}
