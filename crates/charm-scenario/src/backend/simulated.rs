// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend over an in-memory State.
//!
//! `SimulatedBackend` owns the working copy of the dispatch's State. Each
//! trait method runs through [`SimulatedBackend::traced`], which applies the
//! operation and appends a call record with its outcome, so there is exactly
//! one place where calls are recorded.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use super::{ModelBackend, SecretInfo, SecretOptions, SecretReadMode};
use crate::config::JujuVersion;
use crate::error::{ModelError, ModelResult};
use crate::event::Event;
use crate::meta::CharmMeta;
use crate::state::{
    ConfigValue, Databag, JujuLogLine, LogLevel, Network, Port, Protocol, RelationId,
    SecretOwner, State, StatusInfo, StoredState,
};
use crate::trace::{CallOutcome, CallRecord, Trace, TraceRecord};

static ACTION_RESULT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9.-]*[a-z0-9])?$").expect("action key regex is valid")
});

const RESERVED_ACTION_KEYS: [&str; 4] = ["stdout", "stderr", "stdout-encoding", "stderr-encoding"];

/// What an action handler reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionOutput {
    /// Values set with `action-set`.
    pub results: Map<String, Value>,
    /// Messages from `action-log`, in order.
    pub logs: Vec<String>,
    /// Message from `action-fail`, if called.
    pub failure: Option<String>,
}

impl ActionOutput {
    /// Whether the handler called `action-fail`.
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug)]
struct ActionContext {
    params: Map<String, Value>,
    output: ActionOutput,
}

/// [`ModelBackend`] and [`PebbleClient`](super::PebbleClient) over a working
/// copy of a State.
#[derive(Debug)]
pub struct SimulatedBackend {
    pub(super) state: State,
    pub(super) meta: Arc<CharmMeta>,
    pub(super) juju_version: JujuVersion,
    pub(super) hook: Event,
    trace: Trace,
    action: Option<ActionContext>,
}

impl SimulatedBackend {
    /// Back `hook`'s dispatch with `state`.
    pub fn new(state: State, meta: Arc<CharmMeta>, juju_version: JujuVersion, hook: &Event) -> Self {
        let action = hook.action.as_ref().map(|action| ActionContext {
            params: meta
                .actions
                .get(&action.name)
                .map(|m| m.with_defaults(&action.params))
                .unwrap_or_else(|| action.params.clone()),
            output: ActionOutput::default(),
        });
        Self {
            state,
            meta,
            juju_version,
            hook: hook.clone(),
            trace: Trace::new(),
            action,
        }
    }

    /// The working State.
    pub fn state(&self) -> &State {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Charm metadata.
    pub fn meta(&self) -> &CharmMeta {
        &self.meta
    }

    /// Records so far.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub(crate) fn record(&mut self, record: TraceRecord) {
        self.trace.push(record);
    }

    pub(crate) fn take_trace(&mut self) -> Trace {
        std::mem::take(&mut self.trace)
    }

    /// Final State, trace and action output.
    pub fn into_parts(self) -> (State, Trace, Option<ActionOutput>) {
        (self.state, self.trace, self.action.map(|a| a.output))
    }

    pub(super) fn traced<T: Serialize>(
        &mut self,
        call: &'static str,
        args: Value,
        op: impl FnOnce(&mut Self) -> ModelResult<T>,
    ) -> ModelResult<T> {
        self.traced_with(call, args, op, |value| {
            serde_json::to_value(value).unwrap_or(Value::Null)
        })
    }

    pub(super) fn traced_with<T>(
        &mut self,
        call: &'static str,
        args: Value,
        op: impl FnOnce(&mut Self) -> ModelResult<T>,
        summarize: impl FnOnce(&T) -> Value,
    ) -> ModelResult<T> {
        let result = op(self);
        let outcome = match &result {
            Ok(value) => {
                debug!(call, "backend call");
                CallOutcome::Ok {
                    value: summarize(value),
                }
            }
            Err(err) => {
                debug!(call, code = err.code(), error = %err, "backend call failed");
                CallOutcome::Err {
                    code: err.code().to_string(),
                    message: err.to_string(),
                }
            }
        };
        self.trace.push(TraceRecord::Call(CallRecord {
            call: call.to_string(),
            args,
            outcome,
        }));
        result
    }

    pub(super) fn require_version(
        &self,
        call: &'static str,
        minimum: JujuVersion,
        required: &'static str,
    ) -> ModelResult<()> {
        if self.juju_version >= minimum {
            Ok(())
        } else {
            Err(ModelError::JujuVersionTooOld {
                call,
                required,
                running: self.juju_version.to_string(),
            })
        }
    }

    fn action_context(&mut self, call: &'static str) -> ModelResult<&mut ActionContext> {
        self.action
            .as_mut()
            .ok_or(ModelError::NotInAction { call })
    }
}

fn validate_port(port: Port) -> ModelResult<()> {
    match (port.protocol, port.port) {
        (Protocol::Icmp, None) => Ok(()),
        (Protocol::Icmp, Some(n)) => Err(ModelError::InvalidPort(format!(
            "icmp takes no port number, got {n}"
        ))),
        (protocol, None | Some(0)) => Err(ModelError::InvalidPort(format!(
            "{protocol} requires a port between 1 and 65535"
        ))),
        _ => Ok(()),
    }
}

fn validate_action_results(results: &Map<String, Value>) -> ModelResult<()> {
    for (key, value) in results {
        if RESERVED_ACTION_KEYS.contains(&key.as_str()) || !ACTION_RESULT_KEY.is_match(key) {
            return Err(ModelError::InvalidActionResult(key.clone()));
        }
        if let Value::Object(nested) = value {
            validate_action_results(nested)?;
        }
    }
    Ok(())
}

impl ModelBackend for SimulatedBackend {
    fn unit_name(&self) -> String {
        format!("{}/{}", self.meta.name, self.state.unit_id)
    }

    fn app_name(&self) -> String {
        self.meta.name.clone()
    }

    fn is_leader(&mut self) -> ModelResult<bool> {
        self.traced("is-leader", json!({}), |b| Ok(b.state.leader))
    }

    fn config_get(&mut self) -> ModelResult<BTreeMap<String, ConfigValue>> {
        self.traced("config-get", json!({}), |b| {
            Ok(b.meta.effective_config(&b.state.config))
        })
    }

    fn relation_ids(&mut self, endpoint: &str) -> ModelResult<Vec<RelationId>> {
        self.traced("relation-ids", json!({ "endpoint": endpoint }), |b| {
            Ok(b.state.relations_on(endpoint).map(|r| r.id).collect())
        })
    }

    fn relation_list(&mut self, relation_id: RelationId) -> ModelResult<Vec<String>> {
        self.traced(
            "relation-list",
            json!({ "relation_id": relation_id }),
            |b| b.list_relation_units(relation_id),
        )
    }

    fn relation_remote_app_name(&mut self, relation_id: RelationId) -> ModelResult<String> {
        self.traced(
            "relation-remote-app-name",
            json!({ "relation_id": relation_id }),
            |b| {
                let app = b.app_name();
                b.relation(relation_id)
                    .map(|r| r.remote_app(&app).to_string())
            },
        )
    }

    fn relation_get(&mut self, relation_id: RelationId, member: &str) -> ModelResult<Databag> {
        self.traced(
            "relation-get",
            json!({ "relation_id": relation_id, "member": member }),
            |b| b.read_databag(relation_id, member),
        )
    }

    fn relation_set(
        &mut self,
        relation_id: RelationId,
        member: &str,
        key: &str,
        value: Value,
    ) -> ModelResult<()> {
        let args = json!({
            "relation_id": relation_id,
            "member": member,
            "key": key,
            "value": value,
        });
        self.traced("relation-set", args, |b| {
            b.write_databag(relation_id, member, key, value)
        })
    }

    fn status_get(&mut self, app: bool) -> ModelResult<StatusInfo> {
        self.traced("status-get", json!({ "application": app }), |b| {
            if app {
                if !b.state.leader {
                    return Err(ModelError::LeadershipRequired {
                        call: "status-get --application",
                    });
                }
                Ok(b.state.status.app.clone())
            } else {
                Ok(b.state.status.unit.clone())
            }
        })
    }

    fn status_set(&mut self, status: StatusInfo, app: bool) -> ModelResult<()> {
        let args = json!({
            "status": status.name,
            "message": status.message,
            "application": app,
        });
        self.traced("status-set", args, |b| {
            if !status.name.is_settable() {
                return Err(ModelError::InvalidStatus(status.name.to_string()));
            }
            if app && !b.state.leader {
                return Err(ModelError::LeadershipRequired {
                    call: "status-set --application",
                });
            }
            let statuses = &mut b.state.status;
            let (current, history) = if app {
                (&mut statuses.app, &mut statuses.app_history)
            } else {
                (&mut statuses.unit, &mut statuses.unit_history)
            };
            history.push(std::mem::replace(current, status));
            Ok(())
        })
    }

    fn application_version_set(&mut self, version: &str) -> ModelResult<()> {
        self.traced(
            "application-version-set",
            json!({ "version": version }),
            |b| {
                b.state.status.app_version = version.to_string();
                Ok(())
            },
        )
    }

    fn open_port(&mut self, port: Port) -> ModelResult<()> {
        self.traced("open-port", json!({ "port": port }), |b| {
            b.require_version("open-port", JujuVersion::new(3, 1, 0), "3.1")?;
            validate_port(port)?;
            b.state.opened_ports.insert(port);
            Ok(())
        })
    }

    fn close_port(&mut self, port: Port) -> ModelResult<()> {
        self.traced("close-port", json!({ "port": port }), |b| {
            b.require_version("close-port", JujuVersion::new(3, 1, 0), "3.1")?;
            validate_port(port)?;
            b.state.opened_ports.remove(&port);
            Ok(())
        })
    }

    fn opened_ports(&mut self) -> ModelResult<Vec<Port>> {
        self.traced("opened-ports", json!({}), |b| {
            b.require_version("opened-ports", JujuVersion::new(3, 1, 0), "3.1")?;
            Ok(b.state.opened_ports.iter().copied().collect())
        })
    }

    fn network_get(&mut self, binding: &str, relation_id: Option<RelationId>) -> ModelResult<Network> {
        let args = json!({ "binding": binding, "relation_id": relation_id });
        self.traced("network-get", args, |b| {
            if let Some(id) = relation_id {
                b.relation(id)?;
            }
            if let Some(network) = b.state.networks.get(binding) {
                return Ok(network.clone());
            }
            if b.meta.has_binding(binding) {
                Ok(Network::default())
            } else {
                Err(ModelError::NetworkNotFound(binding.to_string()))
            }
        })
    }

    fn secret_get(
        &mut self,
        id: Option<&str>,
        label: Option<&str>,
        mode: SecretReadMode,
    ) -> ModelResult<Databag> {
        let args = json!({ "id": id, "label": label, "mode": mode });
        self.traced("secret-get", args, |b| b.read_secret(id, label, mode))
    }

    fn secret_info_get(&mut self, id: Option<&str>, label: Option<&str>) -> ModelResult<SecretInfo> {
        let args = json!({ "id": id, "label": label });
        self.traced("secret-info-get", args, |b| b.describe_secret(id, label))
    }

    fn secret_add(
        &mut self,
        content: Databag,
        owner: SecretOwner,
        options: SecretOptions,
    ) -> ModelResult<String> {
        let args = json!({ "content": content, "owner": owner, "options": options });
        self.traced("secret-add", args, |b| b.add_secret(content, owner, options))
    }

    fn secret_set(
        &mut self,
        id: &str,
        content: Option<Databag>,
        options: SecretOptions,
    ) -> ModelResult<()> {
        let args = json!({ "id": id, "content": content, "options": options });
        self.traced("secret-set", args, |b| b.update_secret(id, content, options))
    }

    fn secret_grant(
        &mut self,
        id: &str,
        relation_id: RelationId,
        unit: Option<&str>,
    ) -> ModelResult<()> {
        let args = json!({ "id": id, "relation_id": relation_id, "unit": unit });
        self.traced("secret-grant", args, |b| b.grant_secret(id, relation_id, unit))
    }

    fn secret_revoke(
        &mut self,
        id: &str,
        relation_id: RelationId,
        unit: Option<&str>,
    ) -> ModelResult<()> {
        let args = json!({ "id": id, "relation_id": relation_id, "unit": unit });
        self.traced("secret-revoke", args, |b| b.revoke_secret(id, relation_id, unit))
    }

    fn secret_remove(&mut self, id: &str, revision: Option<u32>) -> ModelResult<()> {
        let args = json!({ "id": id, "revision": revision });
        self.traced("secret-remove", args, |b| b.remove_secret(id, revision))
    }

    fn secret_ids(&mut self) -> ModelResult<Vec<String>> {
        self.traced("secret-ids", json!({}), |b| b.owned_secret_ids())
    }

    fn storage_list(&mut self, name: &str) -> ModelResult<Vec<String>> {
        self.traced("storage-list", json!({ "name": name }), |b| {
            if !b.meta.storage.contains_key(name) {
                return Err(ModelError::StorageNotFound(name.to_string()));
            }
            Ok(b
                .state
                .storages
                .iter()
                .filter(|s| s.name == name)
                .map(|s| s.id())
                .collect())
        })
    }

    fn storage_get(&mut self, storage_id: &str, attribute: &str) -> ModelResult<String> {
        let args = json!({ "storage_id": storage_id, "attribute": attribute });
        self.traced("storage-get", args, |b| {
            let not_found = || ModelError::StorageNotFound(storage_id.to_string());
            let (name, index) = storage_id.split_once('/').ok_or_else(not_found)?;
            let index: u32 = index.parse().map_err(|_| not_found())?;
            let storage = b.state.storage(name, index).ok_or_else(not_found)?;
            match attribute {
                "location" => Ok(storage.location()),
                "kind" => Ok(b
                    .meta
                    .storage
                    .get(name)
                    .map(|m| format!("{:?}", m.kind).to_lowercase())
                    .unwrap_or_else(|| "filesystem".to_string())),
                other => Err(ModelError::StorageNotFound(format!(
                    "{storage_id} has no attribute {other}"
                ))),
            }
        })
    }

    fn storage_add(&mut self, name: &str, count: u32) -> ModelResult<()> {
        self.traced(
            "storage-add",
            json!({ "name": name, "count": count }),
            |b| {
                if b.meta.storage.contains_key(name) {
                    Ok(())
                } else {
                    Err(ModelError::StorageNotFound(name.to_string()))
                }
            },
        )
    }

    fn action_get(&mut self) -> ModelResult<Map<String, Value>> {
        self.traced("action-get", json!({}), |b| {
            Ok(b.action_context("action-get")?.params.clone())
        })
    }

    fn action_set(&mut self, results: Map<String, Value>) -> ModelResult<()> {
        let args = json!({ "results": results });
        self.traced("action-set", args, |b| {
            let ctx = b.action_context("action-set")?;
            validate_action_results(&results)?;
            ctx.output.results.extend(results);
            Ok(())
        })
    }

    fn action_log(&mut self, message: &str) -> ModelResult<()> {
        self.traced("action-log", json!({ "message": message }), |b| {
            b.action_context("action-log")?
                .output
                .logs
                .push(message.to_string());
            Ok(())
        })
    }

    fn action_fail(&mut self, message: &str) -> ModelResult<()> {
        self.traced("action-fail", json!({ "message": message }), |b| {
            b.action_context("action-fail")?.output.failure = Some(message.to_string());
            Ok(())
        })
    }

    fn juju_log(&mut self, level: LogLevel, message: &str) -> ModelResult<()> {
        let unit = self.unit_name();
        match level {
            LogLevel::Debug => debug!(target: "charm", unit = %unit, "{message}"),
            LogLevel::Info => info!(target: "charm", unit = %unit, "{message}"),
            LogLevel::Warning => warn!(target: "charm", unit = %unit, "{message}"),
            LogLevel::Error | LogLevel::Critical => error!(target: "charm", unit = %unit, "{message}"),
        }
        self.traced(
            "juju-log",
            json!({ "level": level, "message": message }),
            |b| {
                b.state.juju_log.push(JujuLogLine {
                    level,
                    message: message.to_string(),
                });
                Ok(())
            },
        )
    }

    fn stored_state_get(&mut self, handle_path: &str) -> ModelResult<Map<String, Value>> {
        self.traced(
            "stored-state-get",
            json!({ "handle_path": handle_path }),
            |b| {
                let (owner, name) = StoredState::parse_handle_path(handle_path)
                    .ok_or_else(|| ModelError::NoSnapshot(handle_path.to_string()))?;
                Ok(b.state
                    .stored_state(owner.as_deref(), &name)
                    .map(|s| s.content.clone())
                    .unwrap_or_default())
            },
        )
    }

    fn stored_state_set(
        &mut self,
        handle_path: &str,
        content: Map<String, Value>,
    ) -> ModelResult<()> {
        let args = json!({ "handle_path": handle_path, "content": content });
        self.traced("stored-state-set", args, |b| {
            let (owner, name) = StoredState::parse_handle_path(handle_path)
                .ok_or_else(|| ModelError::NoSnapshot(handle_path.to_string()))?;
            let stored = &mut b.state.stored_states;
            match stored
                .iter_mut()
                .find(|s| s.owner_path == owner && s.name == name)
            {
                Some(existing) => existing.content = content,
                None => stored.push(StoredState {
                    owner_path: owner,
                    name,
                    content,
                }),
            }
            Ok(())
        })
    }
}
