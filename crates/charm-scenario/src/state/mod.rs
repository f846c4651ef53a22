// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The State snapshot.
//!
//! A [`State`] is everything the unit under test can observe and mutate. It
//! is a flat collection of independently keyed sub-documents: events and the
//! backend refer to relations, secrets, containers and storage by id or name,
//! never by reference, so a State can be cloned, compared and serialized
//! freely.
//!
//! States are values. A dispatch takes `&State`, works on its own copy and
//! hands back a new one; the input is never touched.

mod container;
mod network;
mod pebble;
mod relation;
mod secret;
mod status;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::event::DeferredEvent;

pub use container::{
    Container, ExecMock, ExecOutput, FileData, FileInfo, FileKind, FsError, Mount, normalize,
};
pub use network::{Address, BindAddress, Network};
pub use pebble::{
    Check, CheckInfo, CheckLevel, CheckStatus, LabeledLayer, Layer, Override, Plan, Service,
    ServiceInfo, ServiceStatus, Startup,
};
pub use relation::{BagRef, Databag, Relation, RelationId, RelationKind};
pub use secret::{
    RotatePolicy, Secret, SecretGrant, SecretOwner, canonical_id, generate_id, validate_content,
};
pub use status::{Status, StatusInfo, StatusName};

static STORED_STATE_HANDLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<owner>.*)/)?StoredStateData\[(?P<name>[^\]]+)\]$")
        .expect("stored state handle regex is valid")
});

/// A typed charm config value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `boolean` option.
    Bool(bool),
    /// `int` option.
    Int(i64),
    /// `float` option.
    Float(f64),
    /// `string` or `secret` option.
    String(String),
}

impl ConfigValue {
    /// The value as a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a float; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant's config type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Port protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// ICMP; carries no port number.
    Icmp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        })
    }
}

/// An opened port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Port {
    /// Protocol.
    pub protocol: Protocol,
    /// Port number; `None` for ICMP.
    #[serde(default)]
    pub port: Option<u16>,
}

impl Port {
    /// A TCP port.
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port: Some(port),
        }
    }

    /// A UDP port.
    pub fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            port: Some(port),
        }
    }

    /// ICMP.
    pub fn icmp() -> Self {
        Self {
            protocol: Protocol::Icmp,
            port: None,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}/{}", port, self.protocol),
            None => write!(f, "{}", self.protocol),
        }
    }
}

/// An attached storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    /// Storage name from metadata.
    pub name: String,
    /// Instance index.
    #[serde(default)]
    pub index: u32,
}

impl Storage {
    /// Storage instance `name/index`.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Storage id, `name/index`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.name, self.index)
    }

    /// Where the storage is attached.
    pub fn location(&self) -> String {
        format!("/var/lib/juju/storage/{}/{}", self.name, self.index)
    }
}

/// Data persisted by an operator's stored-state object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    /// Handle path of the owning object; `None` for the framework root.
    #[serde(default)]
    pub owner_path: Option<String>,
    /// Attribute name.
    pub name: String,
    /// Stored values.
    #[serde(default)]
    pub content: Map<String, Value>,
}

impl StoredState {
    /// Stored state named `name` owned by `owner_path`.
    pub fn new(owner_path: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            owner_path: owner_path.map(str::to_string),
            name: name.into(),
            content: Map::new(),
        }
    }

    /// Add a value.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    /// Framework handle path, e.g. `MyCharm/StoredStateData[_stored]`.
    pub fn handle_path(&self) -> String {
        match &self.owner_path {
            Some(owner) => format!("{owner}/StoredStateData[{}]", self.name),
            None => format!("StoredStateData[{}]", self.name),
        }
    }

    /// Split a handle path into owner path and name.
    pub fn parse_handle_path(path: &str) -> Option<(Option<String>, String)> {
        let caps = STORED_STATE_HANDLE.captures(path)?;
        let owner = caps.name("owner").map(|m| m.as_str().to_string());
        let name = caps.name("name")?.as_str().to_string();
        Some((owner, name))
    }
}

/// Severity of a `juju-log` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// DEBUG.
    Debug,
    /// INFO.
    Info,
    /// WARNING.
    Warning,
    /// ERROR.
    Error,
    /// CRITICAL.
    Critical,
}

/// A line written with `juju-log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JujuLogLine {
    /// Severity.
    pub level: LogLevel,
    /// Message.
    pub message: String,
}

/// Kind of cloud the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Machine model.
    #[default]
    Lxd,
    /// Kubernetes model.
    Kubernetes,
}

/// The model the unit lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Model UUID.
    pub uuid: String,
    /// Cloud kind.
    #[serde(default)]
    pub kind: ModelKind,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            name: "testing".to_string(),
            uuid: Uuid::new_v4().to_string(),
            kind: ModelKind::Lxd,
        }
    }
}

/// Everything the unit under test can observe and mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct State {
    /// Charm config; options missing here fall back to metadata defaults.
    #[serde(default)]
    pub config: BTreeMap<String, ConfigValue>,
    /// Whether this unit is the leader.
    #[serde(default)]
    pub leader: bool,
    /// Relations, in the order the unit sees them.
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Secrets visible to the unit.
    #[serde(default)]
    pub secrets: Vec<Secret>,
    /// Operator stored state.
    #[serde(default)]
    pub stored_states: Vec<StoredState>,
    /// Workload containers.
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Explicit network bindings.
    #[serde(default)]
    pub networks: BTreeMap<String, Network>,
    /// Unit and application status.
    #[serde(default)]
    pub status: Status,
    /// Opened ports.
    #[serde(default)]
    pub opened_ports: BTreeSet<Port>,
    /// Attached storage.
    #[serde(default)]
    pub storages: Vec<Storage>,
    /// Events deferred in earlier dispatches, oldest first.
    #[serde(default)]
    pub deferred: Vec<DeferredEvent>,
    /// Model identity.
    #[serde(default)]
    pub model: Model,
    /// Unit number within the application.
    #[serde(default)]
    pub unit_id: u32,
    /// Lines logged with `juju-log`.
    #[serde(default)]
    pub juju_log: Vec<JujuLogLine>,
}

impl State {
    /// An empty, non-leader state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a state from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON Patch operations turning `other` into this state, sorted by
    /// path and then op.
    ///
    /// ```
    /// use charm_scenario::{State, StatusInfo};
    ///
    /// let before = State::new();
    /// let after = before.clone().with_unit_status(StatusInfo::active("ready"));
    /// assert!(before.delta(&before).unwrap().is_empty());
    /// assert_eq!(after.delta(&before).unwrap()[0]["path"], "/status/unit/message");
    /// ```
    pub fn delta(&self, other: &State) -> Result<Vec<Value>> {
        let before = serde_json::to_value(other)?;
        let after = serde_json::to_value(self)?;
        let patch = json_patch::diff(&before, &after);
        let Value::Array(mut ops) = serde_json::to_value(&patch)? else {
            return Ok(Vec::new());
        };
        ops.sort_by_cached_key(|op| {
            let field = |key: &str| op[key].as_str().unwrap_or_default().to_string();
            field("path") + &field("op")
        });
        Ok(ops)
    }

    /// Set a config option.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Set leadership.
    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a secret.
    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secrets.push(secret);
        self
    }

    /// Add stored state.
    pub fn with_stored_state(mut self, stored: StoredState) -> Self {
        self.stored_states.push(stored);
        self
    }

    /// Add a container.
    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    /// Set a binding's network.
    pub fn with_network(mut self, binding: impl Into<String>, network: Network) -> Self {
        self.networks.insert(binding.into(), network);
        self
    }

    /// Set the unit status.
    pub fn with_unit_status(mut self, status: StatusInfo) -> Self {
        self.status.unit = status;
        self
    }

    /// Set the application status.
    pub fn with_app_status(mut self, status: StatusInfo) -> Self {
        self.status.app = status;
        self
    }

    /// Mark a port opened.
    pub fn with_opened_port(mut self, port: Port) -> Self {
        self.opened_ports.insert(port);
        self
    }

    /// Attach storage.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storages.push(storage);
        self
    }

    /// Queue a deferred event.
    pub fn with_deferred(mut self, event: DeferredEvent) -> Self {
        self.deferred.push(event);
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Set the unit number.
    pub fn with_unit_id(mut self, unit_id: u32) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Relation by id.
    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.iter().find(|r| r.id == id)
    }

    /// Mutable relation by id.
    pub fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        self.relations.iter_mut().find(|r| r.id == id)
    }

    /// Relations on an endpoint.
    pub fn relations_on<'a>(&'a self, endpoint: &'a str) -> impl Iterator<Item = &'a Relation> {
        self.relations.iter().filter(move |r| r.endpoint == endpoint)
    }

    /// Container by name.
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Mutable container by name.
    pub fn container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.name == name)
    }

    /// Secret by id in any accepted spelling.
    pub fn secret(&self, id: &str) -> Option<&Secret> {
        self.secrets.iter().find(|s| s.matches_id(id))
    }

    /// Secret by label.
    pub fn secret_by_label(&self, label: &str) -> Option<&Secret> {
        self.secrets
            .iter()
            .find(|s| s.label.as_deref() == Some(label))
    }

    /// Stored state by owner and name.
    pub fn stored_state(&self, owner_path: Option<&str>, name: &str) -> Option<&StoredState> {
        self.stored_states
            .iter()
            .find(|s| s.owner_path.as_deref() == owner_path && s.name == name)
    }

    /// Storage by name and index.
    pub fn storage(&self, name: &str, index: u32) -> Option<&Storage> {
        self.storages
            .iter()
            .find(|s| s.name == name && s.index == index)
    }
}
