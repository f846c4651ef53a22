// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Events: what a dispatch delivers to the operator.
//!
//! An [`Event`] names its trigger ([`EventKind`]) and carries the ids of the
//! relation, container, secret, storage or action it concerns. Ids are only
//! checked against a [`State`](crate::State) when the event is dispatched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::state::{Container, Relation, RelationId, Secret, Storage};

/// Event triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// `install`
    Install,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `remove`
    Remove,
    /// `update-status`
    UpdateStatus,
    /// `upgrade-charm`
    UpgradeCharm,
    /// `leader-elected`
    LeaderElected,
    /// `leader-settings-changed`, delivered to non-leaders once leadership settles.
    #[serde(alias = "leader-settled")]
    LeaderSettingsChanged,
    /// `config-changed`
    ConfigChanged,
    /// `secret-changed`, for consumers.
    SecretChanged,
    /// `secret-rotate`, for owners.
    SecretRotate,
    /// `secret-remove`, for owners.
    SecretRemove,
    /// `secret-expired`, for owners.
    SecretExpired,
    /// `<container>-pebble-ready`
    PebbleReady,
    /// `<container>-pebble-check-failed`
    PebbleCheckFailed,
    /// `<container>-pebble-check-recovered`
    PebbleCheckRecovered,
    /// `collect-unit-status`
    CollectUnitStatus,
    /// `collect-app-status`
    CollectAppStatus,
    /// `<action>-action`
    Action,
    /// `<endpoint>-relation-created`
    RelationCreated,
    /// `<endpoint>-relation-joined`
    RelationJoined,
    /// `<endpoint>-relation-changed`
    RelationChanged,
    /// `<endpoint>-relation-departed`
    RelationDeparted,
    /// `<endpoint>-relation-broken`
    RelationBroken,
    /// `<storage>-storage-attached`
    StorageAttached,
    /// `<storage>-storage-detaching`
    StorageDetaching,
    /// `pre-commit`
    PreCommit,
    /// `commit`
    Commit,
    /// An operator-defined event.
    Custom(String),
}

impl EventKind {
    /// Relation lifecycle events.
    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            Self::RelationCreated
                | Self::RelationJoined
                | Self::RelationChanged
                | Self::RelationDeparted
                | Self::RelationBroken
        )
    }

    /// Secret events.
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Self::SecretChanged | Self::SecretRotate | Self::SecretRemove | Self::SecretExpired
        )
    }

    /// Secret events only the owner receives.
    pub fn is_owner_secret_event(&self) -> bool {
        matches!(
            self,
            Self::SecretRotate | Self::SecretRemove | Self::SecretExpired
        )
    }

    /// Workload container events.
    pub fn is_workload(&self) -> bool {
        matches!(
            self,
            Self::PebbleReady | Self::PebbleCheckFailed | Self::PebbleCheckRecovered
        )
    }

    /// Storage events.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageAttached | Self::StorageDetaching)
    }

    /// Events the framework emits itself at commit time.
    pub fn is_framework(&self) -> bool {
        matches!(
            self,
            Self::PreCommit | Self::Commit | Self::CollectUnitStatus | Self::CollectAppStatus
        )
    }

    /// Whether an operator may defer the event.
    pub fn is_deferrable(&self) -> bool {
        !self.is_framework() && *self != Self::Action
    }
}

/// Relation an event concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRef {
    /// Relation id.
    pub id: RelationId,
    /// Endpoint name.
    pub endpoint: String,
}

/// Secret an event concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret id.
    pub id: String,
    /// Label, if the unit knows one.
    #[serde(default)]
    pub label: Option<String>,
    /// Revision, for remove and expired.
    #[serde(default)]
    pub revision: Option<u32>,
}

/// Storage instance an event concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    /// Storage name.
    pub name: String,
    /// Instance index.
    pub index: u32,
}

/// An action invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action name.
    pub name: String,
    /// Supplied parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Invocation id.
    pub id: String,
}

impl Action {
    /// Invoke `name` with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Supply a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// How an event reached the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventOrigin {
    /// The dispatched event.
    External,
    /// Emitted by the operator while handling another event.
    Custom,
    /// Re-delivered from the deferred queue.
    Redelivered,
    /// Emitted by the framework at commit.
    Lifecycle,
}

/// A dispatch trigger plus the entities it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Trigger.
    pub kind: EventKind,
    /// Relation, for relation events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationRef>,
    /// Remote unit id, for joined/changed/departed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_unit: Option<u32>,
    /// Unit leaving, for departed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departing_unit: Option<u32>,
    /// Container, for workload events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Check name, for check events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    /// Secret, for secret events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
    /// Action invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Storage, for storage events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageRef>,
    /// Snapshot data of a custom event.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Extra environment entries for the shim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Event {
    /// An event of `kind` with nothing attached.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            relation: None,
            remote_unit: None,
            departing_unit: None,
            container: None,
            check: None,
            secret: None,
            action: None,
            storage: None,
            payload: Value::Null,
            env: BTreeMap::new(),
        }
    }

    /// `install`
    pub fn install() -> Self {
        Self::new(EventKind::Install)
    }

    /// `start`
    pub fn start() -> Self {
        Self::new(EventKind::Start)
    }

    /// `stop`
    pub fn stop() -> Self {
        Self::new(EventKind::Stop)
    }

    /// `remove`
    pub fn remove() -> Self {
        Self::new(EventKind::Remove)
    }

    /// `update-status`
    pub fn update_status() -> Self {
        Self::new(EventKind::UpdateStatus)
    }

    /// `upgrade-charm`
    pub fn upgrade_charm() -> Self {
        Self::new(EventKind::UpgradeCharm)
    }

    /// `leader-elected`
    pub fn leader_elected() -> Self {
        Self::new(EventKind::LeaderElected)
    }

    /// `leader-settings-changed`
    pub fn leader_settings_changed() -> Self {
        Self::new(EventKind::LeaderSettingsChanged)
    }

    /// Same as [`Event::leader_settings_changed`].
    pub fn leader_settled() -> Self {
        Self::leader_settings_changed()
    }

    /// `config-changed`
    pub fn config_changed() -> Self {
        Self::new(EventKind::ConfigChanged)
    }

    fn for_relation(kind: EventKind, relation: &Relation) -> Self {
        Self {
            relation: Some(RelationRef {
                id: relation.id,
                endpoint: relation.endpoint.clone(),
            }),
            ..Self::new(kind)
        }
    }

    /// `<endpoint>-relation-created`
    pub fn relation_created(relation: &Relation) -> Self {
        Self::for_relation(EventKind::RelationCreated, relation)
    }

    /// `<endpoint>-relation-joined`, from `remote_unit`.
    pub fn relation_joined(relation: &Relation, remote_unit: u32) -> Self {
        Self {
            remote_unit: Some(remote_unit),
            ..Self::for_relation(EventKind::RelationJoined, relation)
        }
    }

    /// `<endpoint>-relation-changed`, from the remote application.
    pub fn relation_changed(relation: &Relation) -> Self {
        Self::for_relation(EventKind::RelationChanged, relation)
    }

    /// `<endpoint>-relation-departed`, for `departing_unit` leaving.
    pub fn relation_departed(relation: &Relation, departing_unit: u32) -> Self {
        Self {
            remote_unit: Some(departing_unit),
            departing_unit: Some(departing_unit),
            ..Self::for_relation(EventKind::RelationDeparted, relation)
        }
    }

    /// `<endpoint>-relation-broken`
    pub fn relation_broken(relation: &Relation) -> Self {
        Self::for_relation(EventKind::RelationBroken, relation)
    }

    /// Attribute the event to a remote unit.
    pub fn with_remote_unit(mut self, unit_id: u32) -> Self {
        self.remote_unit = Some(unit_id);
        self
    }

    fn for_secret(kind: EventKind, secret: &Secret, revision: Option<u32>) -> Self {
        Self {
            secret: Some(SecretRef {
                id: secret.id.clone(),
                label: secret.label.clone(),
                revision,
            }),
            ..Self::new(kind)
        }
    }

    /// `secret-changed`
    pub fn secret_changed(secret: &Secret) -> Self {
        Self::for_secret(EventKind::SecretChanged, secret, None)
    }

    /// `secret-rotate`
    pub fn secret_rotate(secret: &Secret) -> Self {
        Self::for_secret(EventKind::SecretRotate, secret, None)
    }

    /// `secret-remove` for `revision`.
    pub fn secret_remove(secret: &Secret, revision: u32) -> Self {
        Self::for_secret(EventKind::SecretRemove, secret, Some(revision))
    }

    /// `secret-expired` for `revision`.
    pub fn secret_expired(secret: &Secret, revision: u32) -> Self {
        Self::for_secret(EventKind::SecretExpired, secret, Some(revision))
    }

    /// `<container>-pebble-ready`
    pub fn pebble_ready(container: &Container) -> Self {
        Self {
            container: Some(container.name.clone()),
            ..Self::new(EventKind::PebbleReady)
        }
    }

    /// `<container>-pebble-check-failed`
    pub fn pebble_check_failed(container: &Container, check: impl Into<String>) -> Self {
        Self {
            container: Some(container.name.clone()),
            check: Some(check.into()),
            ..Self::new(EventKind::PebbleCheckFailed)
        }
    }

    /// `<container>-pebble-check-recovered`
    pub fn pebble_check_recovered(container: &Container, check: impl Into<String>) -> Self {
        Self {
            container: Some(container.name.clone()),
            check: Some(check.into()),
            ..Self::new(EventKind::PebbleCheckRecovered)
        }
    }

    /// `collect-unit-status`
    pub fn collect_unit_status() -> Self {
        Self::new(EventKind::CollectUnitStatus)
    }

    /// `collect-app-status`
    pub fn collect_app_status() -> Self {
        Self::new(EventKind::CollectAppStatus)
    }

    /// `<action>-action`
    pub fn action(action: Action) -> Self {
        Self {
            action: Some(action),
            ..Self::new(EventKind::Action)
        }
    }

    fn for_storage(kind: EventKind, storage: &Storage) -> Self {
        Self {
            storage: Some(StorageRef {
                name: storage.name.clone(),
                index: storage.index,
            }),
            ..Self::new(kind)
        }
    }

    /// `<storage>-storage-attached`
    pub fn storage_attached(storage: &Storage) -> Self {
        Self::for_storage(EventKind::StorageAttached, storage)
    }

    /// `<storage>-storage-detaching`
    pub fn storage_detaching(storage: &Storage) -> Self {
        Self::for_storage(EventKind::StorageDetaching, storage)
    }

    /// An operator-defined event carrying `payload`.
    pub fn custom(name: impl Into<String>, payload: Value) -> Self {
        Self {
            payload,
            ..Self::new(EventKind::Custom(name.into()))
        }
    }

    /// Add an environment entry to the shim.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Wrap as an already-deferred event with framework key `key`.
    pub fn deferred(self, key: u64) -> DeferredEvent {
        DeferredEvent::new(self, key)
    }

    /// Relation id, for relation events.
    pub fn relation_id(&self) -> Option<RelationId> {
        self.relation.as_ref().map(|r| r.id)
    }

    /// Hook or event name, e.g. `db-relation-changed`.
    pub fn name(&self) -> String {
        let prefix = |p: Option<&str>| p.unwrap_or("unknown").to_string();
        match &self.kind {
            EventKind::Install => "install".to_string(),
            EventKind::Start => "start".to_string(),
            EventKind::Stop => "stop".to_string(),
            EventKind::Remove => "remove".to_string(),
            EventKind::UpdateStatus => "update-status".to_string(),
            EventKind::UpgradeCharm => "upgrade-charm".to_string(),
            EventKind::LeaderElected => "leader-elected".to_string(),
            EventKind::LeaderSettingsChanged => "leader-settings-changed".to_string(),
            EventKind::ConfigChanged => "config-changed".to_string(),
            EventKind::SecretChanged => "secret-changed".to_string(),
            EventKind::SecretRotate => "secret-rotate".to_string(),
            EventKind::SecretRemove => "secret-remove".to_string(),
            EventKind::SecretExpired => "secret-expired".to_string(),
            EventKind::PebbleReady => {
                format!("{}-pebble-ready", prefix(self.container.as_deref()))
            }
            EventKind::PebbleCheckFailed => {
                format!("{}-pebble-check-failed", prefix(self.container.as_deref()))
            }
            EventKind::PebbleCheckRecovered => {
                format!("{}-pebble-check-recovered", prefix(self.container.as_deref()))
            }
            EventKind::CollectUnitStatus => "collect-unit-status".to_string(),
            EventKind::CollectAppStatus => "collect-app-status".to_string(),
            EventKind::Action => format!(
                "{}-action",
                prefix(self.action.as_ref().map(|a| a.name.as_str()))
            ),
            EventKind::RelationCreated
            | EventKind::RelationJoined
            | EventKind::RelationChanged
            | EventKind::RelationDeparted
            | EventKind::RelationBroken => {
                let suffix = match self.kind {
                    EventKind::RelationCreated => "created",
                    EventKind::RelationJoined => "joined",
                    EventKind::RelationChanged => "changed",
                    EventKind::RelationDeparted => "departed",
                    _ => "broken",
                };
                format!(
                    "{}-relation-{suffix}",
                    prefix(self.relation.as_ref().map(|r| r.endpoint.as_str()))
                )
            }
            EventKind::StorageAttached => format!(
                "{}-storage-attached",
                prefix(self.storage.as_ref().map(|s| s.name.as_str()))
            ),
            EventKind::StorageDetaching => format!(
                "{}-storage-detaching",
                prefix(self.storage.as_ref().map(|s| s.name.as_str()))
            ),
            EventKind::PreCommit => "pre-commit".to_string(),
            EventKind::Commit => "commit".to_string(),
            EventKind::Custom(name) => name.clone(),
        }
    }

    /// Path the agent would dispatch, `hooks/<name>` or `actions/<name>`.
    pub fn dispatch_path(&self) -> String {
        match (&self.kind, &self.action) {
            (EventKind::Action, Some(action)) => format!("actions/{}", action.name),
            _ => format!("hooks/{}", self.name()),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// An event waiting in the deferred queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredEvent {
    /// Framework handle, e.g. `charm/on/start[3]`.
    pub handle_path: String,
    /// Framework key, unique within the queue.
    pub key: u64,
    /// The deferred event with its snapshot.
    pub event: Event,
}

impl DeferredEvent {
    /// Queue `event` under `key`.
    pub fn new(event: Event, key: u64) -> Self {
        Self {
            handle_path: handle_path(&event, key),
            key,
            event,
        }
    }

    /// Name of the deferred event.
    pub fn name(&self) -> String {
        self.event.name()
    }
}

/// Framework handle path for an event instance.
pub fn handle_path(event: &Event, key: u64) -> String {
    format!("charm/on/{}[{key}]", event.name().replace('-', "_"))
}
