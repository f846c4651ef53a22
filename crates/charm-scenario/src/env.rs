// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The dispatch environment shim.
//!
//! The agent tells an operator what it is being run for through `JUJU_*`
//! variables. [`DispatchEnv`] builds the same set for one dispatch and hands
//! it to the framework by value; the process environment is never touched,
//! so concurrent dispatches cannot observe each other.

use std::collections::BTreeMap;

use crate::config::HarnessConfig;
use crate::event::Event;
use crate::meta::CharmMeta;
use crate::state::State;

/// Environment variables for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchEnv {
    vars: BTreeMap<String, String>,
}

impl DispatchEnv {
    /// Build the shim for `event` against `state`.
    pub fn build(event: &Event, state: &State, meta: &CharmMeta, config: &HarnessConfig) -> Self {
        let mut env = BTreeMap::new();
        let unit_name = format!("{}/{}", meta.name, state.unit_id);
        env.insert("JUJU_VERSION".to_string(), config.juju_version.to_string());
        env.insert("JUJU_UNIT_NAME".to_string(), unit_name);
        env.insert("JUJU_MODEL_NAME".to_string(), state.model.name.clone());
        env.insert("JUJU_MODEL_UUID".to_string(), state.model.uuid.clone());
        env.insert("JUJU_DISPATCH_PATH".to_string(), event.dispatch_path());
        env.insert("JUJU_CHARM_DIR".to_string(), config.charm_dir.clone());
        if config.debug {
            env.insert("JUJU_DEBUG".to_string(), "1".to_string());
        }

        if let Some(action) = &event.action {
            env.insert("JUJU_ACTION_NAME".to_string(), action.name.clone());
            env.insert("JUJU_ACTION_UUID".to_string(), action.id.clone());
        }

        if let Some(rel) = &event.relation {
            env.insert("JUJU_RELATION".to_string(), rel.endpoint.clone());
            env.insert(
                "JUJU_RELATION_ID".to_string(),
                format!("{}:{}", rel.endpoint, rel.id),
            );
            if let Some(relation) = state.relation(rel.id) {
                let remote_app = relation.remote_app(&meta.name);
                env.insert("JUJU_REMOTE_APP".to_string(), remote_app.to_string());
                if let Some(unit) = event.remote_unit {
                    env.insert(
                        "JUJU_REMOTE_UNIT".to_string(),
                        relation.remote_unit_name(&meta.name, unit),
                    );
                }
                if let Some(unit) = event.departing_unit {
                    env.insert(
                        "JUJU_DEPARTING_UNIT".to_string(),
                        relation.remote_unit_name(&meta.name, unit),
                    );
                }
            }
        }

        if let Some(container) = &event.container {
            env.insert("JUJU_WORKLOAD_NAME".to_string(), container.clone());
        }
        if let Some(check) = &event.check {
            env.insert("JUJU_PEBBLE_CHECK_NAME".to_string(), check.clone());
        }

        if let Some(secret) = &event.secret {
            env.insert("JUJU_SECRET_ID".to_string(), secret.id.clone());
            if let Some(label) = &secret.label {
                env.insert("JUJU_SECRET_LABEL".to_string(), label.clone());
            }
            if let Some(revision) = secret.revision {
                env.insert("JUJU_SECRET_REVISION".to_string(), revision.to_string());
            }
        }

        if let Some(storage) = &event.storage {
            env.insert(
                "JUJU_STORAGE_ID".to_string(),
                format!("{}/{}", storage.name, storage.index),
            );
        }

        env.extend(event.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self { vars: env }
    }

    /// Value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// All variables, sorted by name.
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Event name derived from `JUJU_DISPATCH_PATH`, e.g. `db-relation-changed`
    /// or `backup-action`.
    pub fn event_name(&self) -> Option<String> {
        let path = self.get("JUJU_DISPATCH_PATH")?;
        let (kind, name) = path.split_once('/')?;
        match kind {
            "actions" => Some(format!("{name}-action")),
            "hooks" => Some(name.to_string()),
            _ => None,
        }
    }

    /// `JUJU_UNIT_NAME`
    pub fn unit_name(&self) -> Option<&str> {
        self.get("JUJU_UNIT_NAME")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Action;
    use crate::state::{Container, Relation, Secret, Storage};

    fn meta() -> CharmMeta {
        CharmMeta::new("web").with_requires("db", "pg")
    }

    #[test]
    fn test_relation_event_env() {
        let relation = Relation::new(4, "db", "pg")
            .with_remote_app("postgresql")
            .with_remote_units([0, 1]);
        let state = State::new().with_unit_id(3).with_relation(relation.clone());
        let event = Event::relation_departed(&relation, 1).with_env("EXTRA", "yes");
        let env = DispatchEnv::build(&event, &state, &meta(), &HarnessConfig::new());

        assert_eq!(env.get("JUJU_UNIT_NAME"), Some("web/3"));
        assert_eq!(env.get("JUJU_DISPATCH_PATH"), Some("hooks/db-relation-departed"));
        assert_eq!(env.get("JUJU_RELATION_ID"), Some("db:4"));
        assert_eq!(env.get("JUJU_REMOTE_APP"), Some("postgresql"));
        assert_eq!(env.get("JUJU_REMOTE_UNIT"), Some("postgresql/1"));
        assert_eq!(env.get("JUJU_DEPARTING_UNIT"), Some("postgresql/1"));
        assert_eq!(env.get("JUJU_VERSION"), Some("3.4.0"));
        assert_eq!(env.get("EXTRA"), Some("yes"));
        assert_eq!(env.get("JUJU_DEBUG"), None);
        assert_eq!(env.event_name().as_deref(), Some("db-relation-departed"));
    }

    #[test]
    fn test_action_and_workload_env() {
        let state = State::new();
        let action = Action::new("backup");
        let id = action.id.clone();
        let env = DispatchEnv::build(
            &Event::action(action),
            &state,
            &meta(),
            &HarnessConfig::new().with_debug(true),
        );
        assert_eq!(env.get("JUJU_DISPATCH_PATH"), Some("actions/backup"));
        assert_eq!(env.get("JUJU_ACTION_UUID"), Some(id.as_str()));
        assert_eq!(env.get("JUJU_DEBUG"), Some("1"));
        assert_eq!(env.event_name().as_deref(), Some("backup-action"));

        let container = Container::new("workload");
        let env = DispatchEnv::build(
            &Event::pebble_check_failed(&container, "http"),
            &state,
            &meta(),
            &HarnessConfig::new(),
        );
        assert_eq!(env.get("JUJU_WORKLOAD_NAME"), Some("workload"));
        assert_eq!(env.get("JUJU_PEBBLE_CHECK_NAME"), Some("http"));
    }

    #[test]
    fn test_secret_and_storage_env() {
        let secret = Secret::new([("password", "x")])
            .with_id("secret:abc")
            .with_label("db-pass");
        let env = DispatchEnv::build(
            &Event::secret_remove(&secret, 2),
            &State::new(),
            &meta(),
            &HarnessConfig::new(),
        );
        assert_eq!(env.get("JUJU_SECRET_ID"), Some("secret:abc"));
        assert_eq!(env.get("JUJU_SECRET_LABEL"), Some("db-pass"));
        assert_eq!(env.get("JUJU_SECRET_REVISION"), Some("2"));

        let env = DispatchEnv::build(
            &Event::storage_attached(&Storage::new("data", 1)),
            &State::new(),
            &meta(),
            &HarnessConfig::new(),
        );
        assert_eq!(env.get("JUJU_STORAGE_ID"), Some("data/1"));
    }
}
