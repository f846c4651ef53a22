// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pre-dispatch checks.
//!
//! A State can be built that the real platform could never produce, for
//! example a relation on an endpoint the charm does not declare. Running an
//! operator against such a State proves nothing, so [`check_state`] rejects
//! it before anything is delivered, listing every problem at once.
//! [`check_event`] rejects events naming entities the State lacks.

use std::collections::BTreeSet;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::event::{Event, EventKind};
use crate::meta::{CharmMeta, EndpointRole};
use crate::state::{RelationKind, State, canonical_id};

/// Check `state` against itself and `meta`.
pub fn check_state(state: &State, meta: &CharmMeta, config: &HarnessConfig) -> Result<()> {
    let mut problems = Vec::new();

    let mut relation_ids = BTreeSet::new();
    for relation in &state.relations {
        if !relation_ids.insert(relation.id) {
            problems.push(format!("duplicate relation id {}", relation.id));
        }
        match meta.endpoint(&relation.endpoint) {
            None => problems.push(format!(
                "relation {} is on undeclared endpoint '{}'",
                relation.id, relation.endpoint
            )),
            Some((role, _)) => {
                let is_peer_endpoint = role == EndpointRole::Peer;
                if is_peer_endpoint != (relation.kind == RelationKind::Peer) {
                    problems.push(format!(
                        "relation {} on '{}' must {}be a peer relation",
                        relation.id,
                        relation.endpoint,
                        if is_peer_endpoint { "" } else { "not " }
                    ));
                }
            }
        }
        for unit in relation.remote_units_data.keys() {
            if !relation.remote_unit_ids.contains(unit) {
                problems.push(format!(
                    "relation {} has data for unknown remote unit {unit}",
                    relation.id
                ));
            }
        }
    }

    for container in &state.containers {
        if !meta.containers.contains_key(&container.name) {
            problems.push(format!("container '{}' is not declared", container.name));
        }
    }

    for (key, value) in &state.config {
        match meta.config.get(key) {
            None => problems.push(format!("config option '{key}' is not declared")),
            Some(option) if !option.kind.accepts(value) => problems.push(format!(
                "config option '{key}' expects {:?}, got {}",
                option.kind,
                value.type_name()
            )),
            Some(_) => {}
        }
    }

    let mut storages = BTreeSet::new();
    for storage in &state.storages {
        if !meta.storage.contains_key(&storage.name) {
            problems.push(format!("storage '{}' is not declared", storage.name));
        }
        if !storages.insert(storage.id()) {
            problems.push(format!("duplicate storage {}", storage.id()));
        }
    }

    let mut secret_ids = BTreeSet::new();
    for secret in &state.secrets {
        if !secret_ids.insert(canonical_id(&secret.id)) {
            problems.push(format!("duplicate secret id {}", secret.id));
        }
    }
    if !state.secrets.is_empty() && !config.juju_version.has_secrets() {
        problems.push(format!(
            "secrets need Juju 3.0.2 or later, simulating {}",
            config.juju_version
        ));
    }

    for binding in state.networks.keys() {
        if !meta.has_binding(binding) {
            problems.push(format!("network binding '{binding}' is not declared"));
        }
    }

    let mut handles = BTreeSet::new();
    for stored in &state.stored_states {
        if !handles.insert(stored.handle_path()) {
            problems.push(format!("duplicate stored state {}", stored.handle_path()));
        }
    }

    for deferred in &state.deferred {
        if let Err(reason) = event_problem(&deferred.event, state, meta) {
            problems.push(format!("deferred {}: {reason}", deferred.handle_path));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::InconsistentState(problems))
    }
}

/// Check that `event` only names entities present in `state` and `meta`.
pub fn check_event(event: &Event, state: &State, meta: &CharmMeta) -> Result<()> {
    event_problem(event, state, meta).map_err(|reason| HarnessError::invalid_event(event.name(), reason))
}

fn event_problem(event: &Event, state: &State, meta: &CharmMeta) -> std::result::Result<(), String> {
    let kind = &event.kind;

    if kind.is_relation() {
        let rel = event.relation.as_ref().ok_or("relation event without a relation")?;
        let relation = state
            .relation(rel.id)
            .ok_or_else(|| format!("relation {} is not in the state", rel.id))?;
        if relation.endpoint != rel.endpoint {
            return Err(format!(
                "relation {} is on '{}', not '{}'",
                rel.id, relation.endpoint, rel.endpoint
            ));
        }
        for unit in [event.remote_unit, event.departing_unit].into_iter().flatten() {
            if !relation.remote_unit_ids.contains(&unit) {
                return Err(format!("relation {} has no remote unit {unit}", rel.id));
            }
        }
    }

    if kind.is_workload() {
        let name = event.container.as_deref().ok_or("workload event without a container")?;
        let container = state
            .container(name)
            .ok_or_else(|| format!("container '{name}' is not in the state"))?;
        if matches!(kind, EventKind::PebbleCheckFailed | EventKind::PebbleCheckRecovered) {
            let check = event.check.as_deref().ok_or("check event without a check name")?;
            let in_plan = container
                .plan()
                .map(|p| p.checks.contains_key(check))
                .unwrap_or(false);
            if !in_plan && !container.check_infos.contains_key(check) {
                return Err(format!("container '{name}' has no check '{check}'"));
            }
        }
    }

    if kind.is_secret() {
        let reference = event.secret.as_ref().ok_or("secret event without a secret")?;
        let secret = state
            .secret(&reference.id)
            .ok_or_else(|| format!("secret {} is not in the state", reference.id))?;
        if kind.is_owner_secret_event() && !secret.is_owned() {
            return Err(format!("{} is only delivered to the secret owner", event.name()));
        }
        if *kind == EventKind::SecretChanged && secret.is_owned() {
            return Err("secret-changed is only delivered to observers".to_string());
        }
    }

    if *kind == EventKind::Action {
        let action = event.action.as_ref().ok_or("action event without an action")?;
        let declared = meta
            .actions
            .get(&action.name)
            .ok_or_else(|| format!("action '{}' is not declared", action.name))?;
        declared.validate(&action.params)?;
    }

    if kind.is_storage() {
        let storage = event.storage.as_ref().ok_or("storage event without a storage")?;
        if state.storage(&storage.name, storage.index).is_none() {
            return Err(format!(
                "storage {}/{} is not in the state",
                storage.name, storage.index
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::JujuVersion;
    use crate::event::Action;
    use crate::meta::{ActionMeta, ActionParam, ConfigOption, ConfigType, ContainerMeta, ParamType};
    use crate::state::{Container, Network, Relation, Secret, SecretOwner, Storage};

    fn meta() -> CharmMeta {
        CharmMeta::new("web")
            .with_requires("db", "pg")
            .with_peer("peers", "web-peers")
            .with_container("workload", ContainerMeta::default())
            .with_config_option("port", ConfigOption::new(ConfigType::Int))
            .with_action(
                "backup",
                ActionMeta::new()
                    .with_param("target", ActionParam::new(ParamType::String))
                    .with_required("target"),
            )
    }

    #[test]
    fn test_consistent_state_passes() {
        let state = State::new()
            .with_relation(Relation::new(1, "db", "pg"))
            .with_relation(Relation::peer(2, "peers", "web-peers"))
            .with_container(Container::new("workload"))
            .with_config("port", 8080)
            .with_network("db", Network::default());
        check_state(&state, &meta(), &HarnessConfig::new()).unwrap();
    }

    #[test]
    fn test_all_problems_are_reported() {
        let state = State::new()
            .with_relation(Relation::new(1, "db", "pg"))
            .with_relation(Relation::new(1, "cache", "redis"))
            .with_relation(Relation::new(3, "peers", "web-peers"))
            .with_container(Container::new("sidecar"))
            .with_config("port", "eighty")
            .with_config("colour", "blue")
            .with_storage(Storage::new("data", 0))
            .with_network("metrics", Network::default());
        let err = check_state(&state, &meta(), &HarnessConfig::new()).unwrap_err();
        let HarnessError::InconsistentState(problems) = err else {
            panic!("expected InconsistentState");
        };
        assert_eq!(problems.len(), 8, "{problems:#?}");
    }

    #[test]
    fn test_secrets_need_recent_juju() {
        let state = State::new().with_secret(Secret::new([("password", "x")]));
        let config = HarnessConfig::new().with_juju_version(JujuVersion::new(2, 9, 0));
        assert!(check_state(&state, &meta(), &config).is_err());
    }

    #[test]
    fn test_event_references() {
        let relation = Relation::new(1, "db", "pg");
        let state = State::new().with_relation(relation.clone());
        check_event(&Event::relation_changed(&relation), &state, &meta()).unwrap();

        let missing = Relation::new(9, "db", "pg");
        let err = check_event(&Event::relation_changed(&missing), &state, &meta()).unwrap_err();
        assert_eq!(err.code(), "InvalidEventError");

        let err = check_event(&Event::relation_joined(&relation, 5), &state, &meta()).unwrap_err();
        assert!(err.to_string().contains("no remote unit 5"));

        let container = Container::new("workload");
        assert!(check_event(&Event::pebble_ready(&container), &state, &meta()).is_err());
    }

    #[test]
    fn test_secret_event_audience() {
        let owned = Secret::new([("password", "x")]).owned_by(SecretOwner::App);
        let observed = Secret::new([("password", "y")]);
        let state = State::new().with_secret(owned.clone()).with_secret(observed.clone());

        check_event(&Event::secret_rotate(&owned), &state, &meta()).unwrap();
        check_event(&Event::secret_changed(&observed), &state, &meta()).unwrap();
        assert!(check_event(&Event::secret_changed(&owned), &state, &meta()).is_err());
        assert!(check_event(&Event::secret_expired(&observed, 1), &state, &meta()).is_err());
    }

    #[test]
    fn test_action_params_are_validated() {
        let state = State::new();
        let ok = Event::action(Action::new("backup").with_param("target", json!("s3")));
        check_event(&ok, &state, &meta()).unwrap();

        let missing = Event::action(Action::new("backup"));
        assert!(check_event(&missing, &state, &meta()).is_err());

        let undeclared = Event::action(Action::new("restore"));
        assert!(check_event(&undeclared, &state, &meta()).is_err());
    }
}
