// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Relation membership and databag access rules.

use serde_json::Value;

use super::{ModelBackend, SimulatedBackend};
use crate::error::{ModelError, ModelResult};
use crate::event::EventKind;
use crate::state::{BagRef, Databag, Relation, RelationId};

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl SimulatedBackend {
    pub(super) fn relation(&self, relation_id: RelationId) -> ModelResult<&Relation> {
        self.state
            .relation(relation_id)
            .ok_or(ModelError::RelationNotFound { relation_id })
    }

    /// Whether the dispatched hook is `kind` on this relation.
    fn hook_is(&self, kind: EventKind, relation_id: RelationId) -> bool {
        self.hook.kind == kind && self.hook.relation_id() == Some(relation_id)
    }

    pub(super) fn list_relation_units(&self, relation_id: RelationId) -> ModelResult<Vec<String>> {
        let relation = self.relation(relation_id)?;
        if self.hook_is(EventKind::RelationBroken, relation_id) {
            return Ok(Vec::new());
        }
        let departing = if self.hook_is(EventKind::RelationDeparted, relation_id) {
            self.hook.departing_unit
        } else {
            None
        };
        let app = self.app_name();
        Ok(relation
            .remote_unit_ids
            .iter()
            .filter(|id| Some(**id) != departing)
            .map(|id| relation.remote_unit_name(&app, *id))
            .collect())
    }

    pub(super) fn read_databag(&self, relation_id: RelationId, member: &str) -> ModelResult<Databag> {
        let relation = self.relation(relation_id)?;
        let bag = relation
            .resolve(member, &self.app_name(), self.state.unit_id)
            .ok_or_else(|| ModelError::RelationMemberNotFound {
                relation_id,
                member: member.to_string(),
            })?;
        if bag == BagRef::LocalApp && !relation.is_peer() && !self.state.leader {
            return Err(ModelError::RelationDataAccess {
                relation_id,
                owner: member.to_string(),
                reason: "only the leader may read its own application databag".to_string(),
            });
        }
        Ok(relation.bag(bag).cloned().unwrap_or_default())
    }

    pub(super) fn write_databag(
        &mut self,
        relation_id: RelationId,
        member: &str,
        key: &str,
        value: Value,
    ) -> ModelResult<()> {
        let value = match value {
            Value::String(s) => s,
            other => {
                return Err(ModelError::RelationDataType {
                    key: key.to_string(),
                    value_type: json_type(&other),
                });
            }
        };
        let app = self.app_name();
        let unit_id = self.state.unit_id;
        let leader = self.state.leader;
        let relation = self
            .state
            .relation_mut(relation_id)
            .ok_or(ModelError::RelationNotFound { relation_id })?;
        let bag = relation.resolve(member, &app, unit_id).ok_or_else(|| {
            ModelError::RelationDataAccess {
                relation_id,
                owner: member.to_string(),
                reason: "not a member of the relation".to_string(),
            }
        })?;
        if bag == BagRef::LocalApp && !leader {
            return Err(ModelError::RelationDataAccess {
                relation_id,
                owner: member.to_string(),
                reason: "only the leader may write the application databag".to_string(),
            });
        }
        let data = relation
            .local_bag_mut(bag)
            .ok_or_else(|| ModelError::RelationDataAccess {
                relation_id,
                owner: member.to_string(),
                reason: "remote databags are read-only".to_string(),
            })?;
        if value.is_empty() {
            data.remove(key);
        } else {
            data.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::JujuVersion;
    use crate::event::Event;
    use crate::meta::CharmMeta;
    use crate::state::State;

    fn db() -> Relation {
        Relation::new(1, "db", "pg")
            .with_remote_app("postgresql")
            .with_remote_units([0, 1])
            .with_remote_app_data([("host", "pg.local")])
            .with_remote_unit_data(1, [("ready", "yes")])
    }

    fn backend(state: State, hook: &Event) -> SimulatedBackend {
        let meta = Arc::new(CharmMeta::new("web").with_requires("db", "pg").with_peer("peers", "web-peers"));
        SimulatedBackend::new(state, meta, JujuVersion::new(3, 4, 0), hook)
    }

    #[test]
    fn test_relation_list_hides_departing_and_broken() {
        let relation = db();
        let state = State::new().with_relation(relation.clone());

        let mut b = backend(state.clone(), &Event::start());
        assert_eq!(
            b.relation_list(1).unwrap(),
            vec!["postgresql/0", "postgresql/1"]
        );

        let mut b = backend(state.clone(), &Event::relation_departed(&relation, 1));
        assert_eq!(b.relation_list(1).unwrap(), vec!["postgresql/0"]);

        let mut b = backend(state, &Event::relation_broken(&relation));
        assert!(b.relation_list(1).unwrap().is_empty());
        assert!(matches!(
            b.relation_list(7),
            Err(ModelError::RelationNotFound { relation_id: 7 })
        ));
    }

    #[test]
    fn test_relation_get_access() {
        let mut b = backend(State::new().with_relation(db()), &Event::start());
        assert_eq!(b.relation_get(1, "postgresql").unwrap()["host"], "pg.local");
        assert_eq!(b.relation_get(1, "postgresql/1").unwrap()["ready"], "yes");
        assert!(b.relation_get(1, "postgresql/0").unwrap().is_empty());
        assert!(b.relation_get(1, "web/0").unwrap().is_empty());

        let err = b.relation_get(1, "web").unwrap_err();
        assert!(err.is_access_denied());
        assert!(matches!(
            b.relation_get(1, "postgresql/9"),
            Err(ModelError::RelationMemberNotFound { .. })
        ));
    }

    #[test]
    fn test_peer_app_bag_readable_by_followers() {
        let peers = Relation::peer(2, "peers", "web-peers").with_local_app_data([("token", "t")]);
        let mut b = backend(State::new().with_relation(peers), &Event::start());
        assert_eq!(b.relation_get(2, "web").unwrap()["token"], "t");
    }

    #[test]
    fn test_relation_set_rules() {
        let mut b = backend(State::new().with_relation(db()), &Event::start());
        b.relation_set(1, "web/0", "url", json!("http://web")).unwrap();
        assert_eq!(b.state().relations[0].local_unit_data["url"], "http://web");

        b.relation_set(1, "web/0", "url", json!("")).unwrap();
        assert!(b.state().relations[0].local_unit_data.is_empty());

        let err = b.relation_set(1, "web/0", "port", json!(8080)).unwrap_err();
        assert_eq!(
            err,
            ModelError::RelationDataType {
                key: "port".to_string(),
                value_type: "number"
            }
        );

        assert!(b.relation_set(1, "web", "k", json!("v")).unwrap_err().is_access_denied());
        assert!(
            b.relation_set(1, "postgresql", "k", json!("v"))
                .unwrap_err()
                .is_access_denied()
        );
        assert_eq!(b.trace().failed_calls().count(), 3);
    }

    #[test]
    fn test_leader_writes_app_bag() {
        let mut b = backend(State::new().with_leader(true).with_relation(db()), &Event::start());
        b.relation_set(1, "web", "endpoint", json!("web:80")).unwrap();
        assert_eq!(b.relation_get(1, "web").unwrap()["endpoint"], "web:80");
    }
}
