// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! A small web application operator used by the example binaries.
//!
//! The operator runs a `webapp` service in the `workload` container and
//! needs a PostgreSQL endpoint from the `db` relation before it can
//! configure it. Until the database shows up, `start`, `config-changed` and
//! `workload-pebble-ready` are deferred. Unit status is computed in
//! `collect-unit-status` from what the operator knows at commit time.

use charm_scenario::state::Startup;
use charm_scenario::{
    Charm, CharmMeta, Container, EventHandle, EventKind, Framework, Layer, LogLevel, Mount, Port,
    Service, StatusInfo,
};
use serde_json::{Map, Value, json};
use tracing::debug;

/// Container the workload runs in.
pub const CONTAINER: &str = "workload";
/// Where the rendered configuration is pushed.
pub const CONFIG_PATH: &str = "/etc/webapp/config.yaml";
/// Stored state holding the database endpoints.
pub const STORED: &str = "WebappCharm/StoredStateData[_stored]";

const METADATA: &str = r#"{
    "name": "webapp",
    "requires": {"db": {"interface": "postgresql_client", "limit": 1}},
    "provides": {"website": {"interface": "http"}},
    "peers": {"cluster": {"interface": "webapp_peers"}},
    "containers": {"workload": {"resource": "webapp-image"}},
    "actions": {
        "backup": {
            "params": {
                "target": {"type": "string"},
                "compress": {"type": "boolean", "default": true}
            },
            "required": ["target"],
            "additional-properties": false
        }
    },
    "config": {
        "port": {"type": "int", "default": 8080},
        "debug": {"type": "boolean", "default": false}
    }
}"#;

/// Metadata for [`WebappCharm`].
pub fn metadata() -> charm_scenario::Result<CharmMeta> {
    CharmMeta::from_json(METADATA)
}

/// A reachable workload container with the config directory mounted.
pub fn workload_container() -> Container {
    Container::new(CONTAINER)
        .with_can_connect(true)
        .with_mount("config", Mount::new("/etc/webapp"))
}

/// The web application operator.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebappCharm;

impl Charm for WebappCharm {
    fn handle(&self, fw: &mut Framework<'_>, event: &EventHandle) -> anyhow::Result<()> {
        match &event.kind {
            EventKind::Install => {
                fw.model().juju_log(LogLevel::Info, "installing webapp")?;
            }
            EventKind::Start | EventKind::ConfigChanged | EventKind::PebbleReady => {
                self.configure(fw)?;
            }
            EventKind::RelationChanged if is_db(event) => {
                self.on_db_changed(fw, event)?;
            }
            EventKind::RelationBroken if is_db(event) => {
                fw.model().stored_state_set(STORED, Map::new())?;
            }
            EventKind::Action => self.on_backup(fw)?,
            EventKind::CollectUnitStatus => self.collect_unit_status(fw)?,
            _ => {}
        }
        Ok(())
    }
}

fn is_db(event: &EventHandle) -> bool {
    event
        .relation
        .as_ref()
        .is_some_and(|rel| rel.endpoint == "db")
}

impl WebappCharm {
    fn db_endpoints(fw: &mut Framework<'_>) -> anyhow::Result<Option<String>> {
        let stored = fw.model().stored_state_get(STORED)?;
        Ok(stored
            .get("db-endpoints")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn configure(&self, fw: &mut Framework<'_>) -> anyhow::Result<()> {
        let Some(endpoints) = Self::db_endpoints(fw)? else {
            debug!("no database yet, deferring");
            fw.defer()?;
            return Ok(());
        };
        if !fw.pebble().can_connect(CONTAINER) {
            return Ok(());
        }

        let config = fw.model().config_get()?;
        let port = config
            .get("port")
            .and_then(|v| v.as_int())
            .unwrap_or(8080);
        let debug = config.get("debug").and_then(|v| v.as_bool()).unwrap_or(false);
        let port = u16::try_from(port)?;

        let rendered = format!("port: {port}\ndatabase: {endpoints}\ndebug: {debug}\n");
        fw.pebble()
            .push(CONTAINER, CONFIG_PATH, rendered.as_bytes(), true)?;
        let layer = Layer::new().with_service(
            "webapp",
            Service::new(format!("/usr/bin/webapp --config {CONFIG_PATH}"))
                .with_startup(Startup::Enabled),
        );
        fw.pebble().add_layer(CONTAINER, "webapp", &layer, true)?;
        fw.pebble().replan(CONTAINER)?;
        fw.model().open_port(Port::tcp(port))?;
        fw.model()
            .juju_log(LogLevel::Info, &format!("webapp configured on port {port}"))?;
        Ok(())
    }

    fn on_db_changed(&self, fw: &mut Framework<'_>, event: &EventHandle) -> anyhow::Result<()> {
        let Some(rel) = event.relation.as_ref() else {
            return Ok(());
        };
        let remote = fw.model().relation_remote_app_name(rel.id)?;
        let data = fw.model().relation_get(rel.id, &remote)?;
        let Some(endpoints) = data.get("endpoints") else {
            return Ok(());
        };

        let mut stored = Map::new();
        stored.insert("db-endpoints".to_string(), json!(endpoints));
        fw.model().stored_state_set(STORED, stored)?;

        if fw.model().is_leader()? {
            let app = fw.app_name();
            fw.model()
                .relation_set(rel.id, &app, "database", json!("webapp"))?;
        }
        Ok(())
    }

    fn on_backup(&self, fw: &mut Framework<'_>) -> anyhow::Result<()> {
        let params = fw.model().action_get()?;
        let target = params
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !fw.pebble().can_connect(CONTAINER) {
            fw.model()
                .action_fail("workload container is not reachable")?;
            return Ok(());
        }

        let mut command = vec!["webapp", "backup", target.as_str()];
        if params.get("compress").and_then(Value::as_bool) == Some(true) {
            command.push("--compress");
        }
        fw.model().action_log(&format!("backing up to {target}"))?;
        let out = fw.pebble().exec(CONTAINER, &command)?;

        let mut results = Map::new();
        results.insert("output".to_string(), json!(out.stdout.trim()));
        fw.model().action_set(results)?;
        Ok(())
    }

    fn collect_unit_status(&self, fw: &mut Framework<'_>) -> anyhow::Result<()> {
        if Self::db_endpoints(fw)?.is_none() {
            fw.add_status(StatusInfo::blocked("missing database relation"))?;
        }
        if !fw.pebble().can_connect(CONTAINER) {
            fw.add_status(StatusInfo::waiting("waiting for workload container"))?;
        }
        fw.add_status(StatusInfo::active(""))?;
        Ok(())
    }
}
