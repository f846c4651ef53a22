// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Config-driven status, collect-status and port management.

mod common;

use charm_scenario::{
    Event, EventKind, HarnessConfig, JujuVersion, Port, State, StatusInfo, StatusName, from_fn,
};
use common::*;
use serde_json::json;

fn debug_gated() -> impl charm_scenario::Charm {
    from_fn(|fw, event| {
        if event.kind == EventKind::ConfigChanged {
            let config = fw.model().config_get()?;
            if config.get("debug").and_then(|v| v.as_bool()) == Some(true) {
                fw.model().status_set(StatusInfo::active("ok"), false)?;
            }
        }
        Ok(())
    })
}

#[test]
fn test_config_changed_sets_status_when_debug() {
    let ctx = context();
    let charm = debug_gated();

    let state = State::new().with_config("debug", true);
    let output = ctx.run(&charm, Event::config_changed(), &state).unwrap();
    assert_eq!(output.state.status.unit.name, StatusName::Active);
    assert_eq!(output.state.status.unit.message, "ok");

    let prior = State::new()
        .with_config("debug", false)
        .with_unit_status(StatusInfo::maintenance("installing"));
    let output = ctx.run(&charm, Event::config_changed(), &prior).unwrap();
    assert_eq!(output.state.status.unit, StatusInfo::maintenance("installing"));

    let output = ctx.run(&charm, Event::config_changed(), &State::new()).unwrap();
    assert_eq!(output.state.status.unit, StatusInfo::default());
}

#[test]
fn test_delta_reports_what_a_dispatch_changed() {
    let ctx = context();
    let charm = debug_gated();

    let quiet = State::new().with_config("debug", false);
    let output = ctx.run(&charm, Event::config_changed(), &quiet).unwrap();
    assert!(output.state.delta(&quiet).unwrap().is_empty());

    let loud = State::new().with_config("debug", true);
    let output = ctx.run(&charm, Event::config_changed(), &loud).unwrap();
    assert_eq!(
        output.state.delta(&loud).unwrap(),
        vec![
            json!({"op": "replace", "path": "/status/unit/message", "value": "ok"}),
            json!({"op": "replace", "path": "/status/unit/name", "value": "active"}),
            json!({
                "op": "add",
                "path": "/status/unit_history/0",
                "value": {"name": "unknown", "message": ""}
            }),
        ]
    );
}

#[test]
fn test_status_history_records_replaced_statuses() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Install {
            fw.model()
                .status_set(StatusInfo::maintenance("installing"), false)?;
            fw.model().status_set(StatusInfo::active("ready"), false)?;
        }
        Ok(())
    });
    let output = ctx.run(&charm, Event::install(), &State::new()).unwrap();
    assert_eq!(output.state.status.unit, StatusInfo::active("ready"));
    assert_eq!(
        output.state.status.unit_history,
        vec![StatusInfo::default(), StatusInfo::maintenance("installing")]
    );
}

#[test]
fn test_app_status_requires_leadership() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            fw.model().status_set(StatusInfo::active("serving"), true)?;
        }
        Ok(())
    });
    let output = ctx
        .run(&charm, Event::start(), &State::new().with_leader(true))
        .unwrap();
    assert_eq!(output.state.status.app, StatusInfo::active("serving"));

    let err = ctx.run(&charm, Event::start(), &State::new()).unwrap_err();
    assert_eq!(err.model_error().map(|e| e.code()), Some("ModelError"));
}

#[test]
fn test_collect_status_picks_most_severe() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        match event.kind {
            EventKind::CollectUnitStatus => {
                fw.add_status(StatusInfo::active("serving"))?;
                fw.add_status(StatusInfo::waiting("db not ready"))?;
                fw.add_status(StatusInfo::maintenance("migrating"))?;
            }
            EventKind::CollectAppStatus => {
                fw.add_status(StatusInfo::active("2 units"))?;
            }
            _ => {}
        }
        Ok(())
    });

    let output = ctx
        .run(&charm, Event::update_status(), &State::new().with_leader(true))
        .unwrap();
    assert_eq!(output.state.status.unit, StatusInfo::maintenance("migrating"));
    assert_eq!(output.state.status.app, StatusInfo::active("2 units"));
    assert_eq!(
        output.trace.emitted_names(true),
        vec![
            "update-status",
            "collect-app-status",
            "collect-unit-status",
            "pre-commit",
            "commit"
        ]
    );
    assert_eq!(output.trace.emitted_names(false), vec!["update-status"]);
}

#[test]
fn test_framework_events_can_be_disabled() {
    let ctx = context().with_config(HarnessConfig::new().with_framework_events(false));
    let charm = from_fn(|_, _| Ok(()));
    let output = ctx.run(&charm, Event::start(), &State::new()).unwrap();
    assert_eq!(
        output.trace.emitted_names(true),
        vec!["start", "collect-unit-status"]
    );
}

#[test]
fn test_port_management_is_idempotent() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        match event.kind {
            EventKind::Start => fw.model().open_port(Port::tcp(8080))?,
            EventKind::Stop => fw.model().close_port(Port::tcp(8080))?,
            _ => {}
        }
        Ok(())
    });

    let open = State::new().with_opened_port(Port::tcp(8080));
    let output = ctx.run(&charm, Event::start(), &open).unwrap();
    assert_eq!(output.state, open);
    assert_eq!(output.trace.failed_calls().count(), 0);

    let closed = State::new();
    let output = ctx.run(&charm, Event::stop(), &closed).unwrap();
    assert_eq!(output.state, closed);
    assert_eq!(output.trace.failed_calls().count(), 0);

    let output = ctx.run(&charm, Event::start(), &closed).unwrap();
    assert!(output.state.opened_ports.contains(&Port::tcp(8080)));
}

#[test]
fn test_ports_need_juju_3_1() {
    let ctx = context().with_config(
        HarnessConfig::new().with_juju_version(JujuVersion::new(2, 9, 44)),
    );
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            fw.model().open_port(Port::tcp(80))?;
        }
        Ok(())
    });
    let err = ctx.run(&charm, Event::start(), &State::new()).unwrap_err();
    assert_eq!(err.model_error().map(|e| e.code()), Some("ModelError"));
}
