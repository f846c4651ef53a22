// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Behaviour of the example web application operator.

use charm_scenario::{Action, Context, Event, ExecOutput, Output, Port, Relation, State, StatusInfo};
use charm_scenario_example::{
    CONFIG_PATH, CONTAINER, STORED, WebappCharm, metadata, workload_container,
};
use serde_json::json;

fn context() -> Context {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
    Context::new(metadata().unwrap())
}

fn db_with_endpoints() -> Relation {
    Relation::new(1, "db", "postgresql_client")
        .with_remote_app("postgresql")
        .with_remote_app_data([("endpoints", "pg.local:5432")])
}

fn rendered_config(output: &Output) -> String {
    let container = output.state.container(CONTAINER).unwrap();
    String::from_utf8(container.pull(CONFIG_PATH).unwrap()).unwrap()
}

#[test]
fn test_start_without_database_is_deferred_and_blocked() {
    let ctx = context();
    let state = State::new().with_container(workload_container());
    let output = ctx.run(&WebappCharm, Event::start(), &state).unwrap();

    assert_eq!(output.state.deferred.len(), 1);
    assert_eq!(output.state.deferred[0].name(), "start");
    assert_eq!(
        output.state.status.unit,
        StatusInfo::blocked("missing database relation")
    );
    assert!(output.trace.calls_named("pebble-push").next().is_none());
}

#[test]
fn test_database_arrival_replays_start() {
    let ctx = context();
    let state = State::new()
        .with_leader(true)
        .with_container(workload_container());
    let started = ctx.run(&WebappCharm, Event::start(), &state).unwrap();

    let db = db_with_endpoints();
    let ready = started.state.clone().with_relation(db.clone());
    let output = ctx
        .run(&WebappCharm, Event::relation_changed(&db), &ready)
        .unwrap();

    assert!(output.state.deferred.is_empty());
    assert_eq!(
        rendered_config(&output),
        "port: 8080\ndatabase: pg.local:5432\ndebug: false\n"
    );
    assert!(output.state.opened_ports.contains(&Port::tcp(8080)));
    assert_eq!(output.state.status.unit, StatusInfo::active(""));
    assert_eq!(
        output.state.relation(1).unwrap().local_app_data["database"],
        "webapp"
    );
    let stored = output
        .state
        .stored_states
        .iter()
        .find(|s| s.handle_path() == STORED)
        .unwrap();
    assert_eq!(stored.content["db-endpoints"], "pg.local:5432");
}

#[test]
fn test_follower_does_not_write_app_data() {
    let ctx = context();
    let db = db_with_endpoints();
    let state = State::new()
        .with_relation(db.clone())
        .with_container(workload_container());
    let output = ctx
        .run(&WebappCharm, Event::relation_changed(&db), &state)
        .unwrap();
    assert!(output.state.relation(1).unwrap().local_app_data.is_empty());
    assert_eq!(output.trace.calls_named("relation-set").count(), 0);
}

#[test]
fn test_config_is_rendered_from_options() {
    let ctx = context();
    let db = db_with_endpoints();
    let configured = ctx
        .run(
            &WebappCharm,
            Event::relation_changed(&db),
            &State::new()
                .with_relation(db.clone())
                .with_container(workload_container()),
        )
        .unwrap();

    let state = configured
        .state
        .clone()
        .with_config("port", 9000)
        .with_config("debug", true);
    let output = ctx
        .run(&WebappCharm, Event::config_changed(), &state)
        .unwrap();
    assert_eq!(
        rendered_config(&output),
        "port: 9000\ndatabase: pg.local:5432\ndebug: true\n"
    );
    assert!(output.state.opened_ports.contains(&Port::tcp(9000)));
}

#[test]
fn test_unreachable_container_waits() {
    let ctx = context();
    let db = db_with_endpoints();
    let state = State::new()
        .with_relation(db.clone())
        .with_container(workload_container().with_can_connect(false));
    let output = ctx
        .run(&WebappCharm, Event::relation_changed(&db), &state)
        .unwrap();
    assert_eq!(
        output.state.status.unit,
        StatusInfo::waiting("waiting for workload container")
    );
}

#[test]
fn test_relation_broken_forgets_database() {
    let ctx = context();
    let db = db_with_endpoints();
    let state = State::new()
        .with_relation(db.clone())
        .with_container(workload_container());
    let joined = ctx
        .run(&WebappCharm, Event::relation_changed(&db), &state)
        .unwrap();
    assert_eq!(joined.state.status.unit, StatusInfo::active(""));

    let broken = ctx
        .run(&WebappCharm, Event::relation_broken(&db), &joined.state)
        .unwrap();
    assert_eq!(
        broken.state.status.unit,
        StatusInfo::blocked("missing database relation")
    );
}

#[test]
fn test_backup_action() {
    let ctx = context();
    let container = workload_container().with_exec_mock(
        ["webapp", "backup", "s3://backups", "--compress"],
        ExecOutput::ok("archive s3://backups/webapp.tar.gz\n"),
    );
    let state = State::new().with_container(container);
    let event = Event::action(Action::new("backup").with_param("target", json!("s3://backups")));
    let output = ctx.run(&WebappCharm, event, &state).unwrap();

    assert!(!output.action_failed());
    assert_eq!(
        output.action_results().unwrap()["output"],
        "archive s3://backups/webapp.tar.gz"
    );
    assert_eq!(
        output.action.unwrap().logs,
        vec!["backing up to s3://backups"]
    );
}

#[test]
fn test_backup_action_without_workload_fails() {
    let ctx = context();
    let state = State::new().with_container(workload_container().with_can_connect(false));
    let event = Event::action(
        Action::new("backup")
            .with_param("target", json!("s3://backups"))
            .with_param("compress", json!(false)),
    );
    let output = ctx.run(&WebappCharm, event, &state).unwrap();
    assert!(output.action_failed());
}
