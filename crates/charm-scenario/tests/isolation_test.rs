// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Copy isolation and concurrent dispatches.

mod common;

use std::sync::Arc;

use charm_scenario::{Context, Event, EventKind, LogLevel, Relation, State, StatusInfo, from_fn};
use common::*;
use serde_json::json;

fn busy_charm() -> impl charm_scenario::Charm + Send + Sync {
    from_fn(|fw, event| {
        if event.kind.is_framework() {
            return Ok(());
        }
        let unit = fw.unit_name();
        for id in fw.model().relation_ids("db")? {
            fw.model()
                .relation_set(id, &unit, "seen", json!(event.name()))?;
        }
        fw.model().status_set(StatusInfo::active(event.name()), false)?;
        fw.model().juju_log(LogLevel::Info, &unit)?;
        Ok(())
    })
}

fn rich_state(unit_id: u32) -> State {
    State::new()
        .with_unit_id(unit_id)
        .with_leader(unit_id == 0)
        .with_relation(
            Relation::new(1, "db", "postgresql_client")
                .with_local_unit_data([("seen", "nothing")]),
        )
        .with_config("port", 9000)
}

#[test]
fn test_input_state_is_never_modified() {
    let ctx = context();
    let charm = busy_charm();
    let state = rich_state(0);
    let snapshot = state.to_json().unwrap();

    for event in [Event::start(), Event::config_changed(), Event::update_status()] {
        let output = ctx.run(&charm, event, &state).unwrap();
        assert_ne!(output.state, state);
    }
    assert_eq!(state.to_json().unwrap(), snapshot);
}

#[test]
fn test_failed_dispatch_leaves_input_untouched() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            fw.model().status_set(StatusInfo::blocked("half way"), false)?;
            anyhow::bail!("boom");
        }
        Ok(())
    });
    let state = rich_state(1);
    let before = state.clone();
    let err = ctx.run(&charm, Event::start(), &state).unwrap_err();
    assert_eq!(err.code(), "UncaughtCharmError");
    assert_eq!(err.trace().unwrap().calls_named("status-set").count(), 1);
    assert_eq!(state, before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatches_do_not_share_state() {
    init_tracing();
    let ctx = Arc::new(Context::new(webapp_meta()));

    let mut handles = Vec::new();
    for unit_id in 0..16u32 {
        let ctx = Arc::clone(&ctx);
        handles.push(tokio::task::spawn_blocking(move || {
            let charm = busy_charm();
            let state = rich_state(unit_id);
            let output = ctx.run(&charm, Event::start(), &state)?;
            Ok::<_, charm_scenario::HarnessError>((unit_id, output))
        }));
    }

    for handle in handles {
        let (unit_id, output) = handle.await.unwrap().unwrap();
        let expected = format!("webapp/{unit_id}");
        assert_eq!(output.state.unit_id, unit_id);
        assert_eq!(log_messages(&output), vec![expected.as_str()]);
        assert_eq!(
            output.state.relation(1).unwrap().local_unit_data["seen"],
            "start"
        );
        assert_eq!(output.trace.calls_named("juju-log").count(), 1);
    }
}
