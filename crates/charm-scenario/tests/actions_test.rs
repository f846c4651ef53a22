// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action handling: parameters, results, logs and failure.

mod common;

use charm_scenario::{Action, Event, EventKind, HarnessError, ModelError, State, from_fn};
use common::*;
use serde_json::{Map, Value, json};

fn backup_charm() -> impl charm_scenario::Charm {
    from_fn(|fw, event| {
        if event.kind != EventKind::Action {
            return Ok(());
        }
        let params = fw.model().action_get()?;
        let target = params["target"].as_str().unwrap_or_default().to_string();
        fw.model().action_log(&format!("backing up to {target}"))?;
        if !target.starts_with("s3://") {
            fw.model().action_fail("only s3 targets are supported")?;
            return Ok(());
        }
        let mut results = Map::new();
        results.insert("location".to_string(), json!(target));
        results.insert("compressed".to_string(), params["compress"].clone());
        results.insert("stats".to_string(), json!({ "file-count": 12 }));
        fw.model().action_set(results)?;
        Ok(())
    })
}

#[test]
fn test_action_results_and_defaults() {
    let ctx = context();
    let event = Event::action(Action::new("backup").with_param("target", json!("s3://bucket")));
    let output = ctx.run(&backup_charm(), event, &State::new()).unwrap();

    assert!(!output.action_failed());
    let results = output.action_results().unwrap();
    assert_eq!(results["location"], "s3://bucket");
    assert_eq!(results["compressed"], Value::Bool(true));
    assert_eq!(results["stats"]["file-count"], 12);
    assert_eq!(
        output.action.as_ref().unwrap().logs,
        vec!["backing up to s3://bucket"]
    );
    assert_eq!(output.trace.emitted_names(false), vec!["backup-action"]);
}

#[test]
fn test_action_fail_is_reported_not_raised() {
    let ctx = context();
    let event = Event::action(Action::new("backup").with_param("target", json!("/tmp/x")));
    let output = ctx.run(&backup_charm(), event, &State::new()).unwrap();
    assert!(output.action_failed());
    assert_eq!(
        output.action.unwrap().failure.as_deref(),
        Some("only s3 targets are supported")
    );
}

#[test]
fn test_action_params_are_checked_before_dispatch() {
    let ctx = context();
    let missing = Event::action(Action::new("backup"));
    let err = ctx.run(&backup_charm(), missing, &State::new()).unwrap_err();
    assert!(matches!(err, HarnessError::InvalidEvent { .. }));

    let wrong_type = Event::action(Action::new("backup").with_param("target", json!(42)));
    let err = ctx.run(&backup_charm(), wrong_type, &State::new()).unwrap_err();
    assert_eq!(err.code(), "InvalidEventError");

    let undeclared = Event::action(Action::new("restore"));
    assert!(ctx.run(&backup_charm(), undeclared, &State::new()).is_err());
}

#[test]
fn test_reserved_result_keys_are_rejected() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Action {
            let mut results = Map::new();
            results.insert("stdout".to_string(), json!("x"));
            fw.model().action_set(results)?;
        }
        Ok(())
    });
    let event = Event::action(Action::new("backup").with_param("target", json!("s3://b")));
    let err = ctx.run(&charm, event, &State::new()).unwrap_err();
    assert!(matches!(
        err.model_error(),
        Some(ModelError::InvalidActionResult(key)) if key == "stdout"
    ));
}

#[test]
fn test_action_tools_outside_actions() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            fw.model().action_get()?;
        }
        Ok(())
    });
    let output = ctx.run(&charm, Event::start(), &State::new());
    let err = output.unwrap_err();
    assert_eq!(err.model_error().map(|e| e.code()), Some("RuntimeError"));
}

#[test]
fn test_non_action_dispatch_has_no_action_output() {
    let ctx = context();
    let output = ctx
        .run(&from_fn(|_, _| Ok(())), Event::start(), &State::new())
        .unwrap();
    assert!(output.action.is_none());
    assert!(output.action_results().is_none());
    assert!(!output.action_failed());
}
