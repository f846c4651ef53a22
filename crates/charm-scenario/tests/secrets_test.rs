// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secret visibility, ownership and grants through full dispatches.

mod common;

use std::collections::BTreeMap;

use charm_scenario::state::SecretGrant;
use charm_scenario::{
    Event, EventKind, LogLevel, Relation, Secret, SecretOptions, SecretOwner, SecretReadMode,
    State, from_fn,
};
use common::*;

fn db() -> Relation {
    Relation::new(1, "db", "postgresql_client").with_remote_app("postgresql")
}

#[test]
fn test_ungranted_secret_is_invisible_to_every_read() {
    let ctx = context();
    let secret = Secret::new([("password", "s3cr3t")])
        .with_id("secret:cq2dd0nnt8ss73a5uh7g")
        .with_label("db-password");
    let state = State::new().with_relation(db()).with_secret(secret);

    let reads: [(Option<&'static str>, Option<&'static str>); 3] = [
        (Some("secret:cq2dd0nnt8ss73a5uh7g"), None),
        (None, Some("db-password")),
        (Some("cq2dd0nnt8ss73a5uh7g"), Some("db-password")),
    ];
    for (id, label) in reads {
        for mode in [
            SecretReadMode::Tracked,
            SecretReadMode::Peek,
            SecretReadMode::Refresh,
        ] {
            let charm = from_fn(move |fw, event| {
                if event.kind == EventKind::Start {
                    fw.model().secret_get(id, label, mode)?;
                }
                Ok(())
            });
            let err = ctx.run(&charm, Event::start(), &state).unwrap_err();
            assert_eq!(
                err.model_error().map(|e| e.code()),
                Some("SecretsAccessError"),
                "{id:?} {label:?} {mode:?}"
            );
        }
    }
}

#[test]
fn test_granted_consumer_follows_tracked_revision() {
    let ctx = context();
    let secret = Secret::new([("password", "one")])
        .with_id("secret:pg")
        .with_revision(2, [("password", "two")])
        .granted_to(1, "webapp");
    let state = State::new().with_relation(db()).with_secret(secret.clone());
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::SecretChanged {
            let current = fw.model().secret_get(Some("secret:pg"), None, SecretReadMode::Tracked)?;
            let latest = fw.model().secret_get(Some("secret:pg"), None, SecretReadMode::Refresh)?;
            fw.model().juju_log(
                LogLevel::Info,
                &format!("{} -> {}", current["password"], latest["password"]),
            )?;
        }
        Ok(())
    });
    let output = ctx.run(&charm, Event::secret_changed(&secret), &state).unwrap();
    assert_eq!(log_messages(&output), vec!["one -> two"]);
    assert_eq!(output.state.secret("secret:pg").unwrap().tracked_revision, 2);
    assert_eq!(state.secret("secret:pg").unwrap().tracked_revision, 1);
}

#[test]
fn test_pinned_grant_caps_the_revision() {
    let ctx = context();
    let mut secret = Secret::new([("password", "one")])
        .with_id("secret:pinned")
        .with_revision(2, [("password", "two")]);
    secret.grants.push(SecretGrant {
        relation_id: 1,
        grantee: "webapp/0".to_string(),
        revision: Some(1),
    });
    let state = State::new().with_relation(db()).with_secret(secret);
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            let peek = fw.model().secret_get(Some("secret:pinned"), None, SecretReadMode::Peek)?;
            fw.model().juju_log(LogLevel::Info, &peek["password"])?;
        }
        Ok(())
    });
    let output = ctx.run(&charm, Event::start(), &state).unwrap();
    assert_eq!(log_messages(&output), vec!["one"]);
}

#[test]
fn test_grant_then_revoke_restores_visibility() {
    let ctx = context();
    let owned = Secret::new([("api-token", "abc")])
        .with_id("secret:owned")
        .owned_by(SecretOwner::App);
    let state = State::new()
        .with_leader(true)
        .with_relation(db())
        .with_secret(owned);

    let grant_only = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            fw.model().secret_grant("secret:owned", 1, None)?;
        }
        Ok(())
    });
    let granted = ctx.run(&grant_only, Event::start(), &state).unwrap();
    let grants = &granted.state.secret("secret:owned").unwrap().grants;
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].grantee, "postgresql");

    let grant_and_revoke = from_fn(|fw, event| {
        if event.kind == EventKind::Start {
            fw.model().secret_grant("secret:owned", 1, None)?;
            fw.model().secret_grant("secret:owned", 1, None)?;
            fw.model().secret_revoke("secret:owned", 1, None)?;
        }
        Ok(())
    });
    let output = ctx.run(&grant_and_revoke, Event::start(), &state).unwrap();
    assert_eq!(output.state.secrets, state.secrets);
}

#[test]
fn test_app_secrets_are_managed_by_the_leader() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Install {
            let content = BTreeMap::from([("admin-password".to_string(), "pw".to_string())]);
            let id = fw.model().secret_add(
                content,
                SecretOwner::App,
                SecretOptions::labeled("admin"),
            )?;
            fw.model().juju_log(LogLevel::Debug, &id)?;
        }
        Ok(())
    });

    let output = ctx
        .run(&charm, Event::install(), &State::new().with_leader(true))
        .unwrap();
    assert_eq!(output.state.secrets.len(), 1);
    let added = &output.state.secrets[0];
    assert_eq!(added.owner, Some(SecretOwner::App));
    assert_eq!(added.label.as_deref(), Some("admin"));
    assert_eq!(log_messages(&output), vec![added.id.as_str()]);

    let err = ctx.run(&charm, Event::install(), &State::new()).unwrap_err();
    assert_eq!(err.model_error().map(|e| e.code()), Some("ModelError"));
}

#[test]
fn test_secret_set_creates_revision_and_remove_drops_it() {
    let ctx = context();
    let owned = Secret::new([("api-token", "v1")])
        .with_id("secret:rotating")
        .owned_by(SecretOwner::Unit);
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::SecretRotate {
            let content = BTreeMap::from([("api-token".to_string(), "v2".to_string())]);
            fw.model()
                .secret_set("secret:rotating", Some(content), SecretOptions::default())?;
            fw.model().secret_remove("secret:rotating", Some(1))?;
        }
        Ok(())
    });
    let state = State::new().with_secret(owned.clone());
    let output = ctx.run(&charm, Event::secret_rotate(&owned), &state).unwrap();
    let secret = output.state.secret("secret:rotating").unwrap();
    assert_eq!(secret.revisions.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(secret.revisions[&2]["api-token"], "v2");
}

#[test]
fn test_invalid_secret_keys_are_rejected() {
    let ctx = context();
    let charm = from_fn(|fw, event| {
        if event.kind == EventKind::Install {
            let content = BTreeMap::from([("X".to_string(), "v".to_string())]);
            fw.model()
                .secret_add(content, SecretOwner::Unit, SecretOptions::default())?;
        }
        Ok(())
    });
    let err = ctx.run(&charm, Event::install(), &State::new()).unwrap_err();
    assert!(matches!(
        err.model_error(),
        Some(charm_scenario::ModelError::InvalidSecretContent(_))
    ));
}
