// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deferral Example - events wait for a database and replay once it arrives.
//!
//! This example shows:
//! - Feeding each output State into the next dispatch
//! - `start` being deferred while the database is missing
//! - The deferred `start` replaying after `db-relation-changed`
//! - Status computed in `collect-unit-status`
//!
//! Run with: cargo run -p charm-scenario-example --bin deferral_example

use charm_scenario::{Context, Event, Output, Relation, State};
use charm_scenario_example::{CONFIG_PATH, CONTAINER, WebappCharm, metadata, workload_container};
use tracing::info;

fn report(step: &str, output: &Output) {
    let queued: Vec<&str> = output
        .state
        .deferred
        .iter()
        .map(|d| d.handle_path.as_str())
        .collect();
    info!(
        step,
        events = ?output.trace.emitted_names(false),
        deferred = ?queued,
        unit_status = %output.state.status.unit,
        "dispatch finished"
    );
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Deferral Example: waiting for a database ===");

    let ctx = Context::from_env(metadata()?)?;
    let charm = WebappCharm;

    let initial = State::new()
        .with_leader(true)
        .with_container(workload_container());

    // 1. No database: start is deferred and the unit is blocked.
    let started = ctx.run(&charm, Event::start(), &initial)?;
    report("start", &started);

    // 2. The relation is created, but the database has not published anything.
    let db = Relation::new(1, "db", "postgresql_client").with_remote_app("postgresql");
    let joined = started.state.clone().with_relation(db.clone());
    let created = ctx.run(&charm, Event::relation_created(&db), &joined)?;
    report("db-relation-created", &created);

    // 3. Endpoints arrive; the deferred start replays and configures the workload.
    let mut published = created.state.clone();
    if let Some(relation) = published.relations.iter_mut().find(|r| r.id == db.id) {
        relation
            .remote_app_data
            .insert("endpoints".to_string(), "pg.local:5432".to_string());
    }
    let changed = ctx.run(&charm, Event::relation_changed(&db), &published)?;
    report("db-relation-changed", &changed);

    let rendered = changed
        .state
        .container(CONTAINER)
        .and_then(|c| c.pull(CONFIG_PATH).ok());
    if let Some(rendered) = rendered {
        info!(
            path = CONFIG_PATH,
            config = %String::from_utf8_lossy(&rendered),
            "workload configured"
        );
    }
    Ok(())
}
