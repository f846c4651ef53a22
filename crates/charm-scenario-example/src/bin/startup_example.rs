// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Startup Example - plays the builtin startup and teardown sequences.
//!
//! This example shows:
//! - Loading harness settings from the environment (and `.env`)
//! - Building a template State with a database relation and a container
//! - Running every builtin sequence for a leader and a follower
//! - Inspecting the final State of each dispatch
//!
//! Run with: cargo run -p charm-scenario-example --bin startup_example

use charm_scenario::{Context, Relation, State, check_builtin_sequences};
use charm_scenario_example::{WebappCharm, metadata, workload_container};
use tracing::info;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Startup Example: builtin sequences ===");

    let ctx = Context::from_env(metadata()?)?;
    info!(juju_version = %ctx.config().juju_version, "harness configured");

    let template = State::new()
        .with_relation(
            Relation::new(1, "db", "postgresql_client")
                .with_remote_app("postgresql")
                .with_remote_app_data([("endpoints", "pg.local:5432")]),
        )
        .with_container(workload_container());

    let outputs = check_builtin_sequences(&ctx, &WebappCharm, &template)?;
    for output in &outputs {
        let emitted = output.trace.emitted_names(false);
        info!(
            events = ?emitted,
            unit_status = %output.state.status.unit,
            deferred = output.state.deferred.len(),
            calls = output.trace.calls().count(),
            "dispatch finished"
        );
    }

    info!(dispatches = outputs.len(), "all sequences passed");
    Ok(())
}
