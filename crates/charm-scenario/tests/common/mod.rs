// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for charm-scenario integration tests.
//!
//! Provides the metadata of a small web application operator and helpers for
//! building contexts and reading results.

#![allow(dead_code)]

use charm_scenario::{
    ActionMeta, ActionParam, CharmMeta, ConfigOption, ConfigType, ContainerMeta, Context, Output,
    ParamType, StorageMeta,
};

/// Install a test-friendly subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Metadata of the operator most tests run.
pub fn webapp_meta() -> CharmMeta {
    CharmMeta::new("webapp")
        .with_requires("db", "postgresql_client")
        .with_provides("website", "http")
        .with_peer("cluster", "webapp_peers")
        .with_container("workload", ContainerMeta::default())
        .with_storage("data", StorageMeta::default())
        .with_config_option("debug", ConfigOption::new(ConfigType::Boolean).with_default(false))
        .with_config_option("port", ConfigOption::new(ConfigType::Int).with_default(8080))
        .with_action(
            "backup",
            ActionMeta::new()
                .with_param("target", ActionParam::new(ParamType::String))
                .with_param(
                    "compress",
                    ActionParam::new(ParamType::Boolean).with_default(serde_json::json!(true)),
                )
                .with_required("target"),
        )
}

/// A context over [`webapp_meta`].
pub fn context() -> Context {
    init_tracing();
    Context::new(webapp_meta())
}

/// Messages logged with `juju-log`, in order.
pub fn log_messages(output: &Output) -> Vec<&str> {
    output
        .state
        .juju_log
        .iter()
        .map(|line| line.message.as_str())
        .collect()
}
