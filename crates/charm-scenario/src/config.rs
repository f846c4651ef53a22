// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Harness configuration loading from environment variables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default simulated Juju version.
pub const DEFAULT_JUJU_VERSION: &str = "3.4.0";

/// Default bound on nested custom event emission.
pub const DEFAULT_MAX_EMIT_DEPTH: usize = 32;

/// Default charm directory reported to the operator.
pub const DEFAULT_CHARM_DIR: &str = "/var/lib/juju/charm";

/// Settings shared by every dispatch a [`Context`](crate::Context) runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Juju version the backend pretends to be
    pub juju_version: JujuVersion,
    /// Maximum depth of custom events emitted from within handlers
    pub max_emit_depth: usize,
    /// Deliver `pre-commit` and `commit` to the operator after each dispatch
    pub framework_events: bool,
    /// Value of `JUJU_CHARM_DIR`
    pub charm_dir: String,
    /// Set `JUJU_DEBUG` in the environment shim
    pub debug: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessConfig {
    /// Configuration with built-in defaults.
    pub fn new() -> Self {
        Self {
            juju_version: JujuVersion::new(3, 4, 0),
            max_emit_depth: DEFAULT_MAX_EMIT_DEPTH,
            framework_events: true,
            charm_dir: DEFAULT_CHARM_DIR.to_string(),
            debug: false,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `SCENARIO_JUJU_VERSION`: simulated Juju version (default: 3.4.0)
    /// - `SCENARIO_MAX_EMIT_DEPTH`: nested emission bound (default: 32)
    /// - `SCENARIO_FRAMEWORK_EVENTS`: deliver pre-commit/commit (default: true)
    /// - `SCENARIO_CHARM_DIR`: charm directory (default: /var/lib/juju/charm)
    /// - `SCENARIO_DEBUG`: set JUJU_DEBUG in the shim (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let juju_version: JujuVersion = std::env::var("SCENARIO_JUJU_VERSION")
            .unwrap_or_else(|_| DEFAULT_JUJU_VERSION.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SCENARIO_JUJU_VERSION", "must look like 3.1.6")
            })?;

        let max_emit_depth: usize = std::env::var("SCENARIO_MAX_EMIT_DEPTH")
            .unwrap_or_else(|_| DEFAULT_MAX_EMIT_DEPTH.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("SCENARIO_MAX_EMIT_DEPTH", "must be a positive integer")
            })?;
        if max_emit_depth == 0 {
            return Err(ConfigError::Invalid(
                "SCENARIO_MAX_EMIT_DEPTH",
                "must be a positive integer",
            ));
        }

        let framework_events = parse_flag("SCENARIO_FRAMEWORK_EVENTS", true)?;
        let debug = parse_flag("SCENARIO_DEBUG", false)?;

        let charm_dir =
            std::env::var("SCENARIO_CHARM_DIR").unwrap_or_else(|_| DEFAULT_CHARM_DIR.to_string());

        Ok(Self {
            juju_version,
            max_emit_depth,
            framework_events,
            charm_dir,
            debug,
        })
    }

    /// Set the simulated Juju version.
    pub fn with_juju_version(mut self, version: JujuVersion) -> Self {
        self.juju_version = version;
        self
    }

    /// Set the nested emission bound.
    pub fn with_max_emit_depth(mut self, depth: usize) -> Self {
        self.max_emit_depth = depth.max(1);
        self
    }

    /// Enable or disable delivery of `pre-commit`/`commit`.
    pub fn with_framework_events(mut self, enabled: bool) -> Self {
        self.framework_events = enabled;
        self
    }

    /// Set the charm directory reported in the shim.
    pub fn with_charm_dir(mut self, dir: impl Into<String>) -> Self {
        self.charm_dir = dir.into();
        self
    }

    /// Enable or disable `JUJU_DEBUG`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

fn parse_flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(var, "must be true or false")),
        },
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

/// A Juju agent version, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JujuVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl JujuVersion {
    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether secrets hook tools are available.
    pub fn has_secrets(&self) -> bool {
        *self >= Self::new(3, 0, 2)
    }

    /// Whether `open-port`/`close-port` are available.
    pub fn supports_open_port(&self) -> bool {
        *self >= Self::new(3, 1, 0)
    }
}

impl fmt::Display for JujuVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error parsing a [`JujuVersion`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Juju version '{0}'")]
pub struct ParseVersionError(String);

impl FromStr for JujuVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        // "3.1-beta1" and "3.1.6.1" both occur in the wild; tags and build
        // numbers do not take part in comparisons.
        let mut parts = s.trim().split('.');
        let number = |part: Option<&str>| -> Result<Option<u32>, ParseVersionError> {
            match part {
                None => Ok(None),
                Some(p) => {
                    let digits = p.split('-').next().unwrap_or_default();
                    digits.parse().map(Some).map_err(|_| err())
                }
            }
        };
        let major = number(parts.next())?.ok_or_else(err)?;
        let minor = number(parts.next())?.ok_or_else(err)?;
        let patch = number(parts.next())?.unwrap_or(0);
        Ok(Self::new(major, minor, patch))
    }
}

impl Serialize for JujuVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JujuVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    const VARS: [&str; 5] = [
        "SCENARIO_JUJU_VERSION",
        "SCENARIO_MAX_EMIT_DEPTH",
        "SCENARIO_FRAMEWORK_EVENTS",
        "SCENARIO_CHARM_DIR",
        "SCENARIO_DEBUG",
    ];

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in VARS {
            guard.remove(var);
        }

        let config = HarnessConfig::from_env().unwrap();

        assert_eq!(config, HarnessConfig::new());
        assert_eq!(config.juju_version.to_string(), "3.4.0");
        assert_eq!(config.max_emit_depth, 32);
        assert!(config.framework_events);
        assert!(!config.debug);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("SCENARIO_JUJU_VERSION", "2.9.44");
        guard.set("SCENARIO_MAX_EMIT_DEPTH", "4");
        guard.set("SCENARIO_FRAMEWORK_EVENTS", "false");
        guard.set("SCENARIO_CHARM_DIR", "/tmp/charm");
        guard.set("SCENARIO_DEBUG", "yes");

        let config = HarnessConfig::from_env().unwrap();

        assert_eq!(config.juju_version, JujuVersion::new(2, 9, 44));
        assert_eq!(config.max_emit_depth, 4);
        assert!(!config.framework_events);
        assert_eq!(config.charm_dir, "/tmp/charm");
        assert!(config.debug);
    }

    #[test]
    fn test_config_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        for var in VARS {
            guard.remove(var);
        }

        guard.set("SCENARIO_MAX_EMIT_DEPTH", "0");
        let err = HarnessConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("SCENARIO_MAX_EMIT_DEPTH", _)
        ));

        guard.set("SCENARIO_MAX_EMIT_DEPTH", "8");
        guard.set("SCENARIO_JUJU_VERSION", "three");
        let err = HarnessConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("SCENARIO_JUJU_VERSION"));

        guard.set("SCENARIO_JUJU_VERSION", "3.1");
        guard.set("SCENARIO_DEBUG", "maybe");
        let err = HarnessConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("SCENARIO_DEBUG", _)));
    }

    #[test]
    fn test_builder_chain() {
        let config = HarnessConfig::new()
            .with_juju_version(JujuVersion::new(3, 0, 0))
            .with_max_emit_depth(0)
            .with_framework_events(false)
            .with_charm_dir("/charm")
            .with_debug(true);

        assert_eq!(config.juju_version, JujuVersion::new(3, 0, 0));
        assert_eq!(config.max_emit_depth, 1);
        assert!(!config.framework_events);
        assert_eq!(config.charm_dir, "/charm");
        assert!(config.debug);
    }

    #[test]
    fn test_juju_version_parsing_and_gates() {
        assert_eq!("3.1-beta1".parse(), Ok(JujuVersion::new(3, 1, 0)));
        assert_eq!("3.1.6.1".parse(), Ok(JujuVersion::new(3, 1, 6)));
        assert!("3".parse::<JujuVersion>().is_err());
        assert!("".parse::<JujuVersion>().is_err());

        assert!(!JujuVersion::new(3, 0, 1).has_secrets());
        assert!(JujuVersion::new(3, 0, 2).has_secrets());
        assert!(!JujuVersion::new(3, 0, 9).supports_open_port());
        assert!(JujuVersion::new(3, 1, 0).supports_open_port());
        assert!(JujuVersion::new(2, 9, 44) < JujuVersion::new(3, 0, 0));
    }
}
