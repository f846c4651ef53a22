// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for charm-scenario.
//!
//! Two families are defined here:
//!
//! - [`ModelError`] is what the simulated backend hands back to the operator
//!   under test. Each variant mirrors an error the real platform surfaces, and
//!   [`ModelError::code`] returns the platform's error class name so traces
//!   and assertions can match on it.
//! - [`HarnessError`] is what a dispatch returns to the test calling it.

use thiserror::Error;

use crate::config::ConfigError;
use crate::state::RelationId;
use crate::trace::Trace;

/// Result type for backend calls.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors surfaced by the simulated backend to the operator under test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The call has no backend implementation installed.
    #[error("{call} is not implemented by this backend")]
    NotImplemented {
        /// Hook tool name.
        call: &'static str,
    },

    /// No relation with this id exists in the state.
    #[error("relation {relation_id} not found")]
    RelationNotFound {
        /// The requested relation id.
        relation_id: RelationId,
    },

    /// The unit may not read or write this databag.
    #[error("relation {relation_id}: access to databag of '{owner}' denied: {reason}")]
    RelationDataAccess {
        /// Relation the databag belongs to.
        relation_id: RelationId,
        /// Unit or application owning the databag.
        owner: String,
        /// Why access was refused.
        reason: String,
    },

    /// A relation databag value was not a string.
    #[error("relation data value for key '{key}' must be a string, got {value_type}")]
    RelationDataType {
        /// Offending key.
        key: String,
        /// JSON type of the rejected value.
        value_type: &'static str,
    },

    /// The unit or application is not a member of the relation.
    #[error("relation {relation_id}: '{member}' is not a member")]
    RelationMemberNotFound {
        /// Relation id.
        relation_id: RelationId,
        /// Unit or application name.
        member: String,
    },

    /// No secret matches the id or label.
    #[error("secret '{0}' not found")]
    SecretNotFound(String),

    /// The unit may not perform this secret operation.
    #[error("secret '{secret_id}': {reason}")]
    SecretsAccess {
        /// Secret id.
        secret_id: String,
        /// Why access was refused.
        reason: String,
    },

    /// Secret content failed validation.
    #[error("invalid secret content: {0}")]
    InvalidSecretContent(String),

    /// The call requires leadership.
    #[error("{call} requires leadership")]
    LeadershipRequired {
        /// Hook tool name.
        call: &'static str,
    },

    /// The status cannot be set by an operator.
    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    /// A port specification was rejected.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// No container with this name is declared.
    #[error("container '{0}' not found")]
    ContainerNotFound(String),

    /// The workload container cannot be reached.
    #[error("cannot connect to pebble in container '{0}'")]
    Connection(String),

    /// The path is outside every mount or does not exist.
    #[error("{container}: path not found: {path}")]
    PathNotFound {
        /// Container name.
        container: String,
        /// Requested path.
        path: String,
    },

    /// The filesystem operation is invalid for the path.
    #[error("{container}: {path}: {message}")]
    Path {
        /// Container name.
        container: String,
        /// Requested path.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// Pebble rejected the request.
    #[error("{container}: pebble API error: {message}")]
    PebbleApi {
        /// Container name.
        container: String,
        /// What went wrong.
        message: String,
    },

    /// The command has no exec mock in the container.
    #[error("{container}: no exec mock matches command {command:?}")]
    ExecNotMocked {
        /// Container name.
        container: String,
        /// Full command line.
        command: Vec<String>,
    },

    /// The mocked command exited non-zero.
    #[error("command {command:?} exited with status {exit_code}")]
    ExecFailed {
        /// Full command line.
        command: Vec<String>,
        /// Exit status.
        exit_code: i32,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },

    /// No network binding with this name.
    #[error("binding '{0}' not found")]
    NetworkNotFound(String),

    /// No storage with this name or id.
    #[error("storage '{0}' not found")]
    StorageNotFound(String),

    /// The call is only valid while handling an action.
    #[error("{call} is only available while handling an action")]
    NotInAction {
        /// Hook tool name.
        call: &'static str,
    },

    /// An action result key was rejected.
    #[error("invalid action result key '{0}'")]
    InvalidActionResult(String),

    /// No stored snapshot matches the handle path.
    #[error("no snapshot for handle '{0}'")]
    NoSnapshot(String),

    /// The event kind cannot be deferred.
    #[error("cannot defer {0}")]
    CannotDefer(String),

    /// The simulated Juju version lacks the feature.
    #[error("{call} requires Juju {required} or later (running {running})")]
    JujuVersionTooOld {
        /// Hook tool name.
        call: &'static str,
        /// Minimum version.
        required: &'static str,
        /// Simulated version.
        running: String,
    },
}

impl ModelError {
    /// Error class name as the operator library would raise it.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotImplemented { .. } => "NotImplementedError",
            Self::RelationNotFound { .. } => "RelationNotFoundError",
            Self::RelationDataAccess { .. } => "RelationDataAccessError",
            Self::RelationDataType { .. } => "RelationDataTypeError",
            Self::RelationMemberNotFound { .. } => "RelationNotFoundError",
            Self::SecretNotFound(_) => "SecretNotFoundError",
            Self::SecretsAccess { .. } => "SecretsAccessError",
            Self::InvalidSecretContent(_) => "ValueError",
            Self::LeadershipRequired { .. } => "ModelError",
            Self::InvalidStatus(_) => "InvalidStatusError",
            Self::InvalidPort(_) => "ModelError",
            Self::ContainerNotFound(_) => "ModelError",
            Self::Connection(_) => "ConnectionError",
            Self::PathNotFound { .. } => "PathNotFoundError",
            Self::Path { .. } => "PathError",
            Self::PebbleApi { .. } => "APIError",
            Self::ExecNotMocked { .. } => "ExecError",
            Self::ExecFailed { .. } => "ExecError",
            Self::NetworkNotFound(_) => "ModelError",
            Self::StorageNotFound(_) => "ModelError",
            Self::NotInAction { .. } => "RuntimeError",
            Self::InvalidActionResult(_) => "ModelError",
            Self::NoSnapshot(_) => "NoSnapshotError",
            Self::CannotDefer(_) => "RuntimeError",
            Self::JujuVersionTooOld { .. } => "ModelError",
        }
    }

    /// Whether this is one of the authorization failures.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::RelationDataAccess { .. } | Self::SecretsAccess { .. }
        )
    }
}

/// Errors returned by a dispatch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// The event references something the state or metadata does not have.
    #[error("invalid event '{event}': {reason}")]
    InvalidEvent {
        /// Event name.
        event: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The state does not agree with itself or with the charm metadata.
    #[error("inconsistent state: {}", .0.join("; "))]
    InconsistentState(Vec<String>),

    /// The operator returned an error while handling an event.
    #[error("charm raised while handling '{event}': {error:#}")]
    UncaughtCharm {
        /// Event being handled when the error escaped.
        event: String,
        /// The operator's error, unmodified.
        error: anyhow::Error,
        /// Everything recorded up to the failure.
        trace: Box<Trace>,
    },

    /// Custom event emission nested deeper than allowed.
    #[error("emitting '{event}' exceeds the maximum emit depth of {max_depth}")]
    EmitDepthExceeded {
        /// Event that would have been emitted.
        event: String,
        /// Configured limit.
        max_depth: usize,
        /// Everything recorded up to the failure, attached by the runtime.
        trace: Box<Trace>,
    },

    /// Configuration failed to load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    /// Error class name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent { .. } => "InvalidEventError",
            Self::InconsistentState(_) => "InconsistentScenarioError",
            Self::UncaughtCharm { .. } => "UncaughtCharmError",
            Self::EmitDepthExceeded { .. } => "RecursionError",
            Self::Config(_) => "ConfigError",
            Self::Serialization(_) => "SerializationError",
        }
    }

    /// The trace accumulated before an operator failure, if any.
    pub fn trace(&self) -> Option<&Trace> {
        match self {
            Self::UncaughtCharm { trace, .. } | Self::EmitDepthExceeded { trace, .. } => {
                Some(trace)
            }
            _ => None,
        }
    }

    /// The backend error that escaped the operator, if that is what failed it.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            Self::UncaughtCharm { error, .. } => error.downcast_ref::<ModelError>(),
            _ => None,
        }
    }

    pub(crate) fn invalid_event(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            event: event.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_codes() {
        let err = ModelError::RelationDataAccess {
            relation_id: 3,
            owner: "remote".to_string(),
            reason: "remote databags are read-only".to_string(),
        };
        assert_eq!(err.code(), "RelationDataAccessError");
        assert!(err.is_access_denied());

        let err = ModelError::SecretNotFound("secret:abc".to_string());
        assert_eq!(err.code(), "SecretNotFoundError");
        assert!(!err.is_access_denied());

        let err = ModelError::PathNotFound {
            container: "workload".to_string(),
            path: "/etc/missing".to_string(),
        };
        assert_eq!(err.code(), "PathNotFoundError");
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::RelationDataType {
            key: "port".to_string(),
            value_type: "number",
        };
        assert_eq!(
            err.to_string(),
            "relation data value for key 'port' must be a string, got number"
        );

        let err = ModelError::LeadershipRequired {
            call: "status-set --application",
        };
        assert_eq!(err.to_string(), "status-set --application requires leadership");
    }

    #[test]
    fn test_harness_error_display() {
        let err = HarnessError::invalid_event("db-relation-changed", "relation 4 not in state");
        assert_eq!(err.code(), "InvalidEventError");
        assert_eq!(
            err.to_string(),
            "invalid event 'db-relation-changed': relation 4 not in state"
        );

        let err = HarnessError::InconsistentState(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "inconsistent state: a; b");
    }

    #[test]
    fn test_uncaught_charm_exposes_model_error() {
        let inner = ModelError::SecretNotFound("secret:x".to_string());
        let err = HarnessError::UncaughtCharm {
            event: "start".to_string(),
            error: anyhow::Error::new(inner.clone()),
            trace: Box::default(),
        };
        assert_eq!(err.model_error(), Some(&inner));
        assert!(err.trace().is_some_and(|t| t.is_empty()));
    }
}
