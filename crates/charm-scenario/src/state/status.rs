// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unit and application workload status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Workload status names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusName {
    /// Nothing reported yet.
    #[default]
    Unknown,
    /// Ready and serving.
    Active,
    /// Waiting on something outside the unit.
    Waiting,
    /// Doing internal work.
    Maintenance,
    /// Needs human intervention.
    Blocked,
    /// Set by the agent after a failed hook.
    Error,
}

impl StatusName {
    /// Rank used when reducing collected statuses; higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Active => 1,
            Self::Waiting => 2,
            Self::Maintenance => 3,
            Self::Blocked => 4,
            Self::Error => 5,
        }
    }

    /// Whether an operator may set this status itself.
    pub fn is_settable(self) -> bool {
        !matches!(self, Self::Unknown | Self::Error)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Maintenance => "maintenance",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "active" => Ok(Self::Active),
            "waiting" => Ok(Self::Waiting),
            "maintenance" => Ok(Self::Maintenance),
            "blocked" => Ok(Self::Blocked),
            "error" => Ok(Self::Error),
            other => Err(other.to_string()),
        }
    }
}

/// A status name with its message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StatusInfo {
    /// Status name.
    pub name: StatusName,
    /// Free-text message.
    #[serde(default)]
    pub message: String,
}

impl StatusInfo {
    /// Build a status.
    pub fn new(name: StatusName, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }

    /// `active` with a message.
    pub fn active(message: impl Into<String>) -> Self {
        Self::new(StatusName::Active, message)
    }

    /// `blocked` with a message.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(StatusName::Blocked, message)
    }

    /// `waiting` with a message.
    pub fn waiting(message: impl Into<String>) -> Self {
        Self::new(StatusName::Waiting, message)
    }

    /// `maintenance` with a message.
    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::new(StatusName::Maintenance, message)
    }
}

impl fmt::Display for StatusInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

/// Statuses visible to the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Status {
    /// This unit's status.
    #[serde(default)]
    pub unit: StatusInfo,
    /// The application's status.
    #[serde(default)]
    pub app: StatusInfo,
    /// Workload version reported by `application-version-set`.
    #[serde(default)]
    pub app_version: String,
    /// Unit statuses replaced during dispatches, oldest first.
    #[serde(default)]
    pub unit_history: Vec<StatusInfo>,
    /// Application statuses replaced during dispatches, oldest first.
    #[serde(default)]
    pub app_history: Vec<StatusInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut names = vec![
            StatusName::Active,
            StatusName::Error,
            StatusName::Unknown,
            StatusName::Blocked,
            StatusName::Waiting,
            StatusName::Maintenance,
        ];
        names.sort_by_key(|n| n.priority());
        assert_eq!(
            names,
            vec![
                StatusName::Unknown,
                StatusName::Active,
                StatusName::Waiting,
                StatusName::Maintenance,
                StatusName::Blocked,
                StatusName::Error,
            ]
        );
    }

    #[test]
    fn test_status_serde_is_lowercase() {
        let info = StatusInfo::waiting("foo barz");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"name": "waiting", "message": "foo barz"}));
        assert_eq!("blocked".parse::<StatusName>(), Ok(StatusName::Blocked));
        assert!("sleeping".parse::<StatusName>().is_err());
    }

    #[test]
    fn test_settable() {
        assert!(StatusName::Active.is_settable());
        assert!(!StatusName::Error.is_settable());
        assert!(!StatusName::Unknown.is_settable());
        assert_eq!(StatusInfo::active("ok").to_string(), "active: ok");
        assert_eq!(StatusInfo::default().to_string(), "unknown");
    }
}
