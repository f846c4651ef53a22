// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Charm metadata: endpoints, containers, storage, actions and config options.
//!
//! The metadata is an immutable input describing the operator under test. It
//! is loaded from JSON or built in code and shared by every dispatch of a
//! [`Context`](crate::Context).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::state::ConfigValue;

/// Which side of a relation an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// Declared under `requires`.
    Requires,
    /// Declared under `provides`.
    Provides,
    /// Declared under `peers`.
    Peer,
}

/// A relation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMeta {
    /// Interface name.
    pub interface: String,
    /// Maximum number of relations.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Whether the endpoint may be left unrelated.
    #[serde(default)]
    pub optional: bool,
    /// `global` or `container`.
    #[serde(default)]
    pub scope: Option<String>,
}

impl EndpointMeta {
    /// An endpoint speaking `interface`.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            limit: None,
            optional: false,
            scope: None,
        }
    }
}

/// A storage mount inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMountMeta {
    /// Storage name.
    pub storage: String,
    /// Mount point.
    pub location: String,
}

/// A workload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContainerMeta {
    /// OCI image resource.
    #[serde(default)]
    pub resource: Option<String>,
    /// Storage mounts.
    #[serde(default)]
    pub mounts: Vec<ContainerMountMeta>,
}

/// Storage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Mounted filesystem.
    #[default]
    Filesystem,
    /// Raw block device.
    Block,
}

/// A storage declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StorageMeta {
    /// Storage kind.
    #[serde(rename = "type", default)]
    pub kind: StorageKind,
    /// Default mount point.
    #[serde(default)]
    pub location: Option<String>,
    /// Whether more than one instance may attach.
    #[serde(default)]
    pub multiple: bool,
}

/// JSON-schema style parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// String.
    String,
    /// Integer.
    Integer,
    /// Number.
    Number,
    /// Boolean.
    Boolean,
    /// Array.
    Array,
    /// Object.
    Object,
}

impl ParamType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParam {
    /// Parameter type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// Default value.
    #[serde(default)]
    pub default: Option<Value>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

impl ActionParam {
    /// A parameter of `kind` with no default.
    pub fn new(kind: ParamType) -> Self {
        Self {
            kind,
            default: None,
            description: None,
        }
    }

    /// Set the default.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// An action declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActionMeta {
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Parameters by name.
    #[serde(default)]
    pub params: BTreeMap<String, ActionParam>,
    /// Parameters that must be supplied.
    #[serde(default)]
    pub required: Vec<String>,
    /// Whether undeclared parameters are accepted.
    #[serde(default = "default_true")]
    pub additional_properties: bool,
}

impl Default for ActionMeta {
    fn default() -> Self {
        Self {
            description: None,
            params: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

impl ActionMeta {
    /// An action with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter.
    pub fn with_param(mut self, name: impl Into<String>, param: ActionParam) -> Self {
        self.params.insert(name.into(), param);
        self
    }

    /// Mark a parameter required.
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Check supplied parameters against the declaration.
    pub fn validate(&self, params: &Map<String, Value>) -> std::result::Result<(), String> {
        for name in &self.required {
            if !params.contains_key(name) {
                return Err(format!("missing required parameter '{name}'"));
            }
        }
        for (name, value) in params {
            match self.params.get(name) {
                Some(param) if !param.kind.accepts(value) => {
                    return Err(format!("parameter '{name}' must be of type {:?}", param.kind));
                }
                None if !self.additional_properties => {
                    return Err(format!("unknown parameter '{name}'"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Supplied parameters with declared defaults filled in.
    pub fn with_defaults(&self, params: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = params.clone();
        for (name, param) in &self.params {
            if let Some(default) = &param.default {
                merged
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        merged
    }
}

fn default_true() -> bool {
    true
}

/// Config option type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    /// String.
    String,
    /// Integer.
    Int,
    /// Float.
    Float,
    /// Boolean.
    Boolean,
    /// Secret URI.
    Secret,
}

impl ConfigType {
    /// Whether `value` fits this type.
    pub fn accepts(self, value: &ConfigValue) -> bool {
        matches!(
            (self, value),
            (Self::String | Self::Secret, ConfigValue::String(_))
                | (Self::Int, ConfigValue::Int(_))
                | (Self::Float, ConfigValue::Float(_) | ConfigValue::Int(_))
                | (Self::Boolean, ConfigValue::Bool(_))
        )
    }
}

/// A config option declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    /// Option type.
    #[serde(rename = "type")]
    pub kind: ConfigType,
    /// Default value.
    #[serde(default)]
    pub default: Option<ConfigValue>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

impl ConfigOption {
    /// An option of `kind` with no default.
    pub fn new(kind: ConfigType) -> Self {
        Self {
            kind,
            default: None,
            description: None,
        }
    }

    /// Set the default.
    pub fn with_default(mut self, default: impl Into<ConfigValue>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Metadata of the operator under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CharmMeta {
    /// Application name.
    pub name: String,
    /// Endpoints this charm consumes.
    #[serde(default)]
    pub requires: BTreeMap<String, EndpointMeta>,
    /// Endpoints this charm offers.
    #[serde(default)]
    pub provides: BTreeMap<String, EndpointMeta>,
    /// Peer endpoints.
    #[serde(default)]
    pub peers: BTreeMap<String, EndpointMeta>,
    /// Workload containers.
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerMeta>,
    /// Storage.
    #[serde(default)]
    pub storage: BTreeMap<String, StorageMeta>,
    /// Network bindings that are not relation endpoints.
    #[serde(default)]
    pub extra_bindings: BTreeSet<String>,
    /// Actions.
    #[serde(default)]
    pub actions: BTreeMap<String, ActionMeta>,
    /// Config options.
    #[serde(default)]
    pub config: BTreeMap<String, ConfigOption>,
}

impl CharmMeta {
    /// Metadata for an application named `name` with nothing declared.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse metadata from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Declare a `requires` endpoint.
    pub fn with_requires(mut self, endpoint: impl Into<String>, interface: impl Into<String>) -> Self {
        self.requires
            .insert(endpoint.into(), EndpointMeta::new(interface));
        self
    }

    /// Declare a `provides` endpoint.
    pub fn with_provides(mut self, endpoint: impl Into<String>, interface: impl Into<String>) -> Self {
        self.provides
            .insert(endpoint.into(), EndpointMeta::new(interface));
        self
    }

    /// Declare a peer endpoint.
    pub fn with_peer(mut self, endpoint: impl Into<String>, interface: impl Into<String>) -> Self {
        self.peers.insert(endpoint.into(), EndpointMeta::new(interface));
        self
    }

    /// Declare a container.
    pub fn with_container(mut self, name: impl Into<String>, container: ContainerMeta) -> Self {
        self.containers.insert(name.into(), container);
        self
    }

    /// Declare storage.
    pub fn with_storage(mut self, name: impl Into<String>, storage: StorageMeta) -> Self {
        self.storage.insert(name.into(), storage);
        self
    }

    /// Declare an extra binding.
    pub fn with_extra_binding(mut self, name: impl Into<String>) -> Self {
        self.extra_bindings.insert(name.into());
        self
    }

    /// Declare an action.
    pub fn with_action(mut self, name: impl Into<String>, action: ActionMeta) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Declare a config option.
    pub fn with_config_option(mut self, name: impl Into<String>, option: ConfigOption) -> Self {
        self.config.insert(name.into(), option);
        self
    }

    /// Look up an endpoint in any role.
    pub fn endpoint(&self, name: &str) -> Option<(EndpointRole, &EndpointMeta)> {
        self.requires
            .get(name)
            .map(|m| (EndpointRole::Requires, m))
            .or_else(|| self.provides.get(name).map(|m| (EndpointRole::Provides, m)))
            .or_else(|| self.peers.get(name).map(|m| (EndpointRole::Peer, m)))
    }

    /// Whether `name` is a relation endpoint or extra binding.
    pub fn has_binding(&self, name: &str) -> bool {
        self.endpoint(name).is_some() || self.extra_bindings.contains(name)
    }

    /// Config with metadata defaults under the explicit values.
    pub fn effective_config(
        &self,
        explicit: &BTreeMap<String, ConfigValue>,
    ) -> BTreeMap<String, ConfigValue> {
        let mut config: BTreeMap<String, ConfigValue> = self
            .config
            .iter()
            .filter_map(|(name, option)| option.default.clone().map(|d| (name.clone(), d)))
            .collect();
        config.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
        config
    }
}
