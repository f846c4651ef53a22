// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Relations (integrations) and their databags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Numeric relation identifier, unique within a [`State`](super::State).
pub type RelationId = u32;

/// A key-value document scoped to one unit or application.
pub type Databag = BTreeMap<String, String>;

/// How the relation was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// `requires`/`provides` between two applications.
    #[default]
    Regular,
    /// `peers` relation between units of the same application.
    Peer,
    /// Container-scoped relation with exactly one remote unit.
    Subordinate,
}

/// Which databag a member name resolves to, from the local unit's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BagRef {
    /// The local application's bag.
    LocalApp,
    /// The local unit's bag.
    LocalUnit,
    /// The remote application's bag.
    RemoteApp,
    /// A remote (or peer) unit's bag.
    RemoteUnit(u32),
}

/// One relation as seen by the unit under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation id.
    pub id: RelationId,
    /// Local endpoint name.
    pub endpoint: String,
    /// Interface name.
    pub interface: String,
    /// Declaration kind.
    #[serde(default)]
    pub kind: RelationKind,
    /// Remote application; ignored for peer relations.
    #[serde(default = "default_remote_app")]
    pub remote_app_name: String,
    /// Ids of remote units currently in the relation.
    #[serde(default)]
    pub remote_unit_ids: Vec<u32>,
    /// Local application databag.
    #[serde(default)]
    pub local_app_data: Databag,
    /// Local unit databag.
    #[serde(default)]
    pub local_unit_data: Databag,
    /// Remote application databag.
    #[serde(default)]
    pub remote_app_data: Databag,
    /// Remote unit databags by unit id.
    #[serde(default)]
    pub remote_units_data: BTreeMap<u32, Databag>,
}

fn default_remote_app() -> String {
    "remote".to_string()
}

impl Relation {
    /// A regular relation with one remote unit `remote/0` and empty databags.
    pub fn new(id: RelationId, endpoint: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
            interface: interface.into(),
            kind: RelationKind::Regular,
            remote_app_name: default_remote_app(),
            remote_unit_ids: vec![0],
            local_app_data: Databag::new(),
            local_unit_data: Databag::new(),
            remote_app_data: Databag::new(),
            remote_units_data: BTreeMap::from([(0, Databag::new())]),
        }
    }

    /// A peer relation with no other units.
    pub fn peer(id: RelationId, endpoint: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::Peer,
            remote_unit_ids: Vec::new(),
            remote_units_data: BTreeMap::new(),
            ..Self::new(id, endpoint, interface)
        }
    }

    /// A subordinate relation with the principal unit `remote/0`.
    pub fn subordinate(
        id: RelationId,
        endpoint: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::Subordinate,
            ..Self::new(id, endpoint, interface)
        }
    }

    /// Set the remote application name.
    pub fn with_remote_app(mut self, name: impl Into<String>) -> Self {
        self.remote_app_name = name.into();
        self
    }

    /// Replace the remote unit set; bags of kept units survive.
    pub fn with_remote_units(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.remote_unit_ids = ids.into_iter().collect();
        let old = std::mem::take(&mut self.remote_units_data);
        self.remote_units_data = self
            .remote_unit_ids
            .iter()
            .map(|id| (*id, old.get(id).cloned().unwrap_or_default()))
            .collect();
        self
    }

    /// Seed the local application databag.
    pub fn with_local_app_data<K, V>(mut self, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.local_app_data = collect_bag(data);
        self
    }

    /// Seed the local unit databag.
    pub fn with_local_unit_data<K, V>(mut self, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.local_unit_data = collect_bag(data);
        self
    }

    /// Seed the remote application databag.
    pub fn with_remote_app_data<K, V>(mut self, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.remote_app_data = collect_bag(data);
        self
    }

    /// Seed one remote unit's databag, adding the unit if needed.
    pub fn with_remote_unit_data<K, V>(
        mut self,
        unit_id: u32,
        data: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        if !self.remote_unit_ids.contains(&unit_id) {
            self.remote_unit_ids.push(unit_id);
        }
        self.remote_units_data.insert(unit_id, collect_bag(data));
        self
    }

    /// Whether this is a peer relation.
    pub fn is_peer(&self) -> bool {
        self.kind == RelationKind::Peer
    }

    /// Name of the application on the other side.
    pub fn remote_app<'a>(&'a self, local_app: &'a str) -> &'a str {
        if self.is_peer() {
            local_app
        } else {
            &self.remote_app_name
        }
    }

    /// Unit name of a remote unit.
    pub fn remote_unit_name(&self, local_app: &str, unit_id: u32) -> String {
        format!("{}/{}", self.remote_app(local_app), unit_id)
    }

    /// Resolve a unit or application name to the databag it owns.
    ///
    /// Peers share one application bag, so the local application name wins
    /// over the (identical) remote one.
    pub fn resolve(&self, member: &str, local_app: &str, local_unit_id: u32) -> Option<BagRef> {
        if member == local_app {
            return Some(BagRef::LocalApp);
        }
        if member == format!("{local_app}/{local_unit_id}") {
            return Some(BagRef::LocalUnit);
        }
        let remote_app = self.remote_app(local_app);
        if member == remote_app {
            return Some(BagRef::RemoteApp);
        }
        let (app, id) = member.rsplit_once('/')?;
        let id: u32 = id.parse().ok()?;
        (app == remote_app && self.remote_unit_ids.contains(&id)).then_some(BagRef::RemoteUnit(id))
    }

    /// Borrow a databag.
    pub fn bag(&self, bag: BagRef) -> Option<&Databag> {
        match bag {
            BagRef::LocalApp => Some(&self.local_app_data),
            BagRef::LocalUnit => Some(&self.local_unit_data),
            BagRef::RemoteApp if self.is_peer() => Some(&self.local_app_data),
            BagRef::RemoteApp => Some(&self.remote_app_data),
            BagRef::RemoteUnit(id) => self.remote_units_data.get(&id),
        }
    }

    /// Mutably borrow a local databag; remote bags are never writable.
    pub fn local_bag_mut(&mut self, bag: BagRef) -> Option<&mut Databag> {
        match bag {
            BagRef::LocalApp => Some(&mut self.local_app_data),
            BagRef::LocalUnit => Some(&mut self.local_unit_data),
            BagRef::RemoteApp | BagRef::RemoteUnit(_) => None,
        }
    }
}

fn collect_bag<K, V>(data: impl IntoIterator<Item = (K, V)>) -> Databag
where
    K: Into<String>,
    V: Into<String>,
{
    data.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
