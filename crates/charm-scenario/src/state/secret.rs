// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secrets: owner, revisions, grants.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::relation::{Databag, RelationId};

static CONTENT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z](?:-?[a-z0-9]){2,}$").expect("secret key regex is valid"));

/// Who owns a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretOwner {
    /// Owned by the unit under test.
    Unit,
    /// Owned by the application; managed by its leader.
    App,
}

/// Rotation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotatePolicy {
    /// Never rotate.
    Never,
    /// Every hour.
    Hourly,
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
    /// Every three months.
    Quarterly,
    /// Every year.
    Yearly,
}

/// Read access to a secret for one grantee over one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretGrant {
    /// Relation the grant was issued over.
    pub relation_id: RelationId,
    /// Application or unit name allowed to read.
    pub grantee: String,
    /// Newest revision the grantee may read; `None` follows the latest.
    #[serde(default)]
    pub revision: Option<u32>,
}

/// A secret visible to the unit under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Secret id, `secret:<xid>`.
    pub id: String,
    /// Label this unit knows the secret by.
    #[serde(default)]
    pub label: Option<String>,
    /// Owner-supplied description.
    #[serde(default)]
    pub description: Option<String>,
    /// Owner, or `None` when another application owns it.
    #[serde(default)]
    pub owner: Option<SecretOwner>,
    /// Content by revision number.
    pub revisions: BTreeMap<u32, Databag>,
    /// Revision the unit currently tracks as a consumer.
    pub tracked_revision: u32,
    /// Highest revision number ever issued, including removed revisions.
    #[serde(default)]
    pub last_revision: u32,
    /// Read grants.
    #[serde(default)]
    pub grants: Vec<SecretGrant>,
    /// Expiry time.
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
    /// Rotation policy.
    #[serde(default)]
    pub rotate: Option<RotatePolicy>,
}

impl Secret {
    /// A secret owned by another application, at revision 1, with a fresh id.
    pub fn new<K, V>(content: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let content: Databag = content
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            id: generate_id(),
            label: None,
            description: None,
            owner: None,
            revisions: BTreeMap::from([(1, content)]),
            tracked_revision: 1,
            last_revision: 1,
            grants: Vec::new(),
            expire: None,
            rotate: None,
        }
    }

    /// Use a fixed id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the owner.
    pub fn owned_by(mut self, owner: SecretOwner) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Add a revision; the tracked revision stays where it was.
    pub fn with_revision<K, V>(mut self, revision: u32, content: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let content = content
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.revisions.insert(revision, content);
        self.last_revision = self.last_revision.max(revision);
        self
    }

    /// Set the tracked revision.
    pub fn tracking(mut self, revision: u32) -> Self {
        self.tracked_revision = revision;
        self
    }

    /// Grant read access to `grantee` over `relation_id`.
    pub fn granted_to(mut self, relation_id: RelationId, grantee: impl Into<String>) -> Self {
        self.grants.push(SecretGrant {
            relation_id,
            grantee: grantee.into(),
            revision: None,
        });
        self
    }

    /// Set the expiry.
    pub fn with_expire(mut self, expire: DateTime<Utc>) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Set the rotation policy.
    pub fn with_rotate(mut self, rotate: RotatePolicy) -> Self {
        self.rotate = Some(rotate);
        self
    }

    /// Newest revision number.
    pub fn latest_revision(&self) -> u32 {
        self.revisions.keys().next_back().copied().unwrap_or(0)
    }

    /// Allocate the next revision number. Numbers of removed revisions are
    /// never reused.
    pub fn next_revision(&mut self) -> u32 {
        let next = self.last_revision.max(self.latest_revision()) + 1;
        self.last_revision = next;
        next
    }

    /// Whether `id` names this secret in any accepted spelling.
    pub fn matches_id(&self, id: &str) -> bool {
        canonical_id(&self.id) == canonical_id(id)
    }

    /// Whether the unit or its application owns the secret.
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }
}

/// Fresh `secret:<xid>` identifier.
pub fn generate_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("secret:{}", &raw[..20])
}

/// Strip the `secret:` or `secret://<model-uuid>/` prefix.
pub fn canonical_id(id: &str) -> &str {
    if let Some(rest) = id.strip_prefix("secret://") {
        return rest.rsplit('/').next().unwrap_or(rest);
    }
    id.strip_prefix("secret:").unwrap_or(id)
}

/// Check secret content keys and values.
pub fn validate_content(content: &Databag) -> Result<(), String> {
    if content.is_empty() {
        return Err("secret content must not be empty".to_string());
    }
    for (key, value) in content {
        if !CONTENT_KEY.is_match(key) {
            return Err(format!(
                "key '{key}' must be lowercase letters, digits and dashes, at least 3 long"
            ));
        }
        if value.is_empty() {
            return Err(format!("value for '{key}' must not be empty"));
        }
    }
    Ok(())
}
