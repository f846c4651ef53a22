// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secret ownership, grants and revision tracking.
//!
//! Owners (the unit, or the application through its leader) manage a secret
//! and always read its latest revision. Consumers read through a grant on a
//! relation; they see the revision they track unless they peek or refresh,
//! and never past the revision the grant pins.

use super::{ModelBackend, SecretInfo, SecretOptions, SecretReadMode, SimulatedBackend};
use crate::config::JujuVersion;
use crate::error::{ModelError, ModelResult};
use crate::state::{
    Databag, RelationId, Secret, SecretGrant, SecretOwner, generate_id, validate_content,
};

const SECRETS_MIN_VERSION: JujuVersion = JujuVersion::new(3, 0, 2);

impl SimulatedBackend {
    fn require_secrets(&self, call: &'static str) -> ModelResult<()> {
        self.require_version(call, SECRETS_MIN_VERSION, "3.0.2")
    }

    fn find_secret(&self, id: Option<&str>, label: Option<&str>) -> ModelResult<usize> {
        let secrets = &self.state.secrets;
        match (id, label) {
            (Some(id), _) => secrets
                .iter()
                .position(|s| s.matches_id(id))
                .ok_or_else(|| ModelError::SecretNotFound(id.to_string())),
            (None, Some(label)) => secrets
                .iter()
                .position(|s| s.label.as_deref() == Some(label))
                .ok_or_else(|| ModelError::SecretNotFound(label.to_string())),
            (None, None) => Err(ModelError::SecretNotFound(
                "neither id nor label given".to_string(),
            )),
        }
    }

    /// The owner, if this unit may manage the secret.
    fn check_manage(&self, index: usize) -> ModelResult<SecretOwner> {
        let secret = &self.state.secrets[index];
        match secret.owner {
            Some(SecretOwner::Unit) => Ok(SecretOwner::Unit),
            Some(SecretOwner::App) if self.state.leader => Ok(SecretOwner::App),
            Some(SecretOwner::App) => Err(ModelError::SecretsAccess {
                secret_id: secret.id.clone(),
                reason: "only the leader may manage application-owned secrets".to_string(),
            }),
            None => Err(ModelError::SecretsAccess {
                secret_id: secret.id.clone(),
                reason: "secret is not owned by this unit or application".to_string(),
            }),
        }
    }

    fn grant_for<'a>(&self, secret: &'a Secret) -> Option<&'a SecretGrant> {
        let unit = self.unit_name();
        let app = self.app_name();
        secret
            .grants
            .iter()
            .find(|g| g.grantee == unit || g.grantee == app)
    }

    pub(super) fn read_secret(
        &mut self,
        id: Option<&str>,
        label: Option<&str>,
        mode: SecretReadMode,
    ) -> ModelResult<Databag> {
        self.require_secrets("secret-get")?;
        let index = self.find_secret(id, label)?;

        let secret = &self.state.secrets[index];
        let revision = if secret.is_owned() {
            secret.latest_revision()
        } else {
            let grant = self
                .grant_for(secret)
                .ok_or_else(|| ModelError::SecretsAccess {
                    secret_id: secret.id.clone(),
                    reason: "secret has not been granted to this unit".to_string(),
                })?;
            let allowed = grant.revision.unwrap_or_else(|| secret.latest_revision());
            match mode {
                SecretReadMode::Tracked => secret.tracked_revision.min(allowed),
                SecretReadMode::Peek | SecretReadMode::Refresh => allowed,
            }
        };
        let content = secret.revisions.get(&revision).cloned().ok_or_else(|| {
            ModelError::SecretNotFound(format!("{} revision {revision}", secret.id))
        })?;

        // Label binding and tracking only happen on a successful read.
        if let (Some(_), Some(label)) = (id, label) {
            for (i, secret) in self.state.secrets.iter_mut().enumerate() {
                if i != index && secret.label.as_deref() == Some(label) {
                    secret.label = None;
                }
            }
            self.state.secrets[index].label = Some(label.to_string());
        }
        if mode == SecretReadMode::Refresh {
            self.state.secrets[index].tracked_revision = revision;
        }
        Ok(content)
    }

    pub(super) fn describe_secret(
        &self,
        id: Option<&str>,
        label: Option<&str>,
    ) -> ModelResult<SecretInfo> {
        self.require_secrets("secret-info-get")?;
        let index = self.find_secret(id, label)?;
        let owner = self.check_manage(index)?;
        let secret = &self.state.secrets[index];
        Ok(SecretInfo {
            id: secret.id.clone(),
            label: secret.label.clone(),
            revision: secret.latest_revision(),
            owner,
            expires: secret.expire,
            rotation: secret.rotate,
            description: secret.description.clone(),
        })
    }

    pub(super) fn add_secret(
        &mut self,
        content: Databag,
        owner: SecretOwner,
        options: SecretOptions,
    ) -> ModelResult<String> {
        self.require_secrets("secret-add")?;
        validate_content(&content).map_err(ModelError::InvalidSecretContent)?;
        if owner == SecretOwner::App && !self.state.leader {
            return Err(ModelError::LeadershipRequired {
                call: "secret-add --owner application",
            });
        }
        if let Some(label) = options.label.as_deref() {
            if self.state.secret_by_label(label).is_some() {
                return Err(ModelError::InvalidSecretContent(format!(
                    "label '{label}' is already in use"
                )));
            }
        }

        let id = generate_id();
        let mut secret = Secret::new(content).with_id(id.clone()).owned_by(owner);
        secret.label = options.label;
        secret.description = options.description;
        secret.expire = options.expire;
        secret.rotate = options.rotate;
        self.state.secrets.push(secret);
        Ok(id)
    }

    pub(super) fn update_secret(
        &mut self,
        id: &str,
        content: Option<Databag>,
        options: SecretOptions,
    ) -> ModelResult<()> {
        self.require_secrets("secret-set")?;
        let index = self.find_secret(Some(id), None)?;
        self.check_manage(index)?;
        if let Some(content) = &content {
            validate_content(content).map_err(ModelError::InvalidSecretContent)?;
        }

        let secret = &mut self.state.secrets[index];
        if let Some(content) = content {
            let next = secret.next_revision();
            secret.revisions.insert(next, content);
        }
        if options.label.is_some() {
            secret.label = options.label;
        }
        if options.description.is_some() {
            secret.description = options.description;
        }
        if options.expire.is_some() {
            secret.expire = options.expire;
        }
        if options.rotate.is_some() {
            secret.rotate = options.rotate;
        }
        Ok(())
    }

    fn grantee(&self, relation_id: RelationId, unit: Option<&str>) -> ModelResult<String> {
        let relation = self.relation(relation_id)?;
        Ok(match unit {
            Some(unit) => unit.to_string(),
            None => relation.remote_app(&self.app_name()).to_string(),
        })
    }

    pub(super) fn grant_secret(
        &mut self,
        id: &str,
        relation_id: RelationId,
        unit: Option<&str>,
    ) -> ModelResult<()> {
        self.require_secrets("secret-grant")?;
        let index = self.find_secret(Some(id), None)?;
        self.check_manage(index)?;
        let grantee = self.grantee(relation_id, unit)?;

        let grants = &mut self.state.secrets[index].grants;
        if !grants
            .iter()
            .any(|g| g.relation_id == relation_id && g.grantee == grantee)
        {
            grants.push(SecretGrant {
                relation_id,
                grantee,
                revision: None,
            });
        }
        Ok(())
    }

    pub(super) fn revoke_secret(
        &mut self,
        id: &str,
        relation_id: RelationId,
        unit: Option<&str>,
    ) -> ModelResult<()> {
        self.require_secrets("secret-revoke")?;
        let index = self.find_secret(Some(id), None)?;
        self.check_manage(index)?;
        let grantee = self.grantee(relation_id, unit)?;
        self.state.secrets[index]
            .grants
            .retain(|g| !(g.relation_id == relation_id && g.grantee == grantee));
        Ok(())
    }

    pub(super) fn remove_secret(&mut self, id: &str, revision: Option<u32>) -> ModelResult<()> {
        self.require_secrets("secret-remove")?;
        let index = self.find_secret(Some(id), None)?;
        self.check_manage(index)?;
        match revision {
            Some(revision) => {
                let secret = &mut self.state.secrets[index];
                if secret.revisions.remove(&revision).is_none() {
                    return Err(ModelError::SecretNotFound(format!(
                        "{} revision {revision}",
                        secret.id
                    )));
                }
                if secret.revisions.is_empty() {
                    self.state.secrets.remove(index);
                }
            }
            None => {
                self.state.secrets.remove(index);
            }
        }
        Ok(())
    }

    pub(super) fn owned_secret_ids(&self) -> ModelResult<Vec<String>> {
        self.require_secrets("secret-ids")?;
        Ok(self
            .state
            .secrets
            .iter()
            .filter(|s| s.is_owned())
            .map(|s| s.id.clone())
            .collect())
    }
}
