pub mod models;
pub mod postgres;
pub mod store;

pub use models::*;
pub use postgres::PostgresStore;
pub use store::{FileStore, MemoryStore, StoreError, TargetStore};

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::vault::CredentialVault;

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

/// Named targets per kind, with passwords encrypted at rest.
///
/// Plaintext credentials only leave the registry through
/// [`TargetRegistry::resolve_for_dispatch`]; every other read returns
/// [`TargetSummary`].
#[derive(Clone)]
pub struct TargetRegistry {
    store: Arc<dyn TargetStore>,
    vault: CredentialVault,
}

impl TargetRegistry {
    pub fn new(store: Arc<dyn TargetStore>, vault: CredentialVault) -> Self {
        Self { store, vault }
    }

    pub async fn register(
        &self,
        kind: TargetKind,
        target: NewTarget,
    ) -> Result<TargetSummary, RegistryError> {
        // Names are lookup keys matched exactly, so they are stored verbatim.
        let name = target.name;
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidTarget("name must not be empty".into()));
        }
        if name.trim() != name {
            return Err(RegistryError::InvalidTarget(format!(
                "name '{}' must not start or end with whitespace",
                name
            )));
        }
        if target.address.trim().is_empty() {
            return Err(RegistryError::InvalidTarget(
                "address must not be empty".into(),
            ));
        }

        let encrypted_password = self.seal(target.password.as_deref())?;
        let now = Utc::now();
        let record = TargetRecord {
            id: Uuid::new_v4(),
            kind,
            name,
            address: target.address.trim().to_string(),
            username: target.username.filter(|u| !u.is_empty()),
            encrypted_password,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert(record.clone()).await {
            Ok(()) => {}
            Err(StoreError::Duplicate) => {
                tracing::warn!(%kind, name = %record.name, "Rejected duplicate target name");
                return Err(RegistryError::DuplicateName {
                    kind,
                    name: record.name,
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(%kind, name = %record.name, id = %record.id, "Registered target");
        Ok(TargetSummary::from(&record))
    }

    pub async fn get(&self, kind: TargetKind, id: Uuid) -> Result<TargetSummary, RegistryError> {
        let record = self
            .store
            .get(kind, id)
            .await?
            .ok_or_else(|| RegistryError::not_found_id(kind, id))?;
        Ok(TargetSummary::from(&record))
    }

    pub async fn update(
        &self,
        kind: TargetKind,
        id: Uuid,
        update: TargetUpdate,
    ) -> Result<TargetSummary, RegistryError> {
        let mut record = self
            .store
            .get(kind, id)
            .await?
            .ok_or_else(|| RegistryError::not_found_id(kind, id))?;

        if let Some(address) = update.address {
            if address.trim().is_empty() {
                return Err(RegistryError::InvalidTarget(
                    "address must not be empty".into(),
                ));
            }
            record.address = address.trim().to_string();
        }
        if let Some(username) = update.username {
            record.username = Some(username).filter(|u| !u.is_empty());
        }
        // An empty password is "unchanged", never "cleared".
        if let Some(sealed) = self.seal(update.password.as_deref())? {
            record.encrypted_password = Some(sealed);
        }
        record.updated_at = Utc::now();

        if !self.store.update(record.clone()).await? {
            return Err(RegistryError::not_found_id(kind, id));
        }

        tracing::info!(%kind, name = %record.name, %id, "Updated target");
        Ok(TargetSummary::from(&record))
    }

    pub async fn remove(&self, kind: TargetKind, id: Uuid) -> Result<(), RegistryError> {
        if !self.store.delete(kind, id).await? {
            return Err(RegistryError::not_found_id(kind, id));
        }
        tracing::info!(%kind, %id, "Removed target");
        Ok(())
    }

    pub async fn list(&self, kind: TargetKind) -> Result<Vec<TargetSummary>, RegistryError> {
        let records = self.store.list(kind).await?;
        Ok(records.iter().map(TargetSummary::from).collect())
    }

    pub async fn resolve_for_dispatch(
        &self,
        kind: TargetKind,
        name: &str,
    ) -> Result<ResolvedTarget, RegistryError> {
        let record = self
            .store
            .find_by_name(kind, name)
            .await?
            .ok_or_else(|| RegistryError::not_found_name(kind, name))?;

        let password = match record.encrypted_password.as_deref() {
            Some(sealed) if !sealed.is_empty() => {
                Some(self.vault.decrypt(sealed).map_err(|e| {
                    tracing::warn!(%kind, %name, error = %e, "Stored credentials failed to decrypt");
                    RegistryError::Decryption {
                        kind,
                        name: name.to_string(),
                    }
                })?)
            }
            _ => None,
        };

        Ok(ResolvedTarget {
            id: record.id,
            kind: record.kind,
            name: record.name,
            address: record.address,
            username: record.username,
            password,
        })
    }

    /// Raw stored record, ciphertext included. Only for tests and maintenance tooling.
    pub async fn stored_record(
        &self,
        kind: TargetKind,
        id: Uuid,
    ) -> Result<Option<TargetRecord>, RegistryError> {
        Ok(self.store.get(kind, id).await?)
    }

    fn seal(&self, password: Option<&str>) -> Result<Option<String>, RegistryError> {
        match password {
            Some(p) if !p.is_empty() => Ok(Some(self.vault.encrypt(p)?)),
            _ => Ok(None),
        }
    }
}
