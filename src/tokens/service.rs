use std::sync::Arc;

use crate::errors::AuthError;
use crate::models::token::{Audience, StoredToken, TokenMetadata};
use crate::store::TokenStore;

/// Editable fields of a token record. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TokenUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl TokenUpdate {
    pub fn is_noop(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Owner-scoped token management. A token that belongs to someone else is
/// reported as not found.
pub struct TokenService {
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn list(
        &self,
        owner_id: &str,
        audience: Option<Audience>,
    ) -> Result<Vec<TokenMetadata>, AuthError> {
        self.store.list_by_owner(owner_id, audience)
    }

    pub fn get(&self, owner_id: &str, jti: &str) -> Result<StoredToken, AuthError> {
        Audience::from_jti(jti).ok_or(AuthError::InvalidTokenId)?;
        match self.store.get(jti)? {
            Some(record) if record.metadata.owner_id == owner_id => Ok(record),
            Some(_) => {
                tracing::warn!(jti = %jti, owner_id = %owner_id, "token lookup by non-owner");
                Err(AuthError::RecordNotFound)
            }
            None => Err(AuthError::RecordNotFound),
        }
    }

    /// Revoked tokens are immutable.
    pub fn update(
        &self,
        owner_id: &str,
        jti: &str,
        changes: TokenUpdate,
    ) -> Result<TokenMetadata, AuthError> {
        if changes.is_noop() {
            return Err(AuthError::InvalidRequest("nothing to update".into()));
        }
        let name = changes.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(AuthError::InvalidRequest("token name is required".into()));
        }

        let record = self.get(owner_id, jti)?;
        if record.is_revoked() {
            return Err(AuthError::TokenRevoked);
        }

        let mut metadata = record.metadata;
        if let Some(name) = name {
            metadata.name = name.to_string();
        }
        if let Some(description) = changes.description.as_deref() {
            metadata.description = description.trim().to_string();
        }
        self.store.put(jti, &metadata)?;
        tracing::info!(jti = %jti, owner_id = %owner_id, "token updated");
        Ok(metadata)
    }

    pub fn rename(&self, owner_id: &str, jti: &str, name: &str) -> Result<TokenMetadata, AuthError> {
        self.update(
            owner_id,
            jti,
            TokenUpdate {
                name: Some(name.to_string()),
                description: None,
            },
        )
    }

    pub fn revoke(&self, owner_id: &str, jti: &str) -> Result<(), AuthError> {
        self.get(owner_id, jti)?;
        self.store.revoke(jti)
    }
}
