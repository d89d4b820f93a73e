use std::sync::Arc;

use crate::config::TokenSettings;
use crate::directory::PrincipalDirectory;
use crate::errors::AuthError;
use crate::models::token::{Audience, TokenClaims};
use crate::store::TokenStore;
use crate::tokens::jwt::{decode_token, unverified_subject};

/// Checks a presented token: signature, claims, ledger, then owner status.
///
/// Every failure is reported with its own variant so callers can log the
/// cause; the HTTP layer collapses them into one generic 401.
pub struct TokenValidator {
    store: Arc<dyn TokenStore>,
    directory: Arc<dyn PrincipalDirectory>,
    settings: TokenSettings,
}

impl TokenValidator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        directory: Arc<dyn PrincipalDirectory>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            store,
            directory,
            settings,
        }
    }

    pub async fn validate(
        &self,
        token: &str,
        expected_audience: Audience,
    ) -> Result<TokenClaims, AuthError> {
        // The subject only selects the key; nothing else is trusted until verified.
        let sub = unverified_subject(token).ok_or(AuthError::SignatureInvalid)?;
        let principal = self
            .directory
            .get_principal_by_id(&sub)
            .await
            .ok_or_else(|| {
                tracing::debug!(sub = %sub, "token names an unknown principal");
                AuthError::SignatureInvalid
            })?;

        let claims = decode_token(
            token,
            &principal.signing_secret,
            &self.settings.issuer,
            expected_audience,
        )?;

        match self.store.get(&claims.jti)? {
            Some(record) if record.is_revoked() => {
                tracing::debug!(jti = %claims.jti, "revoked token presented");
                return Err(AuthError::TokenRevoked);
            }
            Some(record) => {
                let meta = &record.metadata;
                if meta.owner_id != claims.sub || meta.audience != claims.aud {
                    tracing::warn!(
                        jti = %claims.jti,
                        owner_id = %meta.owner_id,
                        sub = %claims.sub,
                        "token claims disagree with stored metadata"
                    );
                    return Err(AuthError::SignatureInvalid);
                }
            }
            None => {
                // Revocation without metadata is still honoured.
                if self.store.is_revoked(&claims.jti)? {
                    return Err(AuthError::TokenRevoked);
                }
                if !self.settings.allow_untracked_tokens {
                    tracing::warn!(jti = %claims.jti, owner_id = %claims.sub, "untracked token rejected");
                    return Err(AuthError::RecordNotFound);
                }
                tracing::warn!(jti = %claims.jti, owner_id = %claims.sub, "accepting untracked token");
            }
        }

        if !self.directory.is_principal_active(&claims.sub).await {
            tracing::debug!(owner_id = %claims.sub, "token owner is inactive");
            return Err(AuthError::PrincipalInactive);
        }

        Ok(claims)
    }
}
