use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::config::TokenSettings;
use crate::errors::AuthError;
use crate::models::principal::Principal;
use crate::models::scope::ScopeNode;
use crate::models::token::{generate_jti, Audience, TokenClaims, TokenMetadata};
use crate::store::TokenStore;
use crate::tokens::duration::expires_at;
use crate::tokens::jwt::encode_token;

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub name: String,
    pub audience: Audience,
    /// `None`, or a top-level object with no entries, inherits the principal's
    /// base scopes. Anything else is stored exactly as requested.
    pub scopes: Option<ScopeNode>,
    pub duration: String,
    pub description: String,
}

/// Result of a successful issue. `token` is shown once and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub jti: String,
    pub token: String,
    pub metadata: TokenMetadata,
}

pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>, settings: TokenSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn issue(
        &self,
        principal: &Principal,
        request: IssueRequest,
    ) -> Result<IssuedToken, AuthError> {
        if !principal.active {
            tracing::warn!(owner_id = %principal.id, "refusing to issue token for inactive principal");
            return Err(AuthError::PrincipalInactive);
        }

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AuthError::InvalidRequest("token name is required".into()));
        }

        let scopes = match request.scopes {
            None => principal.scopes.clone(),
            Some(ScopeNode::Children(entries)) if entries.is_empty() => principal.scopes.clone(),
            Some(requested) => {
                if !requested.is_subset_of(&principal.scopes) {
                    tracing::warn!(
                        owner_id = %principal.id,
                        audience = %request.audience,
                        "requested scopes exceed principal permissions"
                    );
                    return Err(AuthError::ScopeExceedsPermissions);
                }
                requested
            }
        };

        let issued_at = Utc::now();
        let expires_at = expires_at(issued_at, &request.duration)?;

        if request.audience == Audience::Api {
            self.check_quota(principal)?;
        }

        let metadata = TokenMetadata {
            jti: generate_jti(request.audience),
            owner_id: principal.id.clone(),
            audience: request.audience,
            name: name.to_string(),
            description: request.description.trim().to_string(),
            issued_at,
            expires_at,
            scopes,
        };

        let claims = TokenClaims::from_metadata(&metadata, &self.settings.issuer);
        let token = encode_token(&claims, &principal.signing_secret)?;

        self.store.put(&metadata.jti, &metadata)?;

        tracing::info!(
            jti = %metadata.jti,
            owner_id = %metadata.owner_id,
            audience = %metadata.audience,
            expires_at = %metadata.expires_at,
            "token issued"
        );

        Ok(IssuedToken {
            jti: metadata.jti.clone(),
            token,
            metadata,
        })
    }

    /// Login session: full base scopes, configured lifetime.
    pub fn issue_session(&self, principal: &Principal) -> Result<IssuedToken, AuthError> {
        self.issue(
            principal,
            IssueRequest {
                name: principal.display_name().to_string(),
                audience: Audience::WebSession,
                scopes: None,
                duration: self.settings.session_duration.clone(),
                description: String::new(),
            },
        )
    }

    fn check_quota(&self, principal: &Principal) -> Result<(), AuthError> {
        let max = self.settings.max_api_tokens;
        if max == 0 {
            return Ok(());
        }
        let now = Utc::now();
        let live = self
            .store
            .list_by_owner(&principal.id, Some(Audience::Api))?
            .iter()
            .filter(|m| !m.is_expired_at(now))
            .count();
        if live >= max {
            tracing::warn!(owner_id = %principal.id, live, max, "API token quota reached");
            return Err(AuthError::TokenLimitReached(max));
        }
        Ok(())
    }
}
