use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::AuthError;
use crate::models::scope::{authorize, ScopeNode};
use crate::models::token::{Audience, TokenClaims};
use crate::tokens::jwt::unverified_jti;
use crate::AppState;

/// Cookie carrying the web-session token.
pub const SESSION_COOKIE: &str = "panelbase_jwt";

/// Caller identity established by `token_auth`, taken from the verified
/// session or API token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal_id: String,
    pub jti: String,
    pub audience: Audience,
    pub scopes: ScopeNode,
}

impl From<TokenClaims> for AuthContext {
    fn from(claims: TokenClaims) -> Self {
        Self {
            principal_id: claims.sub,
            jti: claims.jti,
            audience: claims.aud,
            scopes: claims.scopes,
        }
    }
}

impl AuthContext {
    pub fn has_scope(&self, path: &str, action: &str) -> bool {
        authorize(&self.scopes, path, action)
    }

    /// 403 with a generic body on denial; the checked scope goes to the log only.
    pub fn require(&self, path: &str, action: &str) -> Result<(), AuthError> {
        if self.has_scope(path, action) {
            return Ok(());
        }
        tracing::warn!(
            owner_id = %self.principal_id,
            jti = %self.jti,
            scope = %format!("{}:{}", path, action),
            "access denied: missing scope"
        );
        Err(AuthError::InsufficientPermissions)
    }

    /// Session-only routes (logout, refresh) refuse API tokens with a 403.
    pub fn require_session(&self) -> Result<(), AuthError> {
        if self.audience == Audience::WebSession {
            return Ok(());
        }
        tracing::warn!(
            owner_id = %self.principal_id,
            jti = %self.jti,
            audience = %self.audience,
            "access denied: session token required"
        );
        Err(AuthError::InsufficientPermissions)
    }
}

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim())
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Requires a valid session or API token and stores an `AuthContext` in the
/// request extensions.
///
/// The audience to validate against follows the JTI prefix (`ses_` or `tok_`);
/// the JWT `aud` claim and the stored metadata must then agree with it.
pub async fn token_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers()) else {
        tracing::warn!("token auth: no bearer token or session cookie");
        return AuthError::SignatureInvalid.into_response();
    };

    let Some(audience) = unverified_jti(&token).as_deref().and_then(Audience::from_jti) else {
        tracing::warn!("token auth: token carries no recognisable jti");
        return AuthError::SignatureInvalid.into_response();
    };

    match state.validator.validate(&token, audience).await {
        Ok(claims) => {
            req.extensions_mut().insert(AuthContext::from(claims));
            next.run(req).await
        }
        Err(e @ (AuthError::StoreUnavailable(_) | AuthError::Internal(_))) => e.into_response(),
        Err(e) => {
            tracing::warn!(audience = %audience, "token auth rejected: {}", e);
            // One body for every rejection.
            AuthError::SignatureInvalid.into_response()
        }
    }
}
