use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directory::PrincipalDirectory;
use crate::errors::AuthError;
use crate::middleware::auth::{AuthContext, SESSION_COOKIE};
use crate::models::principal::Principal;
use crate::models::scope::ScopeNode;
use crate::models::token::{Audience, StoredToken, TokenMetadata};
use crate::tokens::{IssueRequest, TokenUpdate};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

/// Scopes as either `["users:read", ...]` or a scope tree object.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum ScopeInput {
    List(Vec<String>),
    Tree(ScopeNode),
}

impl ScopeInput {
    pub fn into_tree(self) -> Result<ScopeNode, AuthError> {
        match self {
            ScopeInput::List(items) => ScopeNode::from_scope_strings(&items),
            ScopeInput::Tree(tree) => Ok(tree),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateTokenRequest {
    /// Issue for another user; needs `api` action `create:all`.
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: String,
    pub scopes: Option<ScopeInput>,
}

/// `?user_id=` selects whose tokens a request manages; defaults to the caller.
#[derive(Deserialize, Default)]
pub struct TargetQuery {
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateTokenResponse {
    pub id: String,
    pub token: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub scopes: ScopeNode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Deserialize)]
pub struct UpdateTokenRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub audience: Audience,
    pub scopes: ScopeNode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub revoked: bool,
}

impl TokenResponse {
    fn new(metadata: TokenMetadata, revoked: bool) -> Self {
        Self {
            expired: metadata.is_expired_at(Utc::now()),
            id: metadata.jti,
            owner_id: metadata.owner_id,
            name: metadata.name,
            description: metadata.description,
            audience: metadata.audience,
            scopes: metadata.scopes,
            created_at: metadata.issued_at,
            expires_at: metadata.expires_at,
            revoked,
        }
    }
}

impl From<StoredToken> for TokenResponse {
    fn from(record: StoredToken) -> Self {
        let revoked = record.is_revoked();
        Self::new(record.metadata, revoked)
    }
}

async fn caller(state: &AppState, ctx: &AuthContext) -> Result<Principal, AuthError> {
    state
        .directory
        .get_principal_by_id(&ctx.principal_id)
        .await
        .ok_or(AuthError::PrincipalNotFound)
}

/// Whose tokens this request acts on. The caller's own tokens need `api`
/// action `<action>`; another user's need `<action>:all`, and that user must
/// exist.
async fn target_owner(
    state: &AppState,
    ctx: &AuthContext,
    user_id: Option<String>,
    action: &str,
) -> Result<String, AuthError> {
    let target = user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && *id != ctx.principal_id);

    let Some(target) = target else {
        ctx.require("api", action)?;
        return Ok(ctx.principal_id.clone());
    };

    ctx.require("api", &format!("{}:all", action))?;
    if state.directory.get_principal_by_id(&target).await.is_none() {
        tracing::warn!(acting_user = %ctx.principal_id, owner_id = %target, "target user not found");
        return Err(AuthError::TargetUserNotFound);
    }
    tracing::info!(
        acting_user = %ctx.principal_id,
        owner_id = %target,
        action,
        "managing another user's tokens"
    );
    Ok(target)
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age_secs.max(0)
    )
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/tokens: issue an API token; the signed value is returned once
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(payload): Json<CreateTokenRequest>,
) -> Result<(StatusCode, Json<CreateTokenResponse>), AuthError> {
    let owner_id = target_owner(&state, &ctx, payload.user_id, "create").await?;
    let principal = state
        .directory
        .get_principal_by_id(&owner_id)
        .await
        .ok_or(AuthError::PrincipalNotFound)?;

    let scopes = payload.scopes.map(ScopeInput::into_tree).transpose()?;
    let issued = state.issuer.issue(
        &principal,
        IssueRequest {
            name: payload.name,
            audience: Audience::Api,
            scopes,
            duration: payload.duration,
            description: payload.description,
        },
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            id: issued.jti,
            token: issued.token,
            owner_id: issued.metadata.owner_id,
            name: issued.metadata.name,
            description: issued.metadata.description,
            scopes: issued.metadata.scopes,
            created_at: issued.metadata.issued_at,
            expires_at: issued.metadata.expires_at,
            message: "Store this token now; it cannot be shown again.".to_string(),
        }),
    ))
}

/// GET /api/v1/tokens: non-revoked API tokens, newest first
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<Vec<TokenResponse>>, AuthError> {
    let owner_id = target_owner(&state, &ctx, target.user_id, "read").await?;
    let tokens = state.tokens.list(&owner_id, Some(Audience::Api))?;
    Ok(Json(
        tokens
            .into_iter()
            .map(|m| TokenResponse::new(m, false))
            .collect(),
    ))
}

/// GET /api/v1/tokens/:id
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(target): Query<TargetQuery>,
) -> Result<Json<TokenResponse>, AuthError> {
    let owner_id = target_owner(&state, &ctx, target.user_id, "read").await?;
    let record = state.tokens.get(&owner_id, &id)?;
    Ok(Json(record.into()))
}

/// PATCH /api/v1/tokens/:id: change name and/or description
pub async fn update_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(target): Query<TargetQuery>,
    Json(payload): Json<UpdateTokenRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let owner_id = target_owner(&state, &ctx, target.user_id, "update").await?;
    let changes = TokenUpdate {
        name: payload.name,
        description: payload.description,
    };
    let metadata = state
        .tokens
        .update(&owner_id, &id, changes)
        .map_err(|e| match e {
            // Not an authentication failure of the caller.
            AuthError::TokenRevoked => {
                AuthError::InvalidRequest("revoked tokens cannot be modified".into())
            }
            other => other,
        })?;
    Ok(Json(TokenResponse::new(metadata, false)))
}

/// DELETE /api/v1/tokens/:id: revoke
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(target): Query<TargetQuery>,
) -> Result<StatusCode, AuthError> {
    let owner_id = target_owner(&state, &ctx, target.user_id, "delete").await?;
    state.tokens.revoke(&owner_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/session/refresh: swap the presented session for a fresh one
///
/// The new session carries the principal's current base scopes. The old JTI is
/// revoked only after the new token is stored.
pub async fn refresh_session(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<([(HeaderName, String); 1], Json<SessionResponse>), AuthError> {
    ctx.require_session()?;
    let principal = caller(&state, &ctx).await?;

    let issued = state.issuer.issue_session(&principal)?;
    state.store.revoke(&ctx.jti)?;
    tracing::info!(
        owner_id = %ctx.principal_id,
        old_jti = %ctx.jti,
        jti = %issued.jti,
        "session refreshed"
    );

    let max_age = (issued.metadata.expires_at - issued.metadata.issued_at).num_seconds();
    let cookie = session_cookie(&issued.token, max_age);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse {
            id: issued.jti,
            token: issued.token,
            expires_at: issued.metadata.expires_at,
        }),
    ))
}

/// DELETE /api/v1/session: revoke the session token presented with this request
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<(StatusCode, [(HeaderName, String); 1]), AuthError> {
    ctx.require_session()?;
    // The jti was verified by token_auth; untracked sessions are revoked too.
    state.store.revoke(&ctx.jti)?;
    tracing::info!(owner_id = %ctx.principal_id, jti = %ctx.jti, "session ended");
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, session_cookie("", 0))]))
}
