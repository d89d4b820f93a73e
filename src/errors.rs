use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    TokenExpired,

    #[error("token has been revoked")]
    TokenRevoked,

    #[error("token audience does not match")]
    AudienceMismatch,

    #[error("principal is inactive")]
    PrincipalInactive,

    #[error("principal not found")]
    PrincipalNotFound,

    #[error("requested scopes exceed principal permissions")]
    ScopeExceedsPermissions,

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("token duration is required")]
    DurationRequired,

    #[error("invalid duration format: {0}")]
    InvalidDurationFormat(String),

    #[error("malformed token id")]
    InvalidTokenId,

    #[error("maximum number of API tokens ({0}) reached")]
    TokenLimitReached(usize),

    #[error("insufficient permissions")]
    InsufficientPermissions,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("token store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("record not found")]
    RecordNotFound,

    #[error("target user not found")]
    TargetUserNotFound,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// True for the failures a presented token can produce during validation.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::SignatureInvalid
                | AuthError::TokenExpired
                | AuthError::TokenRevoked
                | AuthError::AudienceMismatch
                | AuthError::PrincipalInactive
                | AuthError::PrincipalNotFound
        )
    }
}

impl From<redb::Error> for AuthError {
    fn from(e: redb::Error) -> Self {
        AuthError::StoreUnavailable(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            e if e.is_authentication_failure() => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_token",
                "invalid or expired token".to_string(),
            ),
            AuthError::InsufficientPermissions | AuthError::ScopeExceedsPermissions => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "insufficient_permissions",
                self.to_string(),
            ),
            AuthError::InvalidScope(_)
            | AuthError::DurationRequired
            | AuthError::InvalidDurationFormat(_)
            | AuthError::InvalidTokenId
            | AuthError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                self.to_string(),
            ),
            AuthError::TokenLimitReached(_) => (
                StatusCode::CONFLICT,
                "invalid_request_error",
                "token_limit_reached",
                self.to_string(),
            ),
            AuthError::RecordNotFound => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "token_not_found",
                "token not found".to_string(),
            ),
            AuthError::TargetUserNotFound => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "user_not_found",
                self.to_string(),
            ),
            AuthError::StoreUnavailable(e) => {
                tracing::error!("Token store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            _ => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
