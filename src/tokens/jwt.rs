use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::errors::AuthError;
use crate::models::token::{Audience, TokenClaims};

/// Sign `claims` as an HS256 JWT with the owner's secret.
pub fn encode_token(claims: &TokenClaims, secret: &str) -> Result<String, AuthError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::encode(&header, claims, &key)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed to sign token: {}", e)))
}

/// Verify signature, issuer, audience and expiry (zero leeway).
pub fn decode_token(
    token: &str,
    secret: &str,
    issuer: &str,
    expected_audience: Audience,
) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[expected_audience.as_str()]);
    validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

    let key = DecodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::decode::<TokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
            _ => AuthError::SignatureInvalid,
        })
}

/// The `sub` claim read without verification, used only to pick the key.
pub fn unverified_subject(token: &str) -> Option<String> {
    unverified_claim(token, "sub")
}

/// The `jti` claim read without verification, used only to pick the audience
/// to validate against. The signature still covers both `jti` and `aud`.
pub fn unverified_jti(token: &str) -> Option<String> {
    unverified_claim(token, "jti")
}

fn unverified_claim(token: &str, claim: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let payload_bytes = engine.decode(parts[1]).ok()?;
    let raw: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    raw.get(claim)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
