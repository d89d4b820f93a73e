use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;
use crate::models::scope::ScopeNode;

pub const PRINCIPAL_ID_PREFIX: &str = "usr_";
pub const SESSION_ID_PREFIX: &str = "ses_";
pub const API_TOKEN_ID_PREFIX: &str = "tok_";

/// Random bytes behind every generated identifier (hex-encoded to 32 chars).
const ID_RANDOM_BYTES: usize = 16;

/// Intended consumer class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    #[serde(rename = "web-session")]
    WebSession,
    #[serde(rename = "api")]
    Api,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::WebSession => "web-session",
            Audience::Api => "api",
        }
    }

    pub fn jti_prefix(&self) -> &'static str {
        match self {
            Audience::WebSession => SESSION_ID_PREFIX,
            Audience::Api => API_TOKEN_ID_PREFIX,
        }
    }

    /// Recover the audience a JTI was minted for from its prefix.
    /// Returns `None` for anything that isn't `ses_`/`tok_` + 32 hex chars.
    pub fn from_jti(jti: &str) -> Option<Self> {
        [Audience::WebSession, Audience::Api]
            .into_iter()
            .find(|aud| {
                jti.strip_prefix(aud.jti_prefix())
                    .map(is_random_part)
                    .unwrap_or(false)
            })
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web-session" | "web" | "session" => Ok(Audience::WebSession),
            "api" => Ok(Audience::Api),
            other => Err(AuthError::InvalidRequest(format!("unknown audience '{}'", other))),
        }
    }
}

fn is_random_part(s: &str) -> bool {
    s.len() == ID_RANDOM_BYTES * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `<prefix><32 hex chars>` from the OS RNG.
pub fn generate_id(prefix: &str) -> String {
    let mut random_bytes = [0u8; ID_RANDOM_BYTES];
    OsRng.fill_bytes(&mut random_bytes);
    format!("{}{}", prefix, hex::encode(random_bytes))
}

pub fn generate_jti(audience: Audience) -> String {
    generate_id(audience.jti_prefix())
}

/// Metadata persisted per JTI. Revocation lives in a separate ledger and is
/// never a field here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub jti: String,
    pub owner_id: String,
    pub audience: Audience,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: ScopeNode,
}

impl TokenMetadata {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A metadata record as read back from the store, with its derived
/// revocation state attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredToken {
    #[serde(flatten)]
    pub metadata: TokenMetadata,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// JWT payload. Field names are the wire claim names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub aud: Audience,
    pub sub: String,
    pub name: String,
    pub jti: String,
    #[serde(default)]
    pub scopes: ScopeNode,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn from_metadata(metadata: &TokenMetadata, issuer: &str) -> Self {
        Self {
            aud: metadata.audience,
            sub: metadata.owner_id.clone(),
            name: metadata.name.clone(),
            jti: metadata.jti.clone(),
            scopes: metadata.scopes.clone(),
            iss: issuer.to_string(),
            iat: metadata.issued_at.timestamp(),
            exp: metadata.expires_at.timestamp(),
        }
    }
}
