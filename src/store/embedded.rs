//! EmbeddedStore: token metadata and revocation ledger in a single redb file.
//!
//! Layout:
//!   - `tokens`:         JTI -> metadata JSON
//!   - `revoked_tokens`: JTI -> RFC 3339 revocation timestamp
//!
//! redb serializes writers and gives readers a snapshot as of transaction
//! start, so no lock is layered on top.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};

use crate::errors::AuthError;
use crate::models::token::{Audience, StoredToken, TokenMetadata};
use crate::store::TokenStore;

const TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("tokens");
const REVOKED_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("revoked_tokens");

fn unavailable(e: impl Into<redb::Error>) -> AuthError {
    AuthError::from(e.into())
}

fn parse_revoked_at(raw: &[u8]) -> DateTime<Utc> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        // An unreadable timestamp still marks the token revoked.
        .unwrap_or_default()
}

pub struct EmbeddedStore {
    db: Database,
}

impl EmbeddedStore {
    /// Open (or create) the store file and make sure both tables exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                AuthError::StoreUnavailable(format!(
                    "failed to create token store directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let db = Database::create(path).map_err(unavailable)?;
        let store = Self::init(db)?;
        tracing::info!(path = %path.display(), "Token store opened");
        Ok(store)
    }

    /// A store that lives only as long as the handle. Used by tests.
    pub fn in_memory() -> Result<Self, AuthError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(unavailable)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, AuthError> {
        let tx = db.begin_write().map_err(unavailable)?;
        tx.open_table(TOKENS).map_err(unavailable)?;
        tx.open_table(REVOKED_TOKENS).map_err(unavailable)?;
        tx.commit().map_err(unavailable)?;
        Ok(Self { db })
    }
}

impl TokenStore for EmbeddedStore {
    fn put(&self, jti: &str, metadata: &TokenMetadata) -> Result<(), AuthError> {
        let blob = serde_json::to_vec(metadata)
            .map_err(|e| anyhow::anyhow!("failed to encode token metadata for {}: {}", jti, e))?;

        let tx = self.db.begin_write().map_err(unavailable)?;
        {
            let mut tokens = tx.open_table(TOKENS).map_err(unavailable)?;
            tokens.insert(jti, blob.as_slice()).map_err(unavailable)?;
        }
        tx.commit().map_err(unavailable)?;

        tracing::debug!(jti = %jti, owner_id = %metadata.owner_id, "token metadata stored");
        Ok(())
    }

    fn get(&self, jti: &str) -> Result<Option<StoredToken>, AuthError> {
        let tx = self.db.begin_read().map_err(unavailable)?;
        let tokens = tx.open_table(TOKENS).map_err(unavailable)?;
        let revoked = tx.open_table(REVOKED_TOKENS).map_err(unavailable)?;

        let Some(blob) = tokens.get(jti).map_err(unavailable)? else {
            return Ok(None);
        };
        let mut metadata: TokenMetadata = serde_json::from_slice(blob.value())
            .map_err(|e| anyhow::anyhow!("corrupt token metadata for {}: {}", jti, e))?;
        // The key is authoritative.
        metadata.jti = jti.to_string();

        let revoked_at = revoked
            .get(jti)
            .map_err(unavailable)?
            .map(|ts| parse_revoked_at(ts.value()));

        Ok(Some(StoredToken {
            metadata,
            revoked_at,
        }))
    }

    fn revoke(&self, jti: &str) -> Result<(), AuthError> {
        let tx = self.db.begin_write().map_err(unavailable)?;
        let newly_revoked = {
            let mut revoked = tx.open_table(REVOKED_TOKENS).map_err(unavailable)?;
            let already = revoked.get(jti).map_err(unavailable)?.is_some();
            if !already {
                let now = Utc::now().to_rfc3339();
                revoked.insert(jti, now.as_bytes()).map_err(unavailable)?;
            }
            !already
        };
        tx.commit().map_err(unavailable)?;

        if newly_revoked {
            tracing::info!(jti = %jti, "token revoked");
        } else {
            tracing::debug!(jti = %jti, "token already revoked");
        }
        Ok(())
    }

    fn is_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        let tx = self.db.begin_read().map_err(unavailable)?;
        let revoked = tx.open_table(REVOKED_TOKENS).map_err(unavailable)?;
        let found = revoked.get(jti).map_err(unavailable)?.is_some();
        Ok(found)
    }

    fn list_by_owner(
        &self,
        owner_id: &str,
        audience: Option<Audience>,
    ) -> Result<Vec<TokenMetadata>, AuthError> {
        let tx = self.db.begin_read().map_err(unavailable)?;
        let tokens = tx.open_table(TOKENS).map_err(unavailable)?;
        let revoked = tx.open_table(REVOKED_TOKENS).map_err(unavailable)?;

        let mut out = Vec::new();
        for entry in tokens.iter().map_err(unavailable)? {
            let (key, blob) = entry.map_err(unavailable)?;
            let jti = key.value();
            if revoked.get(jti).map_err(unavailable)?.is_some() {
                continue;
            }

            let mut metadata: TokenMetadata = match serde_json::from_slice(blob.value()) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(jti = %jti, "skipping undecodable token metadata: {}", e);
                    continue;
                }
            };
            if metadata.owner_id != owner_id {
                continue;
            }
            if audience.is_some_and(|aud| aud != metadata.audience) {
                continue;
            }
            metadata.jti = jti.to_string();
            out.push(metadata);
        }

        out.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(out)
    }
}
