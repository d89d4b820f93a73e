pub mod embedded;

use crate::errors::AuthError;
use crate::models::token::{Audience, StoredToken, TokenMetadata};

/// Durable token metadata plus the revocation ledger.
///
/// Implementations keep the two collections independent: `put` never touches
/// the ledger and `revoke` never touches metadata. Calls block the caller for
/// the length of one storage transaction.
/// Implementations: EmbeddedStore (redb file or in-memory).
pub trait TokenStore: Send + Sync {
    /// Insert or replace the metadata record for `jti`.
    fn put(&self, jti: &str, metadata: &TokenMetadata) -> Result<(), AuthError>;

    /// Metadata for `jti` with its revocation state attached.
    fn get(&self, jti: &str) -> Result<Option<StoredToken>, AuthError>;

    /// Append `jti` to the ledger. Revoking twice keeps the first timestamp.
    fn revoke(&self, jti: &str) -> Result<(), AuthError>;

    fn is_revoked(&self, jti: &str) -> Result<bool, AuthError>;

    /// Non-revoked tokens owned by `owner_id`, newest first.
    fn list_by_owner(
        &self,
        owner_id: &str,
        audience: Option<Audience>,
    ) -> Result<Vec<TokenMetadata>, AuthError>;
}
