pub mod memory;

use async_trait::async_trait;

use crate::models::principal::Principal;

pub use memory::MemoryDirectory;

/// Source of principals, their base scope trees and signing secrets.
/// Implementations: MemoryDirectory (users file loaded into a concurrent map).
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn get_principal_by_id(&self, id: &str) -> Option<Principal>;

    async fn is_principal_active(&self, id: &str) -> bool {
        self.get_principal_by_id(id)
            .await
            .map(|p| p.active)
            .unwrap_or(false)
    }
}
