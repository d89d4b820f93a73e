use serde::{Deserialize, Serialize};

use crate::models::scope::ScopeNode;

/// An account that owns tokens. `scopes` is the most the principal can ever
/// delegate; `signing_secret` keys the HMAC on every token it owns.
#[derive(Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub scopes: ScopeNode,
    pub signing_secret: String,
}

impl Principal {
    /// Display name, falling back to the username.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.username
        } else {
            &self.name
        }
    }
}

// Keep the signing secret out of logs.
impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}
