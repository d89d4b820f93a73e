//! In-memory principal directory, optionally seeded from a users file:
//!
//! ```json
//! { "users": { "usr_1": { "username": "admin", "name": "Admin", "active": true,
//!                         "scopes": { "api": "*" }, "api": { "jwt_secret": "..." } } } }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::directory::PrincipalDirectory;
use crate::models::principal::Principal;
use crate::models::scope::ScopeNode;

#[derive(Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, UserEntry>,
}

#[derive(Deserialize)]
struct UserEntry {
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "is_active")]
    active: bool,
    #[serde(default)]
    scopes: ScopeNode,
    api: ApiSection,
}

#[derive(Deserialize)]
struct ApiSection {
    jwt_secret: String,
}

#[derive(Default)]
pub struct MemoryDirectory {
    principals: DashMap<String, Principal>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read users file '{}'", path.display()))?;
        let dir = Self::from_json_str(&raw)
            .with_context(|| format!("invalid users file '{}'", path.display()))?;
        tracing::info!(
            path = %path.display(),
            count = dir.principals.len(),
            "Loaded principals"
        );
        Ok(dir)
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let file: UsersFile = serde_json::from_str(raw)?;
        let dir = Self::new();
        let mut seen = HashSet::new();

        for (id, entry) in file.users {
            if !seen.insert(entry.username.clone()) {
                bail!("duplicate username '{}'", entry.username);
            }
            if entry.api.jwt_secret.is_empty() {
                bail!("principal '{}' has an empty jwt_secret", id);
            }
            dir.insert(Principal {
                id,
                username: entry.username,
                name: entry.name,
                active: entry.active,
                scopes: entry.scopes,
                signing_secret: entry.api.jwt_secret,
            });
        }
        Ok(dir)
    }

    /// Insert or replace a principal by id.
    pub fn insert(&self, principal: Principal) {
        self.principals.insert(principal.id.clone(), principal);
    }

    /// Returns false when the principal is unknown.
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        match self.principals.get_mut(id) {
            Some(mut p) => {
                p.active = active;
                tracing::info!(principal_id = %id, active, "principal status changed");
                true
            }
            None => false,
        }
    }

    pub fn find_by_username(&self, username: &str) -> Option<Principal> {
        self.principals
            .iter()
            .find(|entry| entry.value().username == username)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryDirectory {
    async fn get_principal_by_id(&self, id: &str) -> Option<Principal> {
        self.principals.get(id).map(|p| p.value().clone())
    }
}
