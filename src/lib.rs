//! panel-auth: token lifecycle and scope-based authorization for an admin panel.
//!
//! Library crate shared by the binary and the integration tests in `tests/`.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod directory;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod store;
pub mod tokens;

use directory::MemoryDirectory;
use store::TokenStore;
use tokens::{TokenIssuer, TokenService, TokenValidator};

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub store: Arc<dyn TokenStore>,
    pub directory: Arc<MemoryDirectory>,
    pub issuer: TokenIssuer,
    pub validator: TokenValidator,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TokenStore>,
        directory: Arc<MemoryDirectory>,
        settings: config::TokenSettings,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(store.clone(), settings.clone()),
            validator: TokenValidator::new(store.clone(), directory.clone(), settings),
            tokens: TokenService::new(store.clone()),
            store,
            directory,
        }
    }
}
