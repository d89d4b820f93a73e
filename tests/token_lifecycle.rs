//! End-to-end token lifecycle tests against the library crate.
//!
//! Tests cover:
//! - Issue → validate round trip and the concrete usr_1 scenario
//! - Revocation is terminal and idempotent
//! - Expiry with zero leeway
//! - Subset enforcement at issuance; requested trees are never widened
//! - Listing never returns revoked tokens
//! - On-disk store survives a reopen

use std::sync::Arc;

use chrono::{Duration, Utc};
use panel_auth::config::TokenSettings;
use panel_auth::directory::{MemoryDirectory, PrincipalDirectory};
use panel_auth::errors::AuthError;
use panel_auth::models::principal::Principal;
use panel_auth::models::scope::{authorize, ScopeNode};
use panel_auth::models::token::{generate_jti, Audience, TokenClaims, TokenMetadata};
use panel_auth::store::embedded::EmbeddedStore;
use panel_auth::store::TokenStore;
use panel_auth::tokens::jwt::encode_token;
use panel_auth::tokens::{IssueRequest, TokenIssuer, TokenService, TokenValidator};
use serde_json::json;

const SECRET: &str = "usr_1-signing-secret";

struct Harness {
    store: Arc<dyn TokenStore>,
    directory: Arc<MemoryDirectory>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    service: TokenService,
}

fn harness_with(store: Arc<dyn TokenStore>) -> Harness {
    let directory = Arc::new(MemoryDirectory::new());
    directory.insert(Principal {
        id: "usr_1".into(),
        username: "admin".into(),
        name: "Admin".into(),
        active: true,
        scopes: serde_json::from_value(json!({"users": ["read", "update"], "api": "*"})).unwrap(),
        signing_secret: SECRET.into(),
    });
    let settings = TokenSettings::default();
    Harness {
        issuer: TokenIssuer::new(store.clone(), settings.clone()),
        validator: TokenValidator::new(store.clone(), directory.clone(), settings),
        service: TokenService::new(store.clone()),
        store,
        directory,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(EmbeddedStore::in_memory().unwrap()))
}

fn tree(v: serde_json::Value) -> ScopeNode {
    serde_json::from_value(v).unwrap()
}

fn api_request(scopes: serde_json::Value) -> IssueRequest {
    IssueRequest {
        name: "ci".into(),
        audience: Audience::Api,
        scopes: Some(tree(scopes)),
        duration: "P30D".into(),
        description: String::new(),
    }
}

async fn usr_1(h: &Harness) -> Principal {
    h.directory.get_principal_by_id("usr_1").await.unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// Round trip
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_round_trip_preserves_claims() {
    let h = harness();
    let issued = h
        .issuer
        .issue(&usr_1(&h).await, api_request(json!({"users": ["read"]})))
        .unwrap();

    let claims = h.validator.validate(&issued.token, Audience::Api).await.unwrap();
    assert_eq!(claims.jti, issued.jti);
    assert_eq!(claims.sub, "usr_1");
    assert_eq!(claims.aud, Audience::Api);
    assert_eq!(claims.scopes, issued.metadata.scopes);
    assert_eq!(claims.exp, issued.metadata.expires_at.timestamp());
}

#[tokio::test]
async fn test_usr_1_scenario() {
    let h = harness();
    let issued = h
        .issuer
        .issue(&usr_1(&h).await, api_request(json!({"users": ["read"]})))
        .unwrap();
    let claims = h.validator.validate(&issued.token, Audience::Api).await.unwrap();

    assert!(authorize(&claims.scopes, "users", "read"));
    assert!(!authorize(&claims.scopes, "users", "update"));
    // The owner's base tree allows api:*, the token's own tree does not.
    assert!(authorize(&usr_1(&h).await.scopes, "api", "anything"));
    assert!(!authorize(&claims.scopes, "api", "x"));

    let with_api = h
        .issuer
        .issue(
            &usr_1(&h).await,
            api_request(json!({"users": ["read"], "api": "*"})),
        )
        .unwrap();
    let claims = h.validator.validate(&with_api.token, Audience::Api).await.unwrap();
    assert!(authorize(&claims.scopes, "api", "anything"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Revocation
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_revocation_is_terminal_and_idempotent() {
    let h = harness();
    let issued = h
        .issuer
        .issue(&usr_1(&h).await, api_request(json!({"users": ["read"]})))
        .unwrap();
    assert!(h.validator.validate(&issued.token, Audience::Api).await.is_ok());

    h.service.revoke("usr_1", &issued.jti).unwrap();
    h.service.revoke("usr_1", &issued.jti).unwrap();

    for _ in 0..3 {
        assert!(matches!(
            h.validator.validate(&issued.token, Audience::Api).await,
            Err(AuthError::TokenRevoked)
        ));
    }
    // Metadata is still there for auditing.
    let record = h.store.get(&issued.jti).unwrap().unwrap();
    assert!(record.is_revoked());
    assert_eq!(record.metadata.name, "ci");
}

#[tokio::test]
async fn test_session_and_api_tokens_do_not_cross() {
    let h = harness();
    let session = h.issuer.issue_session(&usr_1(&h).await).unwrap();
    assert!(matches!(
        h.validator.validate(&session.token, Audience::Api).await,
        Err(AuthError::AudienceMismatch)
    ));
    assert!(h
        .validator
        .validate(&session.token, Audience::WebSession)
        .await
        .is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════
// Expiry
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_expired_token_rejected() {
    let h = harness();
    let now = Utc::now();
    let metadata = TokenMetadata {
        jti: generate_jti(Audience::Api),
        owner_id: "usr_1".into(),
        audience: Audience::Api,
        name: "old".into(),
        description: String::new(),
        issued_at: now - Duration::days(31),
        expires_at: now - Duration::seconds(1),
        scopes: tree(json!({"users": ["read"]})),
    };
    h.store.put(&metadata.jti, &metadata).unwrap();
    let token = encode_token(&TokenClaims::from_metadata(&metadata, "PanelBase"), SECRET).unwrap();

    assert!(matches!(
        h.validator.validate(&token, Audience::Api).await,
        Err(AuthError::TokenExpired)
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// Subset enforcement
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_escalation_is_rejected_and_nothing_stored() {
    let h = harness();
    for requested in [
        json!({"users": ["delete"]}),
        json!({"users": "*"}),
        json!({"themes": ["read"]}),
        json!("*"),
    ] {
        assert!(matches!(
            h.issuer.issue(&usr_1(&h).await, api_request(requested)),
            Err(AuthError::ScopeExceedsPermissions)
        ));
    }
    assert!(h.service.list("usr_1", None).unwrap().is_empty());
}

#[tokio::test]
async fn test_requested_tree_round_trips_even_when_it_grants_nothing() {
    let h = harness();
    let issued = h
        .issuer
        .issue(&usr_1(&h).await, api_request(json!({"users": [], "api": {}})))
        .unwrap();
    let claims = h.validator.validate(&issued.token, Audience::Api).await.unwrap();

    assert_eq!(claims.scopes, tree(json!({"users": [], "api": {}})));
    assert!(!authorize(&claims.scopes, "users", "read"));
    assert!(!authorize(&claims.scopes, "api", "delete"));
}

#[tokio::test]
async fn test_subtree_under_wildcard_is_allowed() {
    let h = harness();
    let issued = h
        .issuer
        .issue(
            &usr_1(&h).await,
            api_request(json!({"api": {"tokens": ["create", "delete"]}})),
        )
        .unwrap();
    assert!(authorize(&issued.metadata.scopes, "api:tokens", "delete"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Listing
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_listing_excludes_revoked() {
    let h = harness();
    let p = usr_1(&h).await;
    let a = h.issuer.issue(&p, api_request(json!({"users": ["read"]}))).unwrap();
    let b = h.issuer.issue(&p, api_request(json!({"users": ["read"]}))).unwrap();
    h.issuer.issue_session(&p).unwrap();

    h.store.revoke(&a.jti).unwrap();

    let listed = h.store.list_by_owner("usr_1", Some(Audience::Api)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].jti, b.jti);
    assert!(listed.iter().all(|m| m.jti != a.jti));
}

// ═══════════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.db");

    let (kept, revoked) = {
        let h = harness_with(Arc::new(EmbeddedStore::open(&path).unwrap()));
        let p = usr_1(&h).await;
        let kept = h.issuer.issue(&p, api_request(json!({"users": ["read"]}))).unwrap();
        let revoked = h.issuer.issue(&p, api_request(json!({"users": ["read"]}))).unwrap();
        h.store.revoke(&revoked.jti).unwrap();
        (kept, revoked)
    };

    let h = harness_with(Arc::new(EmbeddedStore::open(&path).unwrap()));
    assert!(h.validator.validate(&kept.token, Audience::Api).await.is_ok());
    assert!(matches!(
        h.validator.validate(&revoked.token, Audience::Api).await,
        Err(AuthError::TokenRevoked)
    ));
}
