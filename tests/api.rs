//! HTTP surface tests: `/api/v1` routes driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use panel_auth::api::app_router;
use panel_auth::config::TokenSettings;
use panel_auth::directory::MemoryDirectory;
use panel_auth::models::token::Audience;
use panel_auth::store::embedded::EmbeddedStore;
use panel_auth::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const USERS: &str = r#"{
    "users": {
        "usr_1": {
            "username": "admin",
            "name": "Admin",
            "active": true,
            "scopes": {"users": ["read", "update"], "api": "*"},
            "api": {"jwt_secret": "admin-secret"}
        },
        "usr_2": {
            "username": "viewer",
            "name": "Viewer",
            "active": true,
            "scopes": {"users": ["read"], "api": ["read"]},
            "api": {"jwt_secret": "viewer-secret"}
        }
    }
}"#;

fn state() -> Arc<AppState> {
    let store = Arc::new(EmbeddedStore::in_memory().unwrap());
    let directory = Arc::new(MemoryDirectory::from_json_str(USERS).unwrap());
    Arc::new(AppState::new(store, directory, TokenSettings::default()))
}

fn session(state: &AppState, username: &str) -> String {
    let principal = state.directory.find_by_username(username).unwrap();
    state.issuer.issue_session(&principal).unwrap().token
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));
    match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

// ── Authentication ───────────────────────────────────────────

#[tokio::test]
async fn test_healthz_needs_no_token() {
    let app = app_router(state());
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.headers()["cache-control"], "no-store");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = app_router(state());
    let req = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "trace-abc-123")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-request-id"], "trace-abc-123");

    let req = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "not valid!")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let generated = resp.headers()["x-request-id"].to_str().unwrap();
    assert_ne!(generated, "not valid!");
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn test_missing_and_bad_tokens_get_generic_401() {
    let app = app_router(state());

    let req = Request::builder().uri("/api/v1/tokens").body(Body::empty()).unwrap();
    let (status, missing) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, garbage) = send(&app, authed("GET", "/api/v1/tokens", "a.b.c", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing, garbage);
    assert_eq!(garbage["error"]["message"], "invalid or expired token");
}

#[tokio::test]
async fn test_api_token_authenticates_within_its_scopes() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let (status, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &session,
            Some(json!({"name": "ci", "duration": "P30D", "scopes": {"api": ["read"]}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let api_token = created["token"].as_str().unwrap();
    assert!(created["id"].as_str().unwrap().starts_with("tok_"));

    let (status, listed) = send(&app, authed("GET", "/api/v1/tokens", api_token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["id"], created["id"]);

    let (status, _) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            api_token,
            Some(json!({"name": "nested", "duration": "P1D"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_api_token_cannot_use_session_routes() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let (_, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &session,
            Some(json!({"name": "ci", "duration": "P30D"})),
        ),
    )
    .await;
    let api_token = created["token"].as_str().unwrap();

    let (status, _) = send(&app, authed("DELETE", "/api/v1/session", api_token, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, authed("POST", "/api/v1/session/refresh", api_token, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Still usable afterwards.
    let (status, _) = send(&app, authed("GET", "/api/v1/tokens", api_token, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_revoked_api_token_gets_generic_401() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let (_, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &session,
            Some(json!({"name": "ci", "duration": "P30D"})),
        ),
    )
    .await;
    let api_token = created["token"].as_str().unwrap();
    let uri = format!("/api/v1/tokens/{}", created["id"].as_str().unwrap());

    let (status, _) = send(&app, authed("DELETE", &uri, &session, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, authed("GET", "/api/v1/tokens", api_token, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "invalid or expired token");
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let req = Request::builder()
        .uri("/api/v1/tokens")
        .header("cookie", format!("panelbase_jwt={}", session))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ── Token management ─────────────────────────────────────────

#[tokio::test]
async fn test_create_list_update_revoke() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let (status, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &session,
            Some(json!({
                "name": "deploy",
                "description": "release pipeline",
                "duration": "P1M",
                "scopes": {"users": ["read"]}
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("tok_"));
    assert_eq!(created["scopes"], json!({"users": ["read"]}));
    assert_eq!(created["description"], "release pipeline");
    assert_eq!(created["owner_id"], "usr_1");

    // The signed token validates as an API token.
    let claims = st
        .validator
        .validate(created["token"].as_str().unwrap(), Audience::Api)
        .await
        .unwrap();
    assert_eq!(claims.jti, id);

    let (status, listed) = send(&app, authed("GET", "/api/v1/tokens", &session, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());
    assert!(listed[0].get("token").is_none());

    let uri = format!("/api/v1/tokens/{}", id);
    let (status, renamed) = send(
        &app,
        authed("PATCH", &uri, &session, Some(json!({"name": "deploy-prod"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "deploy-prod");

    let (status, described) = send(
        &app,
        authed(
            "PATCH",
            &uri,
            &session,
            Some(json!({"description": "used by the release pipeline"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(described["name"], "deploy-prod");
    assert_eq!(described["description"], "used by the release pipeline");

    let (status, _) = send(&app, authed("PATCH", &uri, &session, Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, authed("DELETE", &uri, &session, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, shown) = send(&app, authed("GET", &uri, &session, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["revoked"], true);

    let (_, listed) = send(&app, authed("GET", "/api/v1/tokens", &session, None)).await;
    assert_eq!(listed, json!([]));

    let (status, _) = send(
        &app,
        authed("PATCH", &uri, &session, Some(json!({"name": "again"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_scope_lists_are_not_widened() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let (status, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &session,
            Some(json!({"name": "x", "duration": "P1D", "scopes": {"users": []}})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["scopes"], json!({"users": []}));

    // The token can't even list tokens.
    let token = created["token"].as_str().unwrap();
    let (status, _) = send(&app, authed("GET", "/api/v1/tokens", token, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    for (body, expected) in [
        (json!({"name": "x", "scopes": ["users:read"]}), StatusCode::BAD_REQUEST),
        (json!({"name": "x", "duration": "P1W"}), StatusCode::BAD_REQUEST),
        (json!({"name": "x", "duration": "P1D", "scopes": ["users"]}), StatusCode::BAD_REQUEST),
        (
            json!({"name": "x", "duration": "P1D", "scopes": ["users:delete"]}),
            StatusCode::FORBIDDEN,
        ),
    ] {
        let (status, _) = send(&app, authed("POST", "/api/v1/tokens", &session, Some(body))).await;
        assert_eq!(status, expected);
    }
}

#[tokio::test]
async fn test_missing_scope_is_generic_403() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "viewer");

    let (status, body) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &session,
            Some(json!({"name": "x", "duration": "P1D"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let message = body["error"]["message"].as_str().unwrap();
    assert!(!message.contains("api"));
    assert!(!message.contains("create"));

    let (status, _) = send(&app, authed("GET", "/api/v1/tokens", &session, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_other_users_tokens_are_invisible() {
    let st = state();
    let app = app_router(st.clone());
    let admin = session(&st, "admin");
    let viewer = session(&st, "viewer");

    let (_, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &admin,
            Some(json!({"name": "ci", "duration": "P1D"})),
        ),
    )
    .await;
    let uri = format!("/api/v1/tokens/{}", created["id"].as_str().unwrap());

    let (status, _) = send(&app, authed("GET", &uri, &viewer, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, authed("GET", "/api/v1/tokens/not-a-token", &admin, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Managing other users' tokens ─────────────────────────────

#[tokio::test]
async fn test_admin_manages_another_users_tokens() {
    let st = state();
    let app = app_router(st.clone());
    let admin = session(&st, "admin");

    let (status, created) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &admin,
            Some(json!({"user_id": "usr_2", "name": "viewer-ci", "duration": "P7D"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["owner_id"], "usr_2");
    // Inherits the target's base scopes, not the admin's.
    assert_eq!(created["scopes"], json!({"users": ["read"], "api": ["read"]}));
    let id = created["id"].as_str().unwrap();

    let claims = st
        .validator
        .validate(created["token"].as_str().unwrap(), Audience::Api)
        .await
        .unwrap();
    assert_eq!(claims.sub, "usr_2");

    // Not in the admin's own listing.
    let (_, own) = send(&app, authed("GET", "/api/v1/tokens", &admin, None)).await;
    assert_eq!(own, json!([]));

    let (status, theirs) = send(
        &app,
        authed("GET", "/api/v1/tokens?user_id=usr_2", &admin, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(theirs[0]["id"], id);

    let uri = format!("/api/v1/tokens/{}?user_id=usr_2", id);
    let (status, updated) = send(
        &app,
        authed("PATCH", &uri, &admin, Some(json!({"name": "viewer-ci-2"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "viewer-ci-2");

    // Without the target the token is someone else's, so not found.
    let bare = format!("/api/v1/tokens/{}", id);
    let (status, _) = send(&app, authed("DELETE", &bare, &admin, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, authed("DELETE", &uri, &admin, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(st.store.is_revoked(id).unwrap());
}

#[tokio::test]
async fn test_targeting_another_user_needs_all_action() {
    let st = state();
    let app = app_router(st.clone());
    let viewer = session(&st, "viewer");
    let admin = session(&st, "admin");

    let (status, body) = send(
        &app,
        authed("GET", "/api/v1/tokens?user_id=usr_1", &viewer, None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body["error"]["message"].as_str().unwrap().contains("all"));

    // Naming yourself is the same as naming nobody.
    let (status, _) = send(
        &app,
        authed("GET", "/api/v1/tokens?user_id=usr_2", &viewer, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        authed(
            "POST",
            "/api/v1/tokens",
            &admin,
            Some(json!({"user_id": "usr_404", "name": "x", "duration": "P1D"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "user_not_found");
}

// ── Sessions ─────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_swaps_session() {
    let st = state();
    let app = app_router(st.clone());
    let old = session(&st, "admin");

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/v1/session/refresh", &old, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()["set-cookie"].to_str().unwrap().to_string();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    let fresh = body["token"].as_str().unwrap();
    assert!(body["id"].as_str().unwrap().starts_with("ses_"));
    assert!(cookie.starts_with(&format!("panelbase_jwt={};", fresh)));
    assert!(cookie.contains("HttpOnly"));

    let (status, _) = send(&app, authed("GET", "/api/v1/tokens", &old, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, authed("GET", "/api/v1/tokens", fresh, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let st = state();
    let app = app_router(st.clone());
    let session = session(&st, "admin");

    let resp = app
        .clone()
        .oneshot(authed("DELETE", "/api/v1/session", &session, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let cookie = resp.headers()["set-cookie"].to_str().unwrap();
    assert!(cookie.starts_with("panelbase_jwt=;"));
    assert!(cookie.contains("Max-Age=0"));

    let (status, _) = send(&app, authed("GET", "/api/v1/tokens", &session, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
