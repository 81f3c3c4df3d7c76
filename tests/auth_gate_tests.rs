mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, empty_request, json_body};
use forest_places::{
    AllowList, AppError,
    auth::{bearer_token, resolve_context},
    models::Role,
    token::TokenKind,
};

// --- Allow-list ---

#[test]
fn public_reads_are_allow_listed() {
    let list = AllowList::standard();

    assert!(list.is_public(&Method::GET, "/health"));
    assert!(list.is_public(&Method::GET, "/api/places"));
    assert!(list.is_public(&Method::GET, "/api/places/3f0c"));
    assert!(list.is_public(&Method::GET, "/api/places/by-category/EDIBLE"));
    assert!(list.is_public(&Method::POST, "/api/auth/login"));
    assert!(list.is_public(&Method::GET, "/api/mushroom-types"));
    assert!(list.is_public(&Method::GET, "/swagger-ui/index.html"));
}

#[test]
fn writes_and_own_data_are_protected() {
    let list = AllowList::standard();

    assert!(!list.is_public(&Method::POST, "/api/places"));
    assert!(!list.is_public(&Method::DELETE, "/api/places/3f0c"));
    assert!(!list.is_public(&Method::GET, "/api/places/my"));
    assert!(!list.is_public(&Method::GET, "/api/me"));
    assert!(!list.is_public(&Method::GET, "/api/users"));
    assert!(!list.is_public(&Method::POST, "/api/uploads/temp"));
}

#[test]
fn single_wildcard_matches_exactly_one_segment() {
    let list = AllowList::new().permit(Some(Method::GET), "/files/*");

    assert!(list.is_public(&Method::GET, "/files/a"));
    assert!(!list.is_public(&Method::GET, "/files"));
    assert!(!list.is_public(&Method::GET, "/files/a/b"));
    assert!(!list.is_public(&Method::POST, "/files/a"));
}

// --- Bearer parsing ---

#[test]
fn bearer_header_parsing() {
    assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
    assert_eq!(bearer_token("bearer abc"), Some("abc"));
    assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
    assert_eq!(bearer_token("Bearer"), None);
    assert_eq!(bearer_token("Bearer   "), None);
    assert_eq!(bearer_token("Bearer a b"), None);
}

// --- Context resolution ---

#[tokio::test]
async fn valid_access_token_resolves_to_stored_identity() {
    let app = TestApp::new();
    let alice = app.repo.seed_user("a@x.com", "alice", Role::User);
    let header = format!("Bearer {}", app.token_for(&alice));

    let ctx = resolve_context(Some(&header), &app.state.tokens, app.repo.as_ref())
        .await
        .unwrap();

    assert!(ctx.is_authenticated());
    assert_eq!(ctx.identity().unwrap().id, alice.id);
    assert_eq!(ctx.role(), Some(Role::User));
}

#[tokio::test]
async fn every_failure_is_plain_unauthenticated() {
    let app = TestApp::new();
    let alice = app.repo.seed_user("a@x.com", "alice", Role::User);
    let ghost = common::identity("ghost@x.com", "ghost", Role::User);

    let refresh = app.state.tokens.issue(&alice, TokenKind::Refresh).unwrap();
    let headers = [
        None,
        Some("Token abc".to_string()),
        Some("Bearer garbage".to_string()),
        Some(format!("Bearer {}", app.expired_token_for(&alice))),
        Some(format!("Bearer {}", refresh)),
        Some(format!("Bearer {}", app.token_for(&ghost))),
    ];

    for header in headers {
        let result = resolve_context(header.as_deref(), &app.state.tokens, app.repo.as_ref()).await;
        assert!(
            matches!(result, Err(AppError::Unauthenticated)),
            "header {:?} should be refused",
            header
        );
    }
}

#[tokio::test]
async fn deactivated_identity_is_refused_with_a_valid_token() {
    let app = TestApp::new();
    let alice = app.repo.seed_user("a@x.com", "alice", Role::User);
    let header = format!("Bearer {}", app.token_for(&alice));

    app.repo.deactivate(alice.id);

    let result = resolve_context(Some(&header), &app.state.tokens, app.repo.as_ref()).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn role_comes_from_the_store_not_the_token() {
    let app = TestApp::new();
    // Token minted while the account claimed ADMIN; the stored role is USER.
    let stored = app.repo.seed_user("a@x.com", "alice", Role::User);
    let mut claimed = stored.clone();
    claimed.role = Role::Admin;
    let header = format!("Bearer {}", app.token_for(&claimed));

    let ctx = resolve_context(Some(&header), &app.state.tokens, app.repo.as_ref())
        .await
        .unwrap();
    assert_eq!(ctx.role(), Some(Role::User));
}

// --- Gate over HTTP ---

#[tokio::test]
async fn protected_route_without_token_is_401_with_generic_body() {
    let app = TestApp::new();

    let response = app.send(empty_request("GET", "/api/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], 401);
    assert_eq!(body["error"]["message"], "authentication required");
}

#[tokio::test]
async fn expired_token_gets_the_same_401() {
    let app = TestApp::new();
    let alice = app.repo.seed_user("a@x.com", "alice", Role::User);
    let token = app.expired_token_for(&alice);

    let response = app.send(empty_request("GET", "/api/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["message"], "authentication required");
}

#[tokio::test]
async fn public_route_ignores_a_bad_token() {
    let app = TestApp::new();

    let response = app
        .send(empty_request("GET", "/api/places", Some("garbage")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn my_places_is_carved_out_of_the_public_prefix() {
    let app = TestApp::new();
    let alice = app.repo.seed_user("a@x.com", "alice", Role::User);

    let anonymous = app.send(empty_request("GET", "/api/places/my", None)).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let token = app.token_for(&alice);
    let signed_in = app
        .send(empty_request("GET", "/api/places/my", Some(&token)))
        .await;
    assert_eq!(signed_in.status(), StatusCode::OK);
}

#[tokio::test]
async fn me_returns_the_caller() {
    let app = TestApp::new();
    let alice = app.repo.seed_user("a@x.com", "alice", Role::User);
    let token = app.token_for(&alice);

    let response = app.send(empty_request("GET", "/api/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["role"], "USER");
    assert!(body.get("passwordHash").is_none());
}
