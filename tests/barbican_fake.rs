//! Barbican backend tests against a local fake Keystone + Barbican server.
//!
//! The fake speaks just enough of both APIs: password-method token issue
//! with a service catalog, and the secrets list/create/payload/delete calls.

#![cfg(feature = "barbican")]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use barbican_sdb::{BackendType, Profile, Profiles, Sdb, SdbError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const TOKEN: &str = "gAAAAAB-fake-keystone-token";
const PASSWORD: &str = "hunter2";

struct FakeSecret {
    id: String,
    name: String,
    payload: Vec<u8>,
    content_type: String,
    created: String,
}

struct FakeState {
    base_url: String,
    secrets: Mutex<Vec<FakeSecret>>,
    auth_bodies: Mutex<Vec<Value>>,
    creates: AtomicUsize,
    next_id: AtomicUsize,
    /// Bumped to revoke every token issued so far.
    generation: AtomicUsize,
    /// Status returned by the secrets listing instead of a page.
    list_status: Mutex<Option<StatusCode>>,
}

impl FakeState {
    fn seed(&self, name: &str, payload: &str, created: &str) {
        self.seed_typed(name, payload.as_bytes(), "text/plain", created);
    }

    fn seed_typed(&self, name: &str, payload: &[u8], content_type: &str, created: &str) {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.secrets.lock().unwrap().push(FakeSecret {
            id,
            name: name.to_string(),
            payload: payload.to_vec(),
            content_type: content_type.to_string(),
            created: created.to_string(),
        });
    }

    fn token(&self) -> String {
        format!("{}-{}", TOKEN, self.generation.load(Ordering::SeqCst))
    }

    fn revoke_tokens(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn fail_listing_with(&self, status: StatusCode) {
        *self.list_status.lock().unwrap() = Some(status);
    }

    fn secret_ref(&self, id: &str) -> String {
        format!("{}/v1/secrets/{}", self.base_url, id)
    }

    fn auth_count(&self) -> usize {
        self.auth_bodies.lock().unwrap().len()
    }

    fn count(&self, name: &str) -> usize {
        self.secrets
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .count()
    }
}

fn authorized(state: &FakeState, headers: &HeaderMap) -> bool {
    headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        == Some(state.token().as_str())
}

async fn issue_token(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    let password = body["auth"]["identity"]["password"]["user"]["password"].clone();
    state.auth_bodies.lock().unwrap().push(body);

    if password != PASSWORD {
        return (StatusCode::UNAUTHORIZED, "The request you have made requires authentication.")
            .into_response();
    }

    let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1))
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string();

    let body = json!({
        "token": {
            "expires_at": expires_at,
            "catalog": [
                {"type": "identity", "name": "keystone", "endpoints": [
                    {"interface": "public", "region": "GRA", "url": format!("{}/v3", state.base_url)}
                ]},
                {"type": "key-manager", "name": "barbican", "endpoints": [
                    {"interface": "internal", "region": "GRA", "url": "http://10.255.255.1:9311"},
                    {"interface": "public", "region": "GRA", "url": state.base_url.clone()}
                ]}
            ]
        }
    });

    (StatusCode::CREATED, [("X-Subject-Token", state.token())], Json(body)).into_response()
}

async fn list_secrets(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(status) = *state.list_status.lock().unwrap() {
        return (status, "listing unavailable").into_response();
    }
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let limit: usize = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
    let offset: usize = query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);

    let secrets = state.secrets.lock().unwrap();
    let matching: Vec<&FakeSecret> = secrets
        .iter()
        .filter(|s| query.get("name").map_or(true, |n| &s.name == n))
        .collect();

    let page: Vec<Value> = matching
        .iter()
        .skip(offset)
        .take(limit)
        .map(|s| {
            json!({
                "secret_ref": state.secret_ref(&s.id),
                "name": s.name,
                "status": "ACTIVE",
                "created": s.created,
                "content_types": {"default": s.content_type}
            })
        })
        .collect();

    let mut body = json!({"secrets": page, "total": matching.len()});
    if offset + limit < matching.len() {
        body["next"] = json!(format!(
            "{}/v1/secrets?limit={}&offset={}",
            state.base_url,
            limit,
            offset + limit
        ));
    }

    Json(body).into_response()
}

async fn create_secret(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if body["payload_content_type"] != "text/plain" {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let n = state.next_id.fetch_add(1, Ordering::SeqCst);
    let id = format!("created-{}", n);
    state.creates.fetch_add(1, Ordering::SeqCst);
    state.secrets.lock().unwrap().push(FakeSecret {
        id: id.clone(),
        name: body["name"].as_str().unwrap_or_default().to_string(),
        payload: body["payload"].as_str().unwrap_or_default().as_bytes().to_vec(),
        content_type: "text/plain".to_string(),
        created: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    });

    (
        StatusCode::CREATED,
        Json(json!({"secret_ref": state.secret_ref(&id)})),
    )
        .into_response()
}

async fn secret_payload(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let secrets = state.secrets.lock().unwrap();
    match secrets.iter().find(|s| s.id == id) {
        Some(secret) => (
            [("content-type", secret.content_type.clone())],
            secret.payload.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_secret(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut secrets = state.secrets.lock().unwrap();
    match secrets.iter().position(|s| s.id == id) {
        Some(position) => {
            secrets.remove(position);
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Starts the fake server and returns its state.
async fn start_fake() -> Arc<FakeState> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let state = Arc::new(FakeState {
        base_url: format!("http://127.0.0.1:{}", port),
        secrets: Mutex::new(Vec::new()),
        auth_bodies: Mutex::new(Vec::new()),
        creates: AtomicUsize::new(0),
        next_id: AtomicUsize::new(0),
        generation: AtomicUsize::new(0),
        list_status: Mutex::new(None),
    });

    let router = Router::new()
        .route("/v3/auth/tokens", post(issue_token))
        .route("/v1/secrets", get(list_secrets).post(create_secret))
        .route("/v1/secrets/:id", axum::routing::delete(delete_secret))
        .route("/v1/secrets/:id/payload", get(secret_payload))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    state
}

fn profile(state: &FakeState) -> Profile {
    Profile::new(BackendType::Barbican)
        .with_option("auth_url", format!("{}/v3", state.base_url))
        .with_option("username", "user-xxxxxxxxxxxx")
        .with_option("user_domain_name", "Default")
        .with_option("password", PASSWORD)
        .with_option("project_name", "project-1")
        .with_option("project_domain_name", "Default")
        .with_option("region_name", "GRA")
}

fn sdb_for(profile: Profile) -> Sdb {
    let mut profiles = Profiles::new();
    profiles.insert("pwd", profile);
    Sdb::new(profiles)
}

#[tokio::test]
async fn test_set_get_delete() {
    let state = start_fake().await;
    let sdb = sdb_for(profile(&state));

    assert_eq!(sdb.get("sdb://pwd/user1").await.unwrap(), None);

    let stored = sdb.set("sdb://pwd/user1", "$5$0DZt7BTf$gjNPsFCJ").await.unwrap();
    assert_eq!(stored.as_deref(), Some("$5$0DZt7BTf$gjNPsFCJ"));

    let value = sdb.get("sdb://pwd/user1").await.unwrap();
    assert_eq!(value.as_deref(), Some("$5$0DZt7BTf$gjNPsFCJ"));

    assert!(sdb.delete("sdb://pwd/user1").await.unwrap());
    assert!(!sdb.delete("sdb://pwd/user1").await.unwrap());
    assert_eq!(state.count("user1"), 0);

    // One token served every call.
    assert_eq!(state.auth_count(), 1);
}

#[tokio::test]
async fn test_get_returns_latest_version() {
    let state = start_fake().await;
    state.seed("user1", "newest", "2024-06-01T12:00:00.000001");
    state.seed("user1", "oldest", "2023-01-01T00:00:00");
    state.seed("user1", "middle", "2024-06-01T12:00:00");
    state.seed("user2", "unrelated", "2025-01-01T00:00:00");

    let sdb = sdb_for(profile(&state));
    let value = sdb.get("sdb://pwd/user1").await.unwrap();
    assert_eq!(value.as_deref(), Some("newest"));

    assert!(sdb.delete("sdb://pwd/user1").await.unwrap());
    let value = sdb.get("sdb://pwd/user1").await.unwrap();
    assert_eq!(value.as_deref(), Some("middle"));
}

#[tokio::test]
async fn test_set_refuses_taken_key() {
    let state = start_fake().await;
    state.seed("user1", "original", "2024-01-01T00:00:00");

    let sdb = sdb_for(profile(&state));
    let result = sdb.set("sdb://pwd/user1", "replacement").await.unwrap();

    assert!(result.is_none());
    assert_eq!(state.creates.load(Ordering::SeqCst), 0);
    assert_eq!(
        sdb.get("sdb://pwd/user1").await.unwrap().as_deref(),
        Some("original")
    );
}

#[tokio::test]
async fn test_listing_follows_pages() {
    let state = start_fake().await;
    for i in 0..130 {
        state.seed(
            "bulk",
            &format!("v{}", i),
            &format!("2024-01-01T00:{:02}:{:02}", i / 60, i % 60),
        );
    }

    let sdb = sdb_for(profile(&state));
    let value = sdb.get("sdb://pwd/bulk").await.unwrap();
    assert_eq!(value.as_deref(), Some("v129"));
}

#[tokio::test]
async fn test_auth_request_shape() {
    let state = start_fake().await;
    let sdb = sdb_for(profile(&state));

    sdb.get("sdb://pwd/user1").await.unwrap();

    let bodies = state.auth_bodies.lock().unwrap();
    let auth = &bodies[0]["auth"];
    assert_eq!(auth["identity"]["methods"], json!(["password"]));
    assert_eq!(auth["identity"]["password"]["user"]["name"], "user-xxxxxxxxxxxx");
    assert_eq!(auth["identity"]["password"]["user"]["domain"]["name"], "Default");
    assert_eq!(auth["scope"]["project"]["name"], "project-1");
    assert_eq!(auth["scope"]["project"]["domain"]["name"], "Default");
}

#[tokio::test]
async fn test_wrong_password_is_reported() {
    let state = start_fake().await;
    let sdb = sdb_for(profile(&state).with_option("password", "wrong"));

    let err = sdb.get("sdb://pwd/user1").await.unwrap_err();
    assert!(err.to_string().contains("not authenticated"), "{}", err);
}

#[tokio::test]
async fn test_missing_profile_key() {
    let state = start_fake().await;
    let mut incomplete = profile(&state);
    incomplete.options.remove("user_domain_name");
    let sdb = sdb_for(incomplete);

    let err = sdb.get("sdb://pwd/user1").await.unwrap_err();
    assert!(matches!(err, SdbError::MissingProfileKey(_)));
    assert_eq!(err.to_string(), "No key user_domain_name in the profile");
    assert_eq!(state.auth_count(), 0);
}

#[tokio::test]
async fn test_unknown_region_has_no_endpoint() {
    let state = start_fake().await;
    let sdb = sdb_for(profile(&state).with_option("region_name", "BHS"));

    let err = sdb.get("sdb://pwd/user1").await.unwrap_err();
    assert!(matches!(err, SdbError::NotFound(_)), "{}", err);
}

#[tokio::test]
async fn test_endpoint_override_skips_catalog() {
    let state = start_fake().await;
    state.seed("user1", "value", "2024-01-01T00:00:00");

    let sdb = sdb_for(
        profile(&state)
            .with_option("region_name", "BHS")
            .with_option("endpoint", format!("{}/v1/", state.base_url)),
    );

    assert_eq!(
        sdb.get("sdb://pwd/user1").await.unwrap().as_deref(),
        Some("value")
    );
}

#[tokio::test]
async fn test_token_cache_is_shared_between_instances() {
    let state = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let cached = profile(&state).with_session_file(
        dir.path()
            .join("token.json")
            .to_string_lossy()
            .into_owned(),
    );

    let first = sdb_for(cached.clone());
    first.set("sdb://pwd/user1", "value").await.unwrap();
    first.close().await.unwrap();

    let second = sdb_for(cached);
    assert_eq!(
        second.get("sdb://pwd/user1").await.unwrap().as_deref(),
        Some("value")
    );

    assert_eq!(state.auth_count(), 1);
}

fn cached_profile(state: &FakeState, dir: &std::path::Path) -> (Profile, std::path::PathBuf) {
    let path = dir.join("token.json");
    let profile = profile(state).with_session_file(path.to_string_lossy().into_owned());
    (profile, path)
}

#[tokio::test]
async fn test_revoked_token_is_replaced() {
    let state = start_fake().await;
    state.seed("user1", "value", "2024-01-01T00:00:00");
    let sdb = sdb_for(profile(&state));

    assert_eq!(sdb.get("sdb://pwd/user1").await.unwrap().as_deref(), Some("value"));
    state.revoke_tokens();

    assert_eq!(sdb.get("sdb://pwd/user1").await.unwrap().as_deref(), Some("value"));
    assert_eq!(sdb.get("sdb://pwd/user1").await.unwrap().as_deref(), Some("value"));
    assert_eq!(state.auth_count(), 2);

    state.revoke_tokens();
    assert!(sdb.set("sdb://pwd/user2", "other").await.unwrap().is_some());
    state.revoke_tokens();
    assert!(sdb.delete("sdb://pwd/user2").await.unwrap());
    assert_eq!(state.auth_count(), 4);
}

#[tokio::test]
async fn test_revoked_cached_token_is_replaced() {
    let state = start_fake().await;
    state.seed("user1", "value", "2024-01-01T00:00:00");
    let dir = tempfile::tempdir().unwrap();
    let (cached, path) = cached_profile(&state, dir.path());

    let first = sdb_for(cached.clone());
    first.get("sdb://pwd/user1").await.unwrap();
    first.close().await.unwrap();
    state.revoke_tokens();

    let second = sdb_for(cached);
    assert_eq!(second.get("sdb://pwd/user1").await.unwrap().as_deref(), Some("value"));
    assert_eq!(state.auth_count(), 2);

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains(&state.token()));
}

#[tokio::test]
async fn test_unauthorized_clears_token_cache() {
    let state = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (cached, path) = cached_profile(&state, dir.path());
    let sdb = sdb_for(cached);

    sdb.get("sdb://pwd/user1").await.unwrap();
    assert!(path.exists());

    state.fail_listing_with(StatusCode::UNAUTHORIZED);
    let err = sdb.get("sdb://pwd/user1").await.unwrap_err();

    assert!(err.is_auth_failure(), "{}", err);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_cache_is_not_shared_across_projects() {
    let state = start_fake().await;
    let dir = tempfile::tempdir().unwrap();
    let (cached, _) = cached_profile(&state, dir.path());

    let first = sdb_for(cached.clone());
    first.get("sdb://pwd/user1").await.unwrap();
    first.close().await.unwrap();

    let other_project = sdb_for(cached.with_option("project_name", "project-2"));
    other_project.get("sdb://pwd/user1").await.unwrap();

    assert_eq!(state.auth_count(), 2);
    let bodies = state.auth_bodies.lock().unwrap();
    assert_eq!(bodies[1]["auth"]["scope"]["project"]["name"], "project-2");
}

#[tokio::test]
async fn test_forbidden_is_permission_denied() {
    let state = start_fake().await;
    state.fail_listing_with(StatusCode::FORBIDDEN);
    let sdb = sdb_for(profile(&state));

    match sdb.get("sdb://pwd/user1").await.unwrap_err() {
        SdbError::BackendOperation { operation, source, .. } => {
            assert_eq!(operation, "list");
            assert!(matches!(*source, SdbError::PermissionDenied(_)), "{}", source);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_reported_with_status() {
    let state = start_fake().await;
    state.fail_listing_with(StatusCode::INTERNAL_SERVER_ERROR);
    let sdb = sdb_for(profile(&state));

    match sdb.set("sdb://pwd/user1", "value").await.unwrap_err() {
        SdbError::BackendOperation { source, .. } => match *source {
            SdbError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "listing unavailable");
            }
            other => panic!("unexpected source: {}", other),
        },
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(state.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_binary_payload_is_base64() {
    let state = start_fake().await;
    state.seed_typed(
        "blob",
        &[0x00, 0x9f, 0x92, 0x96],
        "application/octet-stream",
        "2024-01-01T00:00:00",
    );
    let sdb = sdb_for(profile(&state));

    assert_eq!(
        sdb.get("sdb://pwd/blob").await.unwrap().as_deref(),
        Some("AJ+Slg==")
    );
}
