//! In-process mock of the Webex REST API
//!
//! Serves the token endpoint, rooms, messages and webhooks on a random local
//! port. Every request is counted so tests can assert exactly how many calls
//! and refresh exchanges happened. Only one access token is accepted at a
//! time; a successful refresh replaces it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;

/// Shared state behind the mock endpoints.
#[derive(Default)]
pub struct MockState {
    valid_token: Mutex<String>,
    /// Access token issued by the next successful refresh; `None` rejects refreshes
    refresh_grant: Mutex<Option<String>>,
    reject_all: AtomicBool,
    /// Token endpoint answers refreshes with 500
    refresh_outage: AtomicBool,
    /// List endpoints advertise a further page
    more_pages: AtomicBool,
    rooms: Mutex<Vec<serde_json::Value>>,
    messages: Mutex<HashMap<String, serde_json::Value>>,
    webhooks: Mutex<Vec<serde_json::Value>>,
    pub api_calls: AtomicUsize,
    pub grant_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
}

/// Handle to a running mock provider.
pub struct MockProvider {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockProvider {
    /// Start a mock accepting `valid_token` as the only access token.
    pub async fn start(valid_token: &str) -> Self {
        let state = Arc::new(MockState::default());
        *lock(&state.valid_token) = valid_token.to_owned();

        let app = Router::new()
            .route("/access_token", post(token_endpoint))
            .route("/rooms", get(list_rooms))
            .route("/rooms/{id}", get(room_details))
            .route("/messages/{id}", get(message_details))
            .route("/webhooks", get(list_webhooks).post(create_webhook))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let addr = listener.local_addr().expect("mock provider address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Make the next refresh succeed and issue `access_token`.
    pub fn grant_refresh(&self, access_token: &str) {
        *lock(&self.state.refresh_grant) = Some(access_token.to_owned());
    }

    /// Reject every API call with 401, even after a refresh.
    pub fn reject_all(&self) {
        self.state.reject_all.store(true, Ordering::SeqCst);
    }

    /// Make the token endpoint fail refreshes with a server error.
    pub fn fail_refreshes(&self) {
        self.state.refresh_outage.store(true, Ordering::SeqCst);
    }

    /// Add a `Link: rel="next"` header to list responses.
    pub fn advertise_next_page(&self) {
        self.state.more_pages.store(true, Ordering::SeqCst);
    }

    pub fn add_room(&self, id: &str, title: &str) {
        lock(&self.state.rooms).push(serde_json::json!({"id": id, "title": title}));
    }

    pub fn add_message(&self, id: &str, room_id: &str, text: &str, sender: &str) {
        lock(&self.state.messages).insert(
            id.to_owned(),
            serde_json::json!({
                "id": id,
                "roomId": room_id,
                "text": text,
                "personEmail": sender,
                "created": "2022-06-01T18:40:33.209Z",
            }),
        );
    }

    pub fn api_calls(&self) -> usize {
        self.state.api_calls.load(Ordering::SeqCst)
    }

    pub fn grant_calls(&self) -> usize {
        self.state.grant_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn webhook_count(&self) -> usize {
        lock(&self.state.webhooks).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Count the call and check the bearer token. `Some(response)` short-circuits.
fn authorize(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    state.api_calls.fetch_add(1, Ordering::SeqCst);
    let expected = format!("Bearer {}", lock(&state.valid_token));
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.reject_all.load(Ordering::SeqCst) || presented != expected {
        return Some(
            (
                StatusCode::UNAUTHORIZED,
                axum::Json(serde_json::json!({"message": "The request requires a valid access token."})),
            )
                .into_response(),
        );
    }
    None
}

async fn token_endpoint(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if form.get("grant_type").map(String::as_str) == Some("authorization_code") {
        state.grant_calls.fetch_add(1, Ordering::SeqCst);
        let code = form.get("code").cloned().unwrap_or_default();
        let access = format!("at_{code}");
        *lock(&state.valid_token) = access.clone();
        return axum::Json(serde_json::json!({
            "access_token": access,
            "refresh_token": format!("rt_{code}"),
            "expires_in": 1_209_600,
        }))
        .into_response();
    }

    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(refresh) = form.get("refresh_token") {
        lock(&state.refresh_tokens_seen).push(refresh.clone());
    }
    if state.refresh_outage.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "token service unavailable").into_response();
    }
    let granted = lock(&state.refresh_grant).take();
    match granted {
        Some(access) => {
            *lock(&state.valid_token) = access.clone();
            axum::Json(serde_json::json!({
                "access_token": access,
                "refresh_token": "rt_rotated_but_ignored",
                "expires_in": 1_209_600,
            }))
            .into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({"message": "invalid_grant"})),
        )
            .into_response(),
    }
}

fn list_response(state: &MockState, path: &str, items: Vec<serde_json::Value>) -> Response {
    let body = axum::Json(serde_json::json!({ "items": items }));
    if !state.more_pages.load(Ordering::SeqCst) {
        return body.into_response();
    }
    let link = format!("<https://webexapis.com/v1/{path}?cursor=next>; rel=\"next\"");
    ([(axum::http::header::LINK, link)], body).into_response()
}

async fn list_rooms(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(rejected) = authorize(&state, &headers) {
        return rejected;
    }
    let items = lock(&state.rooms).clone();
    list_response(&state, "rooms", items)
}

async fn room_details(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Some(rejected) = authorize(&state, &headers) {
        return rejected;
    }
    if id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response();
    }
    if id == "slow" {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
    let room = lock(&state.rooms).iter().find(|r| r["id"] == id.as_str()).cloned();
    match room {
        Some(room) => axum::Json(room).into_response(),
        None => (StatusCode::NOT_FOUND, "room not found").into_response(),
    }
}

async fn message_details(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Some(rejected) = authorize(&state, &headers) {
        return rejected;
    }
    let message = lock(&state.messages).get(&id).cloned();
    match message {
        Some(message) => axum::Json(message).into_response(),
        None => (StatusCode::NOT_FOUND, "message not found").into_response(),
    }
}

async fn list_webhooks(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(rejected) = authorize(&state, &headers) {
        return rejected;
    }
    let items = lock(&state.webhooks).clone();
    list_response(&state, "webhooks", items)
}

async fn create_webhook(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> Response {
    if let Some(rejected) = authorize(&state, &headers) {
        return rejected;
    }
    let mut hooks = lock(&state.webhooks);
    let duplicate = hooks.iter().any(|h| {
        h["filter"] == body["filter"] && h["targetUrl"] == body["targetUrl"] && h["name"] == body["name"]
    });
    if duplicate {
        return (
            StatusCode::CONFLICT,
            axum::Json(serde_json::json!({"message": "Webhook already exists"})),
        )
            .into_response();
    }
    let mut hook = body;
    hook["id"] = format!("hook-{}", hooks.len() + 1).into();
    hook["status"] = "active".into();
    if let Some(obj) = hook.as_object_mut() {
        obj.remove("secret");
    }
    hooks.push(hook.clone());
    axum::Json(hook).into_response()
}
