// Shared helpers for integration tests
//
// `FakeMemd` is a small stateful stand-in for the MEMD API served by axum on
// a background runtime, used where a test needs the server's view of a
// member to change between calls (terminations followed by reloads).
// Stateless request matching uses httpmock instead.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use memd_client::{ApiConfig, MemdClient};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread;

pub const MEMBER_ID: &str = "11111111-1111-4111-8111-111111111111";

pub fn config_for(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        username: "user".to_string(),
        password: "pass".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        timeout_seconds: Some(5),
    }
}

pub fn client_for(base_url: &str) -> MemdClient {
    MemdClient::new(&config_for(base_url)).unwrap()
}

/// A schema-valid create payload
pub fn member_payload(external_id: &str, plancode: &str, benefitstart: &str) -> Value {
    json!({
        "externalID": external_id,
        "name": {"First": "Ada", "Last": "Lovelace"},
        "email": "alovelace@localhost.com",
        "phone": "5555555555",
        "dob": "1815-12-10",
        "gender": "F",
        "address": {
            "address1": "12 St James's Square",
            "address2": null,
            "city": "London",
            "state": "LN",
            "zipCode": "00000"
        },
        "rxDiscounts": {},
        "termsAgreed": true,
        "preferredLanguage": "NP",
        "plancode": plancode,
        "relationship": "18",
        "misc3": "",
        "benefitstart": benefitstart,
        "benefitend": ""
    })
}

/// Server-side member document with the given policies
pub fn member_doc(external_id: &str, policies: &[(&str, bool)]) -> Value {
    let policies: Vec<Value> = policies
        .iter()
        .map(|(plancode, isactive)| policy_row(plancode, *isactive, "2024-01-01T00:00:00"))
        .collect();
    json!({
        "externalID": external_id,
        "name": {"first": "Ada", "middle": null, "last": "Lovelace"},
        "email": "alovelace@localhost.com",
        "phone": "5555555555",
        "dob": "1815-12-10",
        "gender": "F",
        "address": {
            "address1": "12 St James's Square",
            "address2": null,
            "city": "London",
            "state": "LN",
            "zipCode": "00000"
        },
        "misc3": "",
        "policies": policies
    })
}

fn policy_row(plancode: &str, isactive: bool, benefitstart: &str) -> Value {
    json!({
        "plancode": plancode,
        "isactive": isactive,
        "benefitstart": benefitstart,
        "benefitend": null
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Value,
}

#[derive(Debug, Default)]
struct FakeState {
    members: HashMap<String, Value>,
    failing_plancodes: HashSet<String>,
    failing_reads: bool,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<FakeState>>;
type Reply = (StatusCode, Json<Value>);

/// In-process fake MEMD server backed by member documents
#[derive(Clone)]
pub struct FakeMemd {
    base_url: String,
    state: SharedState,
}

impl FakeMemd {
    pub fn start() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = SharedState::default();

        let app = router(Arc::clone(&state));
        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self { base_url, state }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> MemdClient {
        client_for(&self.base_url)
    }

    pub fn insert_member(&self, doc: Value) {
        let external_id = doc["externalID"].as_str().unwrap().to_string();
        self.state.lock().unwrap().members.insert(external_id, doc);
    }

    pub fn member(&self, external_id: &str) -> Option<Value> {
        self.state.lock().unwrap().members.get(external_id).cloned()
    }

    /// Make policy creation for `plancode` answer 500
    pub fn fail_policy_create(&self, plancode: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_plancodes
            .insert(plancode.to_string());
    }

    /// Make every member GET answer 500 from now on
    pub fn fail_member_reads(&self) {
        self.state.lock().unwrap().failing_reads = true;
    }

    /// Requests received so far, token requests excluded
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.path != "/v2/token")
            .cloned()
            .collect()
    }

    pub fn requests_matching(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Number of requests that could change server state
    pub fn write_count(&self) -> usize {
        self.requests().iter().filter(|r| r.method != "GET").count()
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/v2/token", post(token))
        .route("/v1/partnermember", post(create_member))
        .route("/v1/partnermember/{id}", get(get_member).put(put_member))
        .route("/v1/partnermember/{id}/policy/", post(create_policy))
        .route("/v1/member/{id}/policy/{plancode}", post(terminate_policy))
        .fallback(unmatched)
        .with_state(state)
}

/// Record the request and decode its body; non-JSON bodies are kept as text
fn record(state: &SharedState, method: &Method, uri: &Uri, body: &Bytes) -> Value {
    let body = serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).to_string()));
    state.lock().unwrap().requests.push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        body: body.clone(),
    });
    body
}

fn not_found() -> Reply {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found"})))
}

async fn token(State(state): State<SharedState>, method: Method, uri: Uri, body: Bytes) -> Reply {
    record(&state, &method, &uri, &body);
    (
        StatusCode::OK,
        Json(json!({"access_token": "tok", "token_type": "bearer", "expires_in": 3600})),
    )
}

async fn get_member(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Reply {
    record(&state, &method, &uri, &body);
    let state = state.lock().unwrap();
    if state.failing_reads {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "read failed"})),
        );
    }
    match state.members.get(&id) {
        Some(doc) => (StatusCode::OK, Json(doc.clone())),
        None => not_found(),
    }
}

async fn create_member(State(state): State<SharedState>, method: Method, uri: Uri, body: Bytes) -> Reply {
    let body = record(&state, &method, &uri, &body);
    let mut doc = body.as_object().cloned().unwrap_or_default();
    let plancode = doc.remove("plancode").unwrap_or(Value::Null);
    let benefitstart = doc
        .get("benefitstart")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    doc.insert(
        "policies".to_string(),
        json!([policy_row(plancode.as_str().unwrap_or_default(), true, &benefitstart)]),
    );
    let doc = Value::Object(doc);
    let id = doc["externalID"].as_str().unwrap_or_default().to_string();
    state.lock().unwrap().members.insert(id, doc.clone());
    (StatusCode::OK, Json(doc))
}

async fn put_member(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Reply {
    let body = record(&state, &method, &uri, &body);
    let mut state = state.lock().unwrap();
    match state.members.get_mut(&id) {
        Some(Value::Object(doc)) => {
            if let Value::Object(fields) = body {
                doc.extend(fields);
            }
            (StatusCode::OK, Json(Value::Object(doc.clone())))
        }
        _ => not_found(),
    }
}

async fn create_policy(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Reply {
    let body = record(&state, &method, &uri, &body);
    let plancode = body["plancode"].as_str().unwrap_or_default().to_string();
    let benefitstart = body["benefitstart"].as_str().unwrap_or_default().to_string();

    let mut state = state.lock().unwrap();
    if state.failing_plancodes.contains(&plancode) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "policy create failed"})),
        );
    }
    match state.members.get_mut(&id) {
        Some(doc) => {
            let row = policy_row(&plancode, true, &benefitstart);
            if let Some(policies) = doc["policies"].as_array_mut() {
                policies.push(row.clone());
            }
            (StatusCode::OK, Json(row))
        }
        None => not_found(),
    }
}

async fn terminate_policy(
    State(state): State<SharedState>,
    Path((id, plancode)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Reply {
    let body = record(&state, &method, &uri, &body);
    let termdate = body["termdate"].clone();

    let mut state = state.lock().unwrap();
    let Some(doc) = state.members.get_mut(&id) else {
        return not_found();
    };
    let mut updated = Vec::new();
    if let Some(policies) = doc["policies"].as_array_mut() {
        for policy in policies.iter_mut() {
            if policy["plancode"] == plancode.as_str() && policy["isactive"] == true {
                policy["isactive"] = json!(false);
                policy["benefitend"] = termdate.clone();
                updated.push(policy.clone());
            }
        }
    }
    if updated.is_empty() {
        not_found()
    } else {
        (StatusCode::OK, Json(Value::Array(updated)))
    }
}

async fn unmatched(State(state): State<SharedState>, method: Method, uri: Uri, body: Bytes) -> Reply {
    record(&state, &method, &uri, &body);
    not_found()
}
