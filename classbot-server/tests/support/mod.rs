//! Test doubles: a recording Slack API and a recording remote executor.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use classbot_server::config::ServiceConfig;
use classbot_server::error::RemoteError;
use classbot_server::remote::{RemoteCommand, RemoteCommandResult, RemoteExecutor};

pub const TOKEN: &str = "verify-me";
pub const TEAM: &str = "T2";
pub const API_TOKEN: &str = "xoxp-test";
pub const TIMEOUT_MS: u64 = 5000;

/// One request seen by the fake platform.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create { name: String },
    Invite { email: String, channels: String },
    Message { text: String },
}

#[derive(Default)]
struct PlatformState {
    calls: Mutex<Vec<Call>>,
    auth_headers: Mutex<Vec<String>>,
    /// Zero-based index of the create call that returns HTTP 500.
    fail_create_at: Option<usize>,
    /// Zero-based index of the invite call that returns HTTP 500.
    fail_invite_at: Option<usize>,
}

impl PlatformState {
    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

pub struct FakePlatform {
    pub addr: SocketAddr,
    state: Arc<PlatformState>,
}

impl FakePlatform {
    pub async fn start() -> Self {
        Self::start_with(None, None).await
    }

    pub async fn start_with(fail_create_at: Option<usize>, fail_invite_at: Option<usize>) -> Self {
        let state = Arc::new(PlatformState {
            fail_create_at,
            fail_invite_at,
            ..Default::default()
        });
        let app = Router::new()
            .route("/api/conversations.create", post(create))
            .route("/api/users.admin.invite", post(invite))
            .route("/hook", post(hook))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn hook_url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.state.auth_headers.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn invites(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Invite { email, channels } => Some((email, channels)),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Message { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `n` response-URL messages have arrived.
    pub async fn wait_for_messages(&self, n: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(TIMEOUT_MS);
        loop {
            let messages = self.messages();
            if messages.len() >= n {
                return messages;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timeout waiting for {n} messages, got {messages:?}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn record_auth(state: &PlatformState, headers: &HeaderMap) {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().unwrap().push(value.to_string());
    }
}

async fn create(
    State(state): State<Arc<PlatformState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record_auth(&state, &headers);
    let index = state.count(|c| matches!(c, Call::Create { .. }));
    let name = body["name"].as_str().unwrap_or_default().to_string();
    state.calls.lock().unwrap().push(Call::Create { name: name.clone() });
    if state.fail_create_at == Some(index) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false })));
    }
    (
        StatusCode::OK,
        Json(json!({ "ok": true, "channel": { "id": format!("C{index:03}"), "name": name } })),
    )
}

async fn invite(
    State(state): State<Arc<PlatformState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record_auth(&state, &headers);
    let index = state.count(|c| matches!(c, Call::Invite { .. }));
    state.calls.lock().unwrap().push(Call::Invite {
        email: body["email"].as_str().unwrap_or_default().to_string(),
        channels: body["channels"].as_str().unwrap_or_default().to_string(),
    });
    if state.fail_invite_at == Some(index) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "ok": false })));
    }
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn hook(State(state): State<Arc<PlatformState>>, Json(body): Json<Value>) -> &'static str {
    state.calls.lock().unwrap().push(Call::Message {
        text: body["text"].as_str().unwrap_or_default().to_string(),
    });
    "ok"
}

/// Records rendered command lines instead of opening a session.
pub struct RecordingExecutor {
    pub lines: Mutex<Vec<String>>,
    output: String,
}

impl RecordingExecutor {
    pub fn new(output: &str) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
            output: output.to_string(),
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn run(&self, command: &RemoteCommand) -> Result<RemoteCommandResult, RemoteError> {
        self.lines.lock().unwrap().push(command.render()?);
        Ok(RemoteCommandResult::from_output(self.output.clone()))
    }

    fn host(&self) -> &str {
        "grader.test"
    }
}

pub fn test_config(platform: &FakePlatform) -> ServiceConfig {
    ServiceConfig {
        verification_token: TOKEN.to_string(),
        team_ids: vec![TEAM.to_string()],
        api_token: API_TOKEN.to_string(),
        api_base_url: platform.api_url(),
        default_channels: vec!["CDEF1".to_string(), "CDEF2".to_string()],
        submissions_dir: "/afs/ir/class/cs106".to_string(),
        api_timeout_secs: 5,
        ..Default::default()
    }
}
