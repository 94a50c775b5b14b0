//! Slack slash-command and interactive-message endpoints.
//!
//! Every handler authenticates the request, answers synchronously with a
//! short acknowledgment, and hands the slow part to a spawned task that
//! reports back through the request's `response_url`.
//!
//! Routes:
//!   POST /setup               — create a section's channels and invite accounts
//!   POST /inject              — run the autograder for one student, or prompt
//!                               to confirm a run for everyone
//!   POST /confirm-inject-all  — button callback for that prompt
//!   GET  /health

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::course::{SetupRequest, is_assignment_channel, validate_identifier};
use crate::error::ValidationError;
use crate::server::AppState;
use crate::workflow::WorkflowRun;

pub const CONFIRM_CALLBACK_ID: &str = "confirm_inject_all";

const INVALID_REQUEST: &str = "Invalid token or team ID";
const INVALID_CALLBACK: &str = "Invalid token, team ID or callback ID";
const DECLINED: &str = "Ok, I won't inject the autograder.";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/setup", post(setup))
        .route("/inject", post(inject))
        .route("/confirm-inject-all", post(confirm_inject_all))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Request shapes ─────────────────────────────────────────────────────

/// Slash-command form body. Missing fields decode as empty so that a
/// malformed request fails authentication instead of extraction.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SlashCommand {
    pub token: String,
    pub team_id: String,
    pub channel_name: String,
    pub text: String,
    pub response_url: String,
}

/// Interactive-message form body; `payload` holds JSON.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InteractiveForm {
    payload: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InteractivePayload {
    pub token: String,
    pub team: Team,
    pub channel: Channel,
    pub actions: Vec<Action>,
    pub callback_id: String,
    pub response_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Channel {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Action {
    pub value: String,
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

async fn setup(
    State(state): State<Arc<AppState>>,
    cmd: Result<Form<SlashCommand>, FormRejection>,
) -> Response {
    let Form(cmd) = match cmd {
        Ok(form) => form,
        Err(e) => return unreadable("setup", e, INVALID_REQUEST),
    };
    if !state.config.authorizes(&cmd.token, &cmd.team_id) {
        tracing::warn!(team = %cmd.team_id, "Rejected setup request: {INVALID_REQUEST}");
        return (StatusCode::BAD_REQUEST, INVALID_REQUEST).into_response();
    }
    tracing::info!(team = %cmd.team_id, text = %cmd.text, "Received setup request");

    let request = match SetupRequest::parse(&cmd.text, &state.config) {
        Ok(request) => request,
        Err(e) => return reply(format!("Error: {e} ({})", SetupRequest::USAGE)),
    };

    let mut run = WorkflowRun::new(request, &state.config.course_code, cmd.response_url);
    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        // Failures are logged and reported to the caller inside run_setup.
        let _ = task_state.provisioning.run_setup(&mut run).await;
    });

    reply("Working on it...")
}

async fn inject(
    State(state): State<Arc<AppState>>,
    cmd: Result<Form<SlashCommand>, FormRejection>,
) -> Response {
    let Form(cmd) = match cmd {
        Ok(form) => form,
        Err(e) => return unreadable("inject", e, INVALID_REQUEST),
    };
    if !state.config.authorizes(&cmd.token, &cmd.team_id) {
        tracing::warn!(team = %cmd.team_id, "Rejected inject request: {INVALID_REQUEST}");
        return (StatusCode::BAD_REQUEST, INVALID_REQUEST).into_response();
    }
    tracing::info!(channel = %cmd.channel_name, "Received inject request");

    if !is_assignment_channel(&cmd.channel_name, &state.config.course_code) {
        return reply(format!("Error: {}", ValidationError::NotAssignmentChannel));
    }

    let student = cmd.text.trim();
    if student.is_empty() {
        return Json(confirm_inject_all_prompt()).into_response();
    }
    if let Err(e) = validate_identifier(student) {
        return reply(format!("Error: {e}"));
    }

    let ack = format!("Injecting autograder for {student}...");
    spawn_injection(state, cmd.channel_name, Some(student.to_string()), cmd.response_url);
    reply(ack)
}

async fn confirm_inject_all(
    State(state): State<Arc<AppState>>,
    form: Result<Form<InteractiveForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(e) => return unreadable("confirmation", e, INVALID_CALLBACK),
    };
    tracing::info!("Received inject all request");
    let payload: InteractivePayload = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Unreadable interactive payload: {e}");
            return (StatusCode::BAD_REQUEST, INVALID_CALLBACK).into_response();
        }
    };

    if !state.config.authorizes(&payload.token, &payload.team.id)
        || payload.callback_id != CONFIRM_CALLBACK_ID
    {
        tracing::warn!(team = %payload.team.id, callback = %payload.callback_id, "Rejected confirmation: {INVALID_CALLBACK}");
        return (StatusCode::BAD_REQUEST, INVALID_CALLBACK).into_response();
    }

    let confirmed = payload.actions.first().is_some_and(|a| a.value == "yes");
    if !confirmed {
        return reply(DECLINED);
    }

    spawn_injection(state, payload.channel.name, None, payload.response_url);
    reply("Injecting autograder for all students...")
}

// ── Helpers ────────────────────────────────────────────────────────────

fn reply(text: impl Into<String>) -> Response {
    (StatusCode::OK, text.into()).into_response()
}

/// A body that is not a form carries no credentials, so it gets the same 400
/// as a failed authentication.
fn unreadable(route: &str, e: FormRejection, message: &'static str) -> Response {
    tracing::warn!(route, status = %e.status(), "Rejected unreadable request: {e}");
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// Run the injection in the background and post its result to `response_url`.
fn spawn_injection(
    state: Arc<AppState>,
    channel_name: String,
    student: Option<String>,
    response_url: String,
) {
    tokio::spawn(async move {
        let output = state.grading.inject(&channel_name, student.as_deref()).await;
        tracing::info!(url = %response_url, "Sending injection result");
        if let Err(e) = state.gateway.post_message(&response_url, &output).await {
            tracing::error!(url = %response_url, "Failed to deliver injection result: {e}");
        }
    });
}

/// Yes/no prompt shown before injecting for every student.
pub fn confirm_inject_all_prompt() -> Value {
    json!({
        "attachments": [{
            "text": "Are you sure you want to inject for all students?",
            "callback_id": CONFIRM_CALLBACK_ID,
            "actions": [
                {
                    "name": "yes",
                    "text": "Yes",
                    "type": "button",
                    "value": "yes",
                    "style": "danger"
                },
                {
                    "name": "no",
                    "text": "No",
                    "type": "button",
                    "value": "no"
                }
            ]
        }]
    })
}
