//! Error types shared across the service.

use std::time::Duration;

/// Failure of one outbound Slack API call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code: {status}")]
    UnexpectedStatus { status: u16 },
    #[error("{method} returned error: {error}")]
    Platform { method: &'static str, error: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Failure of one remote command session.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("could not start ssh: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("connection failed (exit {status}): {stderr}")]
    Connection { status: i32, stderr: String },
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("refusing unsafe argument {0:?}")]
    InvalidArgument(String),
}

/// Rejected user input. Displayed to the caller verbatim after "Error: ".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("you must inject from within an assignment channel!")]
    NotAssignmentChannel,
    #[error("channel {0:?} has no class letter")]
    MissingClassLetter(String),
    #[error("channel {0:?} has no assignment number")]
    MissingAssignmentNumber(String),
    #[error("unknown class CS{course}{letter}")]
    UnknownClass { course: String, letter: char },
    #[error("missing class letter")]
    MissingClass,
    #[error("invalid class {0:?}")]
    InvalidClass(String),
    #[error("missing homework count")]
    MissingHomeworkCount,
    #[error("invalid homework count {0:?}")]
    InvalidHomeworkCount(String),
    #[error("invalid account id {0:?}")]
    InvalidIdentifier(String),
}

/// A provisioning step that failed, aborting the rest of its run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("creating channel {name} failed: {source}")]
    CreateChannel {
        name: String,
        #[source]
        source: GatewayError,
    },
    #[error("inviting {short_id} failed: {source}")]
    InviteUser {
        short_id: String,
        #[source]
        source: GatewayError,
    },
    #[error("sending {text:?} failed: {source}")]
    Notify {
        text: String,
        #[source]
        source: GatewayError,
    },
}
