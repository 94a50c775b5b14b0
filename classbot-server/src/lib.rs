//! classbot: Slack webhooks for running a course's workspace.
//!
//! - `/setup` provisions a section's channels and invites its staff
//! - `/inject` runs the autograder on the grading host for one student or,
//!   after a confirmation round-trip, for the whole assignment

pub mod config;
pub mod course;
pub mod error;
pub mod gateway;
pub mod grading;
pub mod remote;
pub mod server;
pub mod webhook;
pub mod workflow;
