//! Channel provisioning for a course section.
//!
//! A run creates every channel of the section one at a time, reports
//! progress to the caller's response URL, then invites each account to all
//! created channels plus the configured default channels. Steps run strictly
//! in sequence: exactly one platform call is outstanding at any moment, and
//! the first failure ends the run. Channels created before a failure are left
//! in place.

use crate::course::{ChannelRecord, ChannelSpec, InvitationTarget, SetupRequest};
use crate::error::WorkflowError;
use crate::gateway::ApiGateway;

pub const CREATED_CHANNELS: &str = "Created channels.";
pub const INVITED_USERS: &str = "Invited users.";
pub const DONE: &str = "Done!";

/// State of one provisioning run, private to the request that started it.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    specs: Vec<ChannelSpec>,
    /// One entry per successful creation, in creation order.
    records: Vec<ChannelRecord>,
    invitees: Vec<InvitationTarget>,
    callback_url: String,
}

impl WorkflowRun {
    pub fn new(request: SetupRequest, course_code: &str, callback_url: impl Into<String>) -> Self {
        Self {
            specs: request.class.channel_specs(course_code),
            records: Vec::new(),
            invitees: request.invitees,
            callback_url: callback_url.into(),
        }
    }

    pub fn specs(&self) -> &[ChannelSpec] {
        &self.specs
    }

    pub fn records(&self) -> &[ChannelRecord] {
        &self.records
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowReport {
    pub channels: Vec<ChannelRecord>,
    pub invited: Vec<String>,
}

pub struct ProvisioningEngine {
    gateway: ApiGateway,
    default_channels: Vec<String>,
}

impl ProvisioningEngine {
    pub fn new(gateway: ApiGateway, default_channels: Vec<String>) -> Self {
        Self {
            gateway,
            default_channels,
        }
    }

    /// Execute `run` to completion or first failure.
    ///
    /// On failure the error is logged and a best-effort `Setup failed: ...`
    /// message goes to the callback URL; nothing is retried or rolled back.
    pub async fn run_setup(&self, run: &mut WorkflowRun) -> Result<WorkflowReport, WorkflowError> {
        tracing::info!(
            channels = run.specs.len(),
            invitees = run.invitees.len(),
            "Starting setup"
        );
        match self.execute(run).await {
            Ok(report) => {
                tracing::info!(
                    channels = report.channels.len(),
                    invited = report.invited.len(),
                    "Setup finished"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(created = run.records.len(), "Setup aborted: {e}");
                let notice = format!("Setup failed: {e}");
                if let Err(notify) = self.gateway.post_message(&run.callback_url, &notice).await {
                    tracing::warn!("Could not report setup failure: {notify}");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut WorkflowRun) -> Result<WorkflowReport, WorkflowError> {
        for spec in &run.specs {
            tracing::debug!(channel = %spec.name, "Creating channel");
            let record = self
                .gateway
                .create_channel(spec)
                .await
                .map_err(|source| WorkflowError::CreateChannel {
                    name: spec.name.clone(),
                    source,
                })?;
            tracing::info!(channel = %spec.name, id = %record.remote_id, "Created channel");
            run.records.push(record);
        }
        self.notify(&run.callback_url, CREATED_CHANNELS).await?;

        let channel_ids: Vec<String> = run
            .records
            .iter()
            .map(|r| r.remote_id.clone())
            .chain(self.default_channels.iter().cloned())
            .collect();

        let mut invited = Vec::with_capacity(run.invitees.len());
        for target in &run.invitees {
            tracing::info!(user = %target.short_id, channels = ?channel_ids, "Inviting user");
            self.gateway
                .invite_user(target, &channel_ids)
                .await
                .map_err(|source| WorkflowError::InviteUser {
                    short_id: target.short_id.clone(),
                    source,
                })?;
            invited.push(target.short_id.clone());
        }

        self.notify(&run.callback_url, INVITED_USERS).await?;
        self.notify(&run.callback_url, DONE).await?;

        Ok(WorkflowReport {
            channels: run.records.clone(),
            invited,
        })
    }

    async fn notify(&self, url: &str, text: &str) -> Result<(), WorkflowError> {
        self.gateway
            .post_message(url, text)
            .await
            .map_err(|source| WorkflowError::Notify {
                text: text.to_string(),
                source,
            })
    }
}
