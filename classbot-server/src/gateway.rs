//! Outbound Slack API calls.
//!
//! Every request to the platform (channel creation, invitations, and
//! response-URL messages) goes through [`ApiGateway::call`], which resolves
//! with the body on HTTP 200 and fails with a [`GatewayError`] otherwise.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::ServiceConfig;
use crate::course::{ChannelRecord, ChannelSpec, InvitationTarget};
use crate::error::GatewayError;

/// One outbound HTTP call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

/// Web API envelope shared by every method.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<CreatedChannel>,
}

#[derive(Debug, Deserialize)]
struct CreatedChannel {
    id: String,
}

#[derive(Clone)]
pub struct ApiGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiGateway {
    pub fn new(config: &ServiceConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    /// Send `request` and return the raw response body.
    pub async fn call(&self, request: ApiRequest) -> Result<String, GatewayError> {
        let mut builder = self.http.request(request.method, &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(GatewayError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }
        Ok(resp.text().await?)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    pub async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelRecord, GatewayError> {
        const METHOD: &str = "conversations.create";
        let request = ApiRequest::post_json(self.method_url(METHOD), json!({ "name": spec.name }))
            .with_bearer(&self.token);
        let body = self.call(request).await?;
        let envelope = decode(&body)?;
        if !envelope.ok {
            return Err(GatewayError::Platform {
                method: METHOD,
                error: envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        let channel = envelope
            .channel
            .ok_or_else(|| GatewayError::Decode("response has no channel".to_string()))?;
        Ok(ChannelRecord {
            spec: spec.clone(),
            remote_id: channel.id,
        })
    }

    /// Invite `target` to the workspace, auto-joining it to `channel_ids`.
    ///
    /// A platform-level refusal (`ok: false`, e.g. `already_invited`) is
    /// logged and not treated as a failure; transport and status errors are.
    pub async fn invite_user(
        &self,
        target: &InvitationTarget,
        channel_ids: &[String],
    ) -> Result<(), GatewayError> {
        const METHOD: &str = "users.admin.invite";
        let request = ApiRequest::post_json(
            self.method_url(METHOD),
            json!({
                "email": target.email,
                "channels": channel_ids.join(","),
            }),
        )
        .with_bearer(&self.token);
        let body = self.call(request).await?;
        match decode(&body) {
            Ok(envelope) if envelope.ok => {}
            Ok(envelope) => tracing::warn!(
                user = %target.short_id,
                error = envelope.error.as_deref().unwrap_or("unknown_error"),
                "Invitation refused by platform"
            ),
            Err(e) => tracing::warn!(user = %target.short_id, "Unreadable invitation response: {e}"),
        }
        Ok(())
    }

    /// Post `{"text": text}` to a response URL.
    pub async fn post_message(&self, url: &str, text: &str) -> Result<(), GatewayError> {
        tracing::debug!(%url, %text, "Posting response message");
        self.call(ApiRequest::post_json(url, json!({ "text": text })))
            .await
            .map(|_| ())
    }
}

fn decode(body: &str) -> Result<Envelope, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
}
