//! Shared state and the HTTP listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::error::GatewayError;
use crate::gateway::ApiGateway;
use crate::grading::GradingController;
use crate::remote::{RemoteExecutor, SshExecutor};
use crate::webhook;
use crate::workflow::ProvisioningEngine;

/// State accessible by all request handlers. Read-only after startup; each
/// request's deferred work owns its own run.
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub gateway: ApiGateway,
    pub provisioning: ProvisioningEngine,
    pub grading: GradingController,
}

impl AppState {
    pub fn new(config: ServiceConfig, executor: Arc<dyn RemoteExecutor>) -> Result<Arc<Self>, GatewayError> {
        let config = Arc::new(config);
        let gateway = ApiGateway::new(&config)?;
        Ok(Arc::new(Self {
            provisioning: ProvisioningEngine::new(gateway.clone(), config.default_channels.clone()),
            grading: GradingController::new(Arc::clone(&config), executor),
            gateway,
            config,
        }))
    }

    /// State backed by the real ssh client.
    pub fn from_config(config: ServiceConfig) -> Result<Arc<Self>, GatewayError> {
        let executor = Arc::new(SshExecutor::from_config(&config));
        Self::new(config, executor)
    }
}

/// Bind the configured address and serve webhooks until the process exits.
pub async fn run(config: ServiceConfig) -> Result<()> {
    let addr = config.bind_addr();
    let state = AppState::from_config(config).context("Failed to build HTTP client")?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "classbot listening");
    axum::serve(listener, webhook::router(state)).await?;
    Ok(())
}
