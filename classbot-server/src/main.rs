use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = classbot_server::config::ServiceConfig::parse();

    // JSON logs in production (CLASSBOT_LOG_JSON=1), human-readable otherwise
    let filter = EnvFilter::from_default_env().add_directive("classbot_server=info".parse()?);
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    if config.verification_token.is_empty() {
        tracing::warn!("VER_TOKEN not set; every request will be rejected");
    }
    if config.team_ids.is_empty() {
        tracing::warn!("TEAM_IDS not set; every request will be rejected");
    }
    if config.api_token.is_empty() {
        tracing::warn!("TOKEN not set; channel setup will fail");
    }
    tracing::info!(
        host = %config.ssh_host,
        classes = ?config.grader_classes,
        "Grading host configured"
    );

    classbot_server::server::run(config).await
}
