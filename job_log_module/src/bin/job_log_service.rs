use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use job_log_module::service::{run_server, BoxError, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            return Err(err.into());
        }
    };
    info!(
        "starting job log service (sheet={}, worksheet={}, history_limit={})",
        config.google_sheet_id, config.google_worksheet_name, config.channel_history_limit
    );

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", err);
        }
        info!("shutdown signal received");
    };
    run_server(config, shutdown).await
}
