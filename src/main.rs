//! CLI entry point: tracing to stderr, config resolution, Ctrl-C
//! cancellation.

use malone::{AssistantApp, AssistantConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("malone=info,ort=warn,hf_hub=warn")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AssistantConfig::default_config_path);
    let config = AssistantConfig::load(&config_path)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            ctrl_c_cancel.cancel();
        }
    });

    AssistantApp::new(config).run(cancel).await.map_err(|e| {
        tracing::error!(error = %e, "assistant exited with error");
        anyhow::anyhow!("assistant failed: {e}")
    })?;

    tracing::info!("assistant shut down cleanly");
    Ok(())
}
