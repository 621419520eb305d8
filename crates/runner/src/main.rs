use anyhow::Context;
use candela_runner::telemetry::init_tracing;
use candela_runner::{Feed, FeedDeps, load_from_env};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let config = load_from_env().context("failed to load feed configuration")?;
    tracing::info!(
        exchanges = config.enabled_exchanges().len(),
        "Starting candle feed..."
    );

    let mut feed = Feed::start(&config, FeedDeps::live())
        .await
        .context("failed to start feed")?;

    shutdown_signal().await?;
    tracing::info!("Shutdown signal received");
    feed.shutdown().await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
