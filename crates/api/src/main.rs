use anyhow::Context;

use djt_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    djt_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let app = djt_api::app::build_app(&config)
        .await
        .context("failed to initialise tracking store")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, persistent = config.use_persistent_stores, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
