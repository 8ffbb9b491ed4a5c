use keyrace::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), KeyraceError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyrace=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let server = KeyraceServer::builder()
        .config(config)
        .build(GuestProfiles::default())
        .await?;
    tracing::info!(addr = %server.local_addr()?, "listening for players");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
