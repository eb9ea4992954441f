use tracing_subscriber::EnvFilter;

use keyproof_directory::config::DirectoryConfig;
use keyproof_directory::router::build_router;
use keyproof_directory::shutdown::shutdown_signal;
use keyproof_directory::state::DirectoryState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = DirectoryConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(DirectoryState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Key directory listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
