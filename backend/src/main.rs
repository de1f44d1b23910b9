mod api;
mod config;
mod db;
mod errors;
mod models;
mod state;

use crate::config::Config;
use crate::errors::ApiError;
use crate::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.data_dir).map_err(|_| ApiError::Internal)?;

    let db_path = config.data_dir.join("ledger.sqlite");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());

    let db = db::connect(&db_url, 5).await?;
    db::init_schema(&db).await?;

    let state = AppState::bootstrap(db, &config).await?;

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(addr = %config.addr, mode = ?config.mode, "ledger backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(())
}
