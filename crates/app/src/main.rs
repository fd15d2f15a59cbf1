mod auth;
mod characters;
mod error;
mod router;
mod statistics;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use armory_core::{CharacterService, DiskParser, StatisticsService};
use armory_storage::{ConnectionSettings, Database, DEFAULT_SERVER_SELECTION_TIMEOUT};
use armory_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(config.environment)?;
    let metrics = telemetry::init_metrics()?;

    let settings = ConnectionSettings {
        uri: config.mongo.uri(),
        database: config.mongo.database.clone(),
        username: config.mongo.username.clone(),
        password: config.mongo.password.clone(),
        auth_source: config.mongo.auth_source.clone(),
        app_name: "armory-api".to_string(),
        server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
    };
    let database = Database::connect(&settings).await?;
    database.ping().await?;
    info!(
        stage = "storage",
        host = %config.mongo.host,
        database = database.name(),
        "connected to mongodb"
    );

    let characters = CharacterService::new(
        Arc::new(DiskParser::new(config.d2s_path.clone())),
        Arc::new(database.characters()),
        config.cache_duration,
    );
    let statistics = StatisticsService::new(Arc::new(database.statistics()));
    let state = router::AppState::new(
        metrics,
        characters,
        statistics,
        auth::BasicAuth::new(&config.statistics_credentials),
    );

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        d2s_path = %config.d2s_path.display(),
        cache_duration = ?config.cache_duration,
        cors = config.cors_enabled,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state, config.cors_enabled))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(stage = "app", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(stage = "app", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(stage = "app", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(stage = "app", "shutdown signal received");
}
