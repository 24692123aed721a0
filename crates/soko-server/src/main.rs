mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use soko_api::AppStateInner;
use soko_chat::sweeper::run_sweep_loop;
use soko_chat::{BlobStore, ChatService, DiskBlobStore};
use soko_db::{Database, Store};

use crate::config::{DEFAULT_LOG_FILTER, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if !config.has_usable_secret() {
        eprintln!("FATAL: SOKO_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       It must match the identity provider's signing secret.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db: Arc<dyn Store> = Arc::new(Database::open(&config.db_path)?);
    let blobs: Arc<dyn BlobStore> =
        Arc::new(DiskBlobStore::new(config.blob_dir.clone(), config.public_url.clone()).await?);

    tokio::spawn(run_sweep_loop(
        db.clone(),
        blobs.clone(),
        config.sweep_interval_secs,
    ));

    let chat = ChatService::new(db, blobs, config.chat_config());
    let state = Arc::new(AppStateInner {
        chat,
        jwt_secret: config.jwt_secret.clone(),
        max_attachment_bytes: config.max_attachment_bytes,
    });

    let app = Router::new()
        .merge(soko_api::router(state))
        .nest_service("/files", ServeDir::new(&config.blob_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Soko chat server listening on {}", addr);
    info!(
        "Attachments in {} served at {}/files (max {} bytes)",
        config.blob_dir.display(),
        config.public_url,
        config.max_attachment_bytes
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
