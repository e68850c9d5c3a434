use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use glassdrive::{
    auth::session::SessionService,
    capture::{CameraDevice, FrameDirCamera},
    config::AppConfig,
    default_handlers,
    media::{FsStorage, MediaStorage},
    models::ShopCatalog,
    recognizer::{CliRecognizer, PlateRecognizer},
    routes::create_router,
    state::AppState,
    store::IntakeStore,
    Worker,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let catalog = ShopCatalog::load(config.shops_file.as_deref())?;
    let store = Arc::new(IntakeStore::open(config.store_path()).await);
    let media: Arc<dyn MediaStorage> = Arc::new(FsStorage::new(config.media_root()));
    let sessions = SessionService::from_config(&config)?;

    let camera = config
        .camera_frames_dir
        .clone()
        .map(|dir| Arc::new(FrameDirCamera::new(dir)) as Arc<dyn CameraDevice>);
    let recognizer = config
        .recognizer_command
        .clone()
        .map(|command| Arc::new(CliRecognizer::new(command)) as Arc<dyn PlateRecognizer>);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server address")?;
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);

    let state = AppState::new(store, config, catalog, media, sessions, camera, recognizer);

    let worker = Worker::new(Arc::new(state.clone()), default_handlers(), poll_interval);
    tokio::spawn(async move {
        worker.run().await;
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "glassdrive intake service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
    }
    info!("shutting down");
}
