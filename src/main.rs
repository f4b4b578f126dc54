use anyhow::{Context, Result};
use cctv_manager::api::{AppState, RestApi};
use cctv_manager::config;
use cctv_manager::db;
use cctv_manager::db::repositories::{CameraStore, CamerasRepository};
use cctv_manager::services::{CameraService, StatusMonitor, StreamRelay, SystemPinger};
use cctv_manager::utils::LocalClock;
use gstreamer as gst;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

async fn run_app() -> Result<()> {
    let config_path = std::env::var_os("CCTV_CONFIG").map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting CCTV camera manager v{}", env!("CARGO_PKG_VERSION"));

    gst::init().context("Failed to initialize GStreamer")?;
    info!("GStreamer initialized successfully");

    let pool = db::connect(&config.database).await?;
    let store = Arc::new(CamerasRepository::new(pool));
    if let Err(e) = store.health_check().await {
        warn!("Database not healthy at startup: {}", e);
    }

    let camera_service = Arc::new(CameraService::new(
        store,
        Arc::new(SystemPinger::new()),
        LocalClock::from_utc_offset_hours(config.api.utc_offset_hours),
        &config.monitor,
    ));
    let stream_relay = Arc::new(StreamRelay::from_config(&config.streaming));

    let mut monitor = StatusMonitor::from_config(Arc::clone(&camera_service), &config.monitor);
    if config.monitor.enabled {
        monitor.start();
    } else {
        info!("Status monitor disabled by configuration");
    }

    let http_server = RestApi::new(
        &config.api,
        AppState {
            camera_service,
            stream_relay,
        },
    );

    let served = http_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down...");
        })
        .await;

    monitor.stop().await;
    served
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_app()) {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
