use bongocat_overlay::bridge::{BridgeHandle, MonitorCell, ParameterBoard};
use bongocat_overlay::input::{default_backend, InputHandle, KeyCatalog};
use bongocat_overlay::persistence::{ConfigStore, PersistenceManager};
use bongocat_overlay::ui::common::window_size;
use bongocat_overlay::ui::{OverlayApp, OverlayParts};
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let store = ConfigStore::default_location()?;
    let config = store.load().await;
    info!("Config file: {}", store.path().display());
    let persistence = PersistenceManager::new(store);

    let catalog = match &config.key_asset_dir {
        Some(dir) => KeyCatalog::from_asset_dir(dir).await,
        None => KeyCatalog::all(),
    };
    info!("{} keys supported", catalog.len());

    let input = InputHandle::spawn(Some(config.input_settings()), catalog, default_backend())
        .map_err(|e| eyre!("Failed to start input hub: {}", e))?;
    let control = input.control();
    if config.global_listener && !control.start_global() {
        warn!("Global listener configured but unavailable, using window capture");
    }

    let board = ParameterBoard::new();
    let monitor = MonitorCell::default();
    let bridge = BridgeHandle::spawn(
        input.subscribe(),
        Box::new(board.clone()),
        Arc::new(monitor.clone()),
        config.model_root.clone(),
    );

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("BongoCat")
            .with_inner_size(window_size(config.scale_factor()))
            .with_decorations(false)
            .with_transparent(true)
            .with_always_on_top(),
        ..Default::default()
    };

    let parts = OverlayParts {
        config,
        input: control,
        snapshots: input.subscribe(),
        board,
        monitor,
        persistence: persistence.get_sender(),
    };

    let run_result = eframe::run_native(
        "BongoCat",
        native_options,
        Box::new(move |cc| Ok(Box::new(OverlayApp::new(cc, parts)))),
    );

    info!("Overlay closed, shutting down");
    bridge.shutdown().await;
    if let Err(e) = input.shutdown().await {
        error!("Input hub shutdown failed: {}", e);
    }
    if let Err(e) = persistence.shutdown().await {
        error!("Failed to flush config: {}", e);
    }

    run_result.map_err(|e| eyre!("Overlay window failed: {}", e))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
