use anyhow::Result;
use eframe::egui;
use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

mod camera;
mod capture;
mod config;
mod texture;
mod ui;
mod upload;

use crate::camera::CameraController;
use crate::config::Config;
use crate::ui::UplinkApp;
use crate::upload::UploadClient;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("📷 Starting Photo Uplink");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;
    info!("Configuration loaded: server {}", config.server_base());

    // Initialize components
    let upload_client = Arc::new(UploadClient::new(config.server_base()));

    let camera_controller = match CameraController::new(&config.camera) {
        Ok(controller) => {
            if controller.is_available() {
                info!("Camera controller initialized successfully");
            } else {
                log::warn!("No camera detected, running with test pattern fallback");
            }
            Some(Arc::new(RwLock::new(controller)))
        }
        Err(e) => {
            log::warn!("Camera initialization failed: {}. Camera flow disabled.", e);
            None
        }
    };

    let runtime = tokio::runtime::Handle::current();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 700.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };

    info!("Launching GUI application...");

    eframe::run_native(
        "Photo Uplink",
        options,
        Box::new(move |_cc| {
            Box::new(UplinkApp::new(
                config,
                camera_controller,
                upload_client,
                runtime,
            ))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}
