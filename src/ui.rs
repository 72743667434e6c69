use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use image::RgbImage;
use tokio::sync::RwLock;

use crate::camera::CameraController;
use crate::capture::{CapturedImage, SourceKind};
use crate::config::Config;
use crate::upload::{
    UploadClient, UploadError, UploadReceipt, UploadStatus, MSG_SELECT_FIRST, MSG_SUCCESS,
    MSG_UPLOADING, MSG_UPLOAD_BUSY,
};

// ============================================================================
// CONSTANTS FOR UI STYLING
// ============================================================================
const UI_PADDING: f32 = 16.0;
const PREVIEW_MAX_HEIGHT: f32 = 420.0;
const THUMB_MAX_HEIGHT: f32 = 220.0;
const PREVIEW_FRAME_INTERVAL_MS: u64 = 33; // ~30 FPS

// ============================================================================
// EVENTS FROM BACKGROUND TASKS
// ============================================================================

/// Messages background upload tasks send back to the UI thread.
pub enum AppEvent {
    UploadFinished {
        source: SourceKind,
        result: Result<UploadReceipt, UploadError>,
    },
    ResultFetched(Result<RgbImage, String>),
}

/// An image picked through the system file dialog. Re-selection replaces the
/// whole value; no network traffic happens until upload is triggered.
pub struct SelectedFile {
    pub path: PathBuf,
    pub preview: RgbImage,
}

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

pub struct UplinkApp {
    config: Config,
    upload_client: Arc<UploadClient>,
    runtime: tokio::runtime::Handle,

    // Capture session
    pub camera_controller: Option<Arc<RwLock<CameraController>>>,
    pub camera_visible: bool,
    pub last_preview_update: Option<Instant>,

    // Display surfaces
    pub camera_texture: Option<egui::TextureHandle>,
    pub local_texture: Option<egui::TextureHandle>,
    pub result_texture: Option<egui::TextureHandle>,

    // Upload sources - at most one is active, whichever path ran last
    pub captured_image: Option<CapturedImage>,
    pub selected_file: Option<SelectedFile>,
    pub active_source: Option<SourceKind>,

    // Upload state
    pub upload_status: UploadStatus,
    pub status_message: Option<String>,
    pub server_filename: Option<String>,
    pub result_display_url: Option<String>,
    upload_in_flight: bool,

    events_tx: Sender<AppEvent>,
    events_rx: Receiver<AppEvent>,
}

impl UplinkApp {
    pub fn new(
        config: Config,
        camera_controller: Option<Arc<RwLock<CameraController>>>,
        upload_client: Arc<UploadClient>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let (events_tx, events_rx) = channel();

        Self {
            config,
            upload_client,
            runtime,
            camera_controller,
            camera_visible: false,
            last_preview_update: None,
            camera_texture: None,
            local_texture: None,
            result_texture: None,
            captured_image: None,
            selected_file: None,
            active_source: None,
            upload_status: UploadStatus::Idle,
            status_message: None,
            server_filename: None,
            result_display_url: None,
            upload_in_flight: false,
            events_tx,
            events_rx,
        }
    }

    pub fn upload_in_flight(&self) -> bool {
        self.upload_in_flight
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for UplinkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events(ctx);

        // Refresh the live preview while the camera is visible
        if self.camera_visible {
            self.update_camera_preview(ctx);
            ctx.request_repaint();
        }

        self.render_ui(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Mandatory scoped-resource release: stop the live stream on teardown
        if let Some(ref camera) = self.camera_controller {
            if let Ok(mut camera_lock) = camera.try_write() {
                camera_lock.stop_stream();
            }
        }
    }
}

// ============================================================================
// CAMERA FLOW
// ============================================================================

impl UplinkApp {
    /// User gesture: acquire the camera and bind the live stream to the
    /// preview surface. Acquisition failure is surfaced as a status message
    /// and leaves the camera hidden.
    pub fn show_camera(&mut self) {
        let Some(camera) = self.camera_controller.clone() else {
            self.status_message = Some("No camera available".to_string());
            return;
        };

        let Ok(mut camera_lock) = camera.try_write() else {
            self.status_message = Some("Camera busy".to_string());
            return;
        };

        match camera_lock.start_stream() {
            Ok(()) => {
                self.camera_visible = true;
                self.last_preview_update = None;
                self.status_message = None;
            }
            Err(e) => {
                log::error!("Error accessing the camera: {}", e);
                self.camera_visible = false;
                self.status_message = Some(format!("Camera error: {}", e));
            }
        }
    }

    fn update_camera_preview(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let should_update = match self.last_preview_update {
            None => true,
            Some(last) => {
                now.duration_since(last)
                    >= std::time::Duration::from_millis(PREVIEW_FRAME_INTERVAL_MS)
            }
        };

        if should_update {
            if let Some(camera) = self.camera_controller.clone() {
                if let Ok(camera_lock) = camera.try_read() {
                    if let Ok(frame) = camera_lock.preview_frame() {
                        self.update_camera_texture(ctx, &frame);
                        self.last_preview_update = Some(now);
                    }
                }
            }
        }
    }

    /// User gesture: snapshot the current frame and upload it. Capture and
    /// upload are a single step in the camera flow; the captured image is
    /// displayed immediately from local bytes.
    pub fn capture_and_upload(&mut self, ctx: &egui::Context) {
        let Some(camera) = self.camera_controller.clone() else {
            self.status_message = Some("No camera available".to_string());
            return;
        };

        let frame = {
            let Ok(camera_lock) = camera.try_read() else {
                self.status_message = Some("Camera busy".to_string());
                return;
            };
            match camera_lock.capture_snapshot() {
                Ok(frame) => frame,
                Err(e) => {
                    log::error!("Capture failed: {}", e);
                    self.status_message = Some(format!("Capture failed: {}", e));
                    return;
                }
            }
        };

        let captured =
            match CapturedImage::from_frame(&frame, SourceKind::Camera, &self.config.capture) {
                Ok(captured) => captured,
                Err(e) => {
                    log::error!("Frame encoding failed: {}", e);
                    self.status_message = Some(format!("Capture failed: {}", e));
                    return;
                }
            };

        // Show the capture from local data right away - no server round trip
        self.update_local_texture(ctx, &captured.frame);
        self.active_source = Some(SourceKind::Camera);
        self.captured_image = Some(captured.clone());

        self.begin_upload(SourceKind::Camera, captured);
    }
}

// ============================================================================
// FILE PICKER FLOW
// ============================================================================

impl UplinkApp {
    /// User gesture: pick an image file. Only refreshes the preview; upload
    /// is a separate explicit gesture.
    pub fn pick_file(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "gif", "webp"])
            .pick_file()
        else {
            return;
        };

        match image::open(&path) {
            Ok(img) => {
                let preview = img.to_rgb8();
                log::info!(
                    "Selected {} ({}x{})",
                    path.display(),
                    preview.width(),
                    preview.height()
                );
                self.update_local_texture(ctx, &preview);
                self.selected_file = Some(SelectedFile { path, preview });
                self.active_source = Some(SourceKind::File);
                self.status_message = None;
            }
            Err(e) => {
                log::error!("Failed to load {}: {}", path.display(), e);
                self.status_message = Some(format!("Could not open image: {}", e));
            }
        }
    }

    /// User gesture: upload the selected file. With nothing selected this
    /// sets a status message and issues no request.
    pub fn upload_selected(&mut self) {
        let Some(ref selected) = self.selected_file else {
            self.status_message = Some(MSG_SELECT_FIRST.to_string());
            return;
        };

        let captured = match CapturedImage::from_frame(
            &selected.preview,
            SourceKind::File,
            &self.config.capture,
        ) {
            Ok(captured) => captured,
            Err(e) => {
                log::error!("Image encoding failed: {}", e);
                self.status_message = Some(format!("Could not encode image: {}", e));
                return;
            }
        };

        self.begin_upload(SourceKind::File, captured);
    }
}

// ============================================================================
// UPLOAD ORCHESTRATION
// ============================================================================

impl UplinkApp {
    /// Start a background upload. At most one upload is in flight at a time;
    /// a second trigger is rejected with a status message instead of racing.
    fn begin_upload(&mut self, source: SourceKind, captured: CapturedImage) {
        if self.upload_in_flight {
            log::warn!("Upload already in flight, rejecting trigger");
            self.status_message = Some(MSG_UPLOAD_BUSY.to_string());
            return;
        }

        self.upload_in_flight = true;
        self.upload_status = UploadStatus::InProgress;
        self.status_message = Some(MSG_UPLOADING.to_string());
        self.server_filename = None;
        self.result_display_url = None;

        let client = self.upload_client.clone();
        let tx = self.events_tx.clone();
        let filename = captured.filename.clone();
        let data = captured.data;

        self.runtime.spawn(async move {
            let result = client.upload(&filename, data).await;
            let _ = tx.send(AppEvent::UploadFinished { source, result });
        });
    }

    fn drain_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                AppEvent::UploadFinished { source, result } => {
                    self.finish_upload(source, result)
                }
                AppEvent::ResultFetched(Ok(image)) => {
                    self.update_result_texture(ctx, &image);
                }
                AppEvent::ResultFetched(Err(e)) => {
                    // Result display is best effort; the URL is still shown
                    log::warn!("Failed to fetch processed result: {}", e);
                }
            }
            ctx.request_repaint();
        }
    }

    fn finish_upload(&mut self, source: SourceKind, result: Result<UploadReceipt, UploadError>) {
        self.upload_in_flight = false;

        match result {
            Ok(receipt) => {
                self.upload_status = UploadStatus::Success;
                self.status_message = Some(MSG_SUCCESS.to_string());
                self.server_filename = Some(receipt.server_filename.clone());
                self.result_display_url = Some(receipt.display_url.clone());

                // Camera captures are already displayed from local bytes.
                // For the file path, fetch the server-processed result.
                if source == SourceKind::File {
                    self.fetch_result(receipt.display_url);
                }
            }
            Err(e) => {
                log::error!("{}: {:?}", e, e);
                self.upload_status = UploadStatus::Failure;
                self.status_message = Some(e.user_message().to_string());
            }
        }
    }

    fn fetch_result(&self, url: String) {
        let client = self.upload_client.clone();
        let tx = self.events_tx.clone();

        self.runtime.spawn(async move {
            let result = match client.fetch_result(&url).await {
                Ok(bytes) => image::load_from_memory(&bytes)
                    .map(|img| img.to_rgb8())
                    .map_err(|e| format!("decode failed: {}", e)),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(AppEvent::ResultFetched(result));
        });
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl UplinkApp {
    fn render_ui(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.add_space(UI_PADDING);
                ui.vertical_centered(|ui| {
                    ui.heading("Photo Uplink");
                    ui.label(format!("Server: {}", self.config.server_base()));
                });
                ui.add_space(UI_PADDING);
                ui.separator();

                self.render_camera_section(ui, ctx);
                ui.separator();
                self.render_file_section(ui, ctx);
                ui.separator();
                self.render_result_section(ui);
            });
        });
    }

    fn render_camera_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.add_space(UI_PADDING);

        if self.camera_visible {
            if let Some(texture) = &self.camera_texture {
                let display_size = fit_to_height(texture.size_vec2(), PREVIEW_MAX_HEIGHT);
                ui.vertical_centered(|ui| {
                    ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
                });
            } else {
                ui.vertical_centered(|ui| {
                    ui.label("Waiting for camera...");
                });
            }

            ui.add_space(UI_PADDING / 2.0);
            ui.vertical_centered(|ui| {
                let capture_enabled = !self.upload_in_flight;
                if ui
                    .add_enabled(capture_enabled, egui::Button::new("📷 Capture & Upload"))
                    .clicked()
                {
                    self.capture_and_upload(ctx);
                }
            });
        } else {
            ui.vertical_centered(|ui| {
                if ui.button("Show Camera").clicked() {
                    self.show_camera();
                }
            });
        }

        // Captured image shown from local data
        if self.active_source == Some(SourceKind::Camera) {
            if let Some(texture) = &self.local_texture {
                ui.add_space(UI_PADDING / 2.0);
                let display_size = fit_to_height(texture.size_vec2(), THUMB_MAX_HEIGHT);
                ui.vertical_centered(|ui| {
                    ui.label("Captured:");
                    ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
                });
            }
        }

        ui.add_space(UI_PADDING);
    }

    fn render_file_section(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.add_space(UI_PADDING);

        ui.horizontal(|ui| {
            if ui.button("Choose Image...").clicked() {
                self.pick_file(ctx);
            }

            if let Some(ref selected) = self.selected_file {
                ui.label(
                    selected
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default(),
                );
            }

            let upload_enabled = !self.upload_in_flight;
            if ui
                .add_enabled(upload_enabled, egui::Button::new("Upload Image"))
                .clicked()
            {
                self.upload_selected();
            }
        });

        if self.active_source == Some(SourceKind::File) {
            if let Some(texture) = &self.local_texture {
                ui.add_space(UI_PADDING / 2.0);
                let display_size = fit_to_height(texture.size_vec2(), THUMB_MAX_HEIGHT);
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            }
        }

        ui.add_space(UI_PADDING);
    }

    fn render_result_section(&mut self, ui: &mut egui::Ui) {
        ui.add_space(UI_PADDING);

        if let Some(ref message) = self.status_message {
            let color = match self.upload_status {
                UploadStatus::Success => egui::Color32::from_rgb(40, 160, 40),
                UploadStatus::Failure => egui::Color32::from_rgb(200, 60, 60),
                _ => ui.visuals().text_color(),
            };
            ui.colored_label(color, message);
        }

        if let Some(ref url) = self.result_display_url {
            ui.add_space(UI_PADDING / 2.0);
            ui.label(format!("Result: {}", url));

            if let Some(texture) = &self.result_texture {
                let display_size = fit_to_height(texture.size_vec2(), PREVIEW_MAX_HEIGHT);
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            }
        }

        ui.add_space(UI_PADDING);
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Scale an image size down so its height fits the limit, keeping aspect.
fn fit_to_height(image_size: egui::Vec2, max_height: f32) -> egui::Vec2 {
    if image_size.y <= max_height {
        return image_size;
    }
    image_size * (max_height / image_size.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SourceKind;

    fn test_app(runtime: &tokio::runtime::Runtime) -> UplinkApp {
        let config = Config::default();
        let client = Arc::new(UploadClient::new(config.server_base()));
        UplinkApp::new(config, None, client, runtime.handle().clone())
    }

    #[test]
    fn test_upload_without_selection_issues_no_request() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);

        app.upload_selected();

        assert_eq!(app.status_message.as_deref(), Some(MSG_SELECT_FIRST));
        assert_eq!(app.upload_status, UploadStatus::Idle);
        assert!(!app.upload_in_flight());
        // No task was spawned, so no event can ever arrive
        assert!(app.events_rx.try_recv().is_err());
    }

    #[test]
    fn test_second_upload_trigger_is_rejected() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        app.upload_in_flight = true;

        let frame = image::ImageBuffer::from_pixel(4, 4, image::Rgb([1u8, 2, 3]));
        let captured =
            CapturedImage::from_frame(&frame, SourceKind::Camera, &app.config.capture).unwrap();
        app.begin_upload(SourceKind::Camera, captured);

        assert_eq!(app.status_message.as_deref(), Some(MSG_UPLOAD_BUSY));
        assert!(app.upload_in_flight());
        assert!(app.events_rx.try_recv().is_err());
    }

    #[test]
    fn test_upload_failure_leaves_display_url_unset() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        app.upload_in_flight = true;
        app.upload_status = UploadStatus::InProgress;

        app.finish_upload(
            SourceKind::File,
            Err(UploadError::Rejected {
                status: 500,
                detail: r#"{"error":"bad format"}"#.to_string(),
            }),
        );

        assert_eq!(app.upload_status, UploadStatus::Failure);
        assert_eq!(
            app.status_message.as_deref(),
            Some(crate::upload::MSG_UPLOAD_ERROR)
        );
        assert!(app.result_display_url.is_none());
        assert!(!app.upload_in_flight());
    }

    #[test]
    fn test_upload_success_records_receipt() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut app = test_app(&runtime);
        app.upload_in_flight = true;
        app.upload_status = UploadStatus::InProgress;

        // Camera source: receipt is recorded without any result fetch
        app.finish_upload(
            SourceKind::Camera,
            Ok(UploadReceipt {
                server_filename: "captured_image_20240101T000000.png".to_string(),
                display_url: "http://127.0.0.1:5000/downloads/captured_image_20240101T000000.png"
                    .to_string(),
            }),
        );

        assert_eq!(app.upload_status, UploadStatus::Success);
        assert_eq!(app.status_message.as_deref(), Some(MSG_SUCCESS));
        assert_eq!(
            app.server_filename.as_deref(),
            Some("captured_image_20240101T000000.png")
        );
        assert_eq!(
            app.result_display_url.as_deref(),
            Some("http://127.0.0.1:5000/downloads/captured_image_20240101T000000.png")
        );
        assert!(app.events_rx.try_recv().is_err());
    }

    #[test]
    fn test_fit_to_height() {
        let size = fit_to_height(egui::vec2(640.0, 480.0), 240.0);
        assert_eq!(size, egui::vec2(320.0, 240.0));

        let size = fit_to_height(egui::vec2(100.0, 100.0), 240.0);
        assert_eq!(size, egui::vec2(100.0, 100.0));
    }
}
