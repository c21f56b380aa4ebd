use image::RgbImage;
use log::{info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::camera::{CameraManager, FacingMode, MediaDevices};
use crate::config::Config;
use crate::errors::TransformError;
use crate::feedback::Feedback;
use crate::intake::{CandidateImage, FileIntake};
use crate::surface::UiSurface;
use crate::upload::{TransformEndpoint, TransformedImage, UploadPipeline};

/// The capture/upload/result controller.
///
/// Built once at startup and shared by reference with whatever drives it
/// (the window, or headless mode). Every operation reports its own failures
/// on the surface and leaves the controller ready for the next action.
pub struct ImageTransformer {
    feedback: Arc<Feedback>,
    camera: CameraManager,
    intake: FileIntake,
    pipeline: UploadPipeline,
    selected: Mutex<Option<CandidateImage>>,
    uploading: AtomicBool,
}

/// Clears the in-flight flag however the upload ends.
struct UploadSlot<'a>(&'a AtomicBool);

impl Drop for UploadSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ImageTransformer {
    pub fn new(
        config: &Config,
        surface: Arc<dyn UiSurface>,
        devices: Arc<dyn MediaDevices>,
        endpoint: Arc<dyn TransformEndpoint>,
    ) -> Self {
        let feedback = Arc::new(Feedback::new(Arc::clone(&surface), config.feedback.clone()));
        Self {
            camera: CameraManager::new(devices, Arc::clone(&surface), &config.camera),
            intake: FileIntake::new(Arc::clone(&surface), Arc::clone(&feedback), &config.intake),
            pipeline: UploadPipeline::new(endpoint, surface, Arc::clone(&feedback)),
            feedback,
            selected: Mutex::new(None),
            uploading: AtomicBool::new(false),
        }
    }

    pub async fn start_camera(&self, facing: FacingMode) -> bool {
        info!("Starting camera (facing {})", facing);
        match self.camera.start(facing).await {
            Ok(()) => true,
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// No-op when the camera is already stopped.
    pub async fn stop_camera(&self) {
        self.camera.stop().await;
    }

    pub async fn is_camera_active(&self) -> bool {
        self.camera.is_active().await
    }

    pub async fn latest_frame(&self) -> Option<RgbImage> {
        self.camera.latest_frame().await
    }

    /// Captures a frame and selects it like a picked file. It is not uploaded.
    pub async fn capture_photo(&self) -> bool {
        match self.camera.capture().await {
            Ok(candidate) => self.select_file(candidate),
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Makes `candidate` the selected file and previews it when acceptable.
    pub fn select_file(&self, candidate: CandidateImage) -> bool {
        let accepted = self.intake.validate_and_preview(&candidate);
        *self.selected.lock() = Some(candidate);
        accepted
    }

    pub async fn select_path(&self, path: &Path) -> bool {
        match CandidateImage::from_path(path).await {
            Ok(candidate) => self.select_file(candidate),
            Err(e) => {
                self.feedback.show_error(&format!("{:#}", e));
                false
            }
        }
    }

    pub fn selected_name(&self) -> Option<String> {
        self.selected.lock().as_ref().map(|c| c.name().to_string())
    }

    /// Uploads the selected file.
    pub async fn upload_selected(&self) -> Option<TransformedImage> {
        let selected = self.selected.lock().clone();
        let Some(candidate) = selected else {
            self.feedback.show_error("Please select a file");
            return None;
        };

        // already previewed when it was selected
        if !self.intake.check(&candidate) {
            return None;
        }
        self.send(candidate).await
    }

    /// Validates and uploads `candidate`; an invalid candidate never reaches the network.
    pub async fn upload_image(&self, candidate: CandidateImage) -> Option<TransformedImage> {
        if let Err(e) = self.intake.validate(&candidate) {
            self.report(&e);
            return None;
        }
        self.send(candidate).await
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    /// One upload at a time: a request made while another is in flight is
    /// dropped without touching the surface.
    async fn send(&self, candidate: CandidateImage) -> Option<TransformedImage> {
        if self.uploading.swap(true, Ordering::AcqRel) {
            warn!("Upload of {} ignored, another upload is in flight", candidate.name());
            return None;
        }
        let _slot = UploadSlot(&self.uploading);

        // the pipeline has already reported any failure
        self.pipeline.upload_image(&candidate).await.ok()
    }

    /// Releases the camera and cancels pending timers.
    pub async fn shutdown(&self) {
        info!("Shutting down controller");
        self.camera.stop().await;
        self.feedback.shutdown();
    }

    fn report(&self, error: &TransformError) {
        self.feedback.show_error(&error.user_message());
    }
}
