use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::IntakeConfig;
use crate::errors::TransformError;
use crate::feedback::Feedback;
use crate::surface::UiSurface;

/// An image waiting to be uploaded, from the file picker or a camera capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateImage {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl CandidateImage {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a file, declaring its MIME type from the extension the way a
    /// browser file picker does.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::from_bytes(name, mime_type_for(path), bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Validates candidates and renders their preview.
pub struct FileIntake {
    surface: Arc<dyn UiSurface>,
    feedback: Arc<Feedback>,
    max_bytes: usize,
    accepted_prefix: String,
}

impl FileIntake {
    pub fn new(surface: Arc<dyn UiSurface>, feedback: Arc<Feedback>, config: &IntakeConfig) -> Self {
        Self {
            surface,
            feedback,
            max_bytes: config.max_file_bytes,
            accepted_prefix: config.accepted_mime_prefix.clone(),
        }
    }

    pub fn validate(&self, candidate: &CandidateImage) -> Result<(), TransformError> {
        if !candidate.mime_type().starts_with(&self.accepted_prefix) {
            return Err(TransformError::Validation("Please select an image file".to_string()));
        }
        if candidate.size() > self.max_bytes {
            return Err(TransformError::Validation(format!(
                "File size must be less than {}MB",
                self.max_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// Checks the candidate and writes any rejection to the error region.
    pub fn check(&self, candidate: &CandidateImage) -> bool {
        match self.validate(candidate) {
            Ok(()) => true,
            Err(e) => {
                self.feedback.show_error(&e.user_message());
                false
            }
        }
    }

    /// Returns whether the candidate is acceptable. The preview is decoded in
    /// the background and lands on the surface later; a preview that cannot
    /// be decoded only leaves the slot unchanged.
    pub fn validate_and_preview(&self, candidate: &CandidateImage) -> bool {
        if !self.check(candidate) {
            return false;
        }

        info!("Accepted {} ({}, {} bytes)", candidate.name(), candidate.mime_type(), candidate.size());
        self.spawn_preview(candidate.bytes().to_vec());
        true
    }

    fn spawn_preview(&self, bytes: Vec<u8>) -> Option<JoinHandle<()>> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, preview skipped");
            return None;
        };

        let surface = Arc::clone(&self.surface);
        Some(handle.spawn(async move {
            let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await;
            match decoded {
                Ok(Ok(img)) => {
                    let rgba = img.to_rgba8();
                    debug!("Preview decoded: {}x{}", rgba.width(), rgba.height());
                    surface.show_preview(rgba);
                }
                Ok(Err(e)) => warn!("Could not preview image: {}", e),
                Err(e) => warn!("Preview task failed: {}", e),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::surface::SharedSurface;
    use crate::testing::{jpeg_bytes, wait_for};
    use std::path::PathBuf;

    fn intake() -> (FileIntake, SharedSurface) {
        let config = Config::default();
        let surface = SharedSurface::new();
        let shared: Arc<dyn UiSurface> = Arc::new(surface.clone());
        let feedback = Arc::new(Feedback::new(Arc::clone(&shared), config.feedback.clone()));
        (FileIntake::new(shared, feedback, &config.intake), surface)
    }

    #[test]
    fn test_rejects_non_image_type() {
        let (intake, surface) = intake();
        let candidate = CandidateImage::from_bytes("notes.txt", "text/plain", b"hello".to_vec());

        assert!(!intake.validate_and_preview(&candidate));
        assert_eq!(surface.lock().error, "Please select an image file");
    }

    #[test]
    fn test_rejects_oversized_file() {
        let (intake, surface) = intake();
        let candidate = CandidateImage::from_bytes("big.jpg", "image/jpeg", vec![0; 10 * 1024 * 1024 + 1]);

        assert!(!intake.validate_and_preview(&candidate));
        assert_eq!(surface.lock().error, "File size must be less than 10MB");
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let (intake, _surface) = intake();
        let candidate = CandidateImage::from_bytes("edge.png", "image/png", vec![0; 10 * 1024 * 1024]);
        assert!(intake.validate(&candidate).is_ok());
    }

    #[tokio::test]
    async fn test_preview_renders_after_acceptance() {
        let (intake, surface) = intake();
        let candidate = CandidateImage::from_bytes("photo.jpg", "image/jpeg", jpeg_bytes(32, 16));

        assert!(intake.validate_and_preview(&candidate));
        wait_for(|| surface.lock().preview.is_some()).await;

        let state = surface.lock();
        let preview = state.preview.as_ref().unwrap();
        assert_eq!(preview.dimensions(), (32, 16));
        assert!(state.error.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_preview_leaves_error_region_alone() {
        let (intake, surface) = intake();
        let candidate = CandidateImage::from_bytes("photo.heic", "image/heic", b"not decodable".to_vec());
        assert!(intake.validate(&candidate).is_ok());

        intake
            .spawn_preview(candidate.bytes().to_vec())
            .unwrap()
            .await
            .unwrap();

        let state = surface.lock();
        assert!(state.error.is_empty());
        assert!(state.preview.is_none());
    }

    #[test]
    fn test_check_reports_rejection() {
        let (intake, surface) = intake();
        let candidate = CandidateImage::from_bytes("notes.txt", "text/plain", b"hello".to_vec());
        assert!(!intake.check(&candidate));
        assert_eq!(surface.lock().error, "Please select an image file");
    }

    #[tokio::test]
    async fn test_from_path_declares_mime_type() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Holiday.JPG");
        std::fs::write(&path, jpeg_bytes(4, 4)).unwrap();

        let candidate = CandidateImage::from_path(&path).await.unwrap();
        assert_eq!(candidate.name(), "Holiday.JPG");
        assert_eq!(candidate.mime_type(), "image/jpeg");
        assert!(CandidateImage::from_path(&PathBuf::from("/definitely/missing.png")).await.is_err());
    }

    #[test]
    fn test_mime_type_table() {
        assert_eq!(mime_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("a.txt")), "text/plain");
        assert_eq!(mime_type_for(Path::new("README")), "application/octet-stream");
    }
}
