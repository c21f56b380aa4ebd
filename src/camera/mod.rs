use async_trait::async_trait;
use image::RgbImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::CameraConfig;
use crate::errors::{MediaError, TransformError};
use crate::intake::CandidateImage;
use crate::surface::{UiSurface, VideoView};

pub mod rpicam;

pub const CAPTURE_FILE_NAME: &str = "capture.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the person holding the device
    #[default]
    User,
    /// Rear camera
    Environment,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::User => write!(f, "user"),
            FacingMode::Environment => write!(f, "environment"),
        }
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(FacingMode::User),
            "environment" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode '{}' (expected user or environment)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingConstraint {
    Exact(FacingMode),
    /// Preferred, any camera is acceptable when it cannot be met
    Ideal(FacingMode),
}

impl fmt::Display for FacingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingConstraint::Exact(mode) => write!(f, "facingMode exact={}", mode),
            FacingConstraint::Ideal(mode) => write!(f, "facingMode ideal={}", mode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing: FacingConstraint,
    pub width: u32,
    pub height: u32,
}

impl VideoConstraints {
    pub fn relaxed(self) -> Self {
        let facing = match self.facing {
            FacingConstraint::Exact(mode) | FacingConstraint::Ideal(mode) => FacingConstraint::Ideal(mode),
        };
        Self { facing, ..self }
    }
}

/// Source of video streams (the platform media API).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether this system can capture video at all.
    fn is_supported(&self) -> bool;

    async fn get_user_media(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, MediaError>;
}

/// A live video stream owning one or more capture tracks.
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn label(&self) -> String;

    /// Native frame size of the stream.
    fn resolution(&self) -> (u32, u32);

    /// Stops every track. Must be safe to call more than once.
    fn stop_tracks(&self);

    async fn current_frame(&self) -> Result<RgbImage, MediaError>;
}

/// Owns at most one live stream and binds it to the video slot.
pub struct CameraManager {
    devices: Arc<dyn MediaDevices>,
    surface: Arc<dyn UiSurface>,
    stream: Mutex<Option<Arc<dyn MediaStream>>>,
    width: u32,
    height: u32,
    jpeg_quality: u8,
}

impl CameraManager {
    pub fn new(devices: Arc<dyn MediaDevices>, surface: Arc<dyn UiSurface>, config: &CameraConfig) -> Self {
        Self {
            devices,
            surface,
            stream: Mutex::new(None),
            width: config.width,
            height: config.height,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Requests a stream with an exact facing mode, retrying once with the
    /// facing mode as a preference when no camera matches exactly.
    pub async fn start(&self, facing: FacingMode) -> Result<(), TransformError> {
        if !self.devices.is_supported() {
            return Err(TransformError::Unsupported);
        }

        self.stop().await;

        let exact = VideoConstraints {
            facing: FacingConstraint::Exact(facing),
            width: self.width,
            height: self.height,
        };

        let stream = match self.devices.get_user_media(&exact).await {
            Ok(stream) => stream,
            Err(MediaError::Overconstrained(constraint)) => {
                warn!("No camera matches {}, retrying with a preferred facing mode", constraint);
                self.devices
                    .get_user_media(&exact.relaxed())
                    .await
                    .map_err(|source| TransformError::Camera {
                        context: "Camera not available",
                        source,
                    })?
            }
            Err(source) => {
                return Err(TransformError::Camera {
                    context: "Error accessing camera",
                    source,
                })
            }
        };

        self.bind(stream).await;
        Ok(())
    }

    async fn bind(&self, stream: Box<dyn MediaStream>) {
        let (width, height) = stream.resolution();
        let label = stream.label();

        let mut slot = self.stream.lock().await;
        // another start may have finished while this one was waiting on the device
        if let Some(previous) = slot.replace(Arc::from(stream)) {
            debug!("Replacing stream {}", previous.label());
            previous.stop_tracks();
        }
        drop(slot);

        info!("Camera started: {} ({}x{})", label, width, height);
        self.surface.bind_video(VideoView { label, width, height });
    }

    /// Stops the active stream. Returns false, doing nothing, when there is none.
    pub async fn stop(&self) -> bool {
        let Some(stream) = self.stream.lock().await.take() else {
            return false;
        };
        stream.stop_tracks();
        self.surface.hide_video();
        info!("Camera stopped: {}", stream.label());
        true
    }

    pub async fn is_active(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    async fn active_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.stream.lock().await.clone()
    }

    /// Latest frame for the live view, if a stream is active and has one.
    /// The frame is read without holding the stream slot.
    pub async fn latest_frame(&self) -> Option<RgbImage> {
        let stream = self.active_stream().await?;
        match stream.current_frame().await {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("No preview frame: {}", e);
                None
            }
        }
    }

    /// Snapshots the current frame at the stream's native size and encodes it as JPEG.
    pub async fn capture(&self) -> Result<CandidateImage, TransformError> {
        let stream = self.active_stream().await.ok_or(TransformError::CameraInactive)?;
        let frame = stream
            .current_frame()
            .await
            .map_err(|e| TransformError::Capture(e.to_string()))?;
        let resolution = stream.resolution();

        let quality = self.jpeg_quality;
        let bytes = tokio::task::spawn_blocking(move || encode_snapshot(frame, resolution, quality))
            .await
            .map_err(|e| TransformError::Capture(e.to_string()))??;

        info!("Captured photo: {} bytes", bytes.len());
        Ok(CandidateImage::from_bytes(CAPTURE_FILE_NAME, "image/jpeg", bytes))
    }
}

pub fn encode_snapshot(frame: RgbImage, resolution: (u32, u32), quality: u8) -> Result<Vec<u8>, TransformError> {
    let (width, height) = resolution;
    let frame = if frame.dimensions() != resolution && width > 0 && height > 0 {
        image::imageops::resize(&frame, width, height, image::imageops::FilterType::Triangle)
    } else {
        frame
    };

    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode(frame.as_raw(), frame.width(), frame.height(), image::ColorType::Rgb8)
        .map_err(|e| TransformError::Capture(e.to_string()))?;
    Ok(bytes)
}
