use async_trait::async_trait;
use image::RgbImage;
use std::io::ErrorKind;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio::time::{sleep, Duration, Instant};

use super::{FacingConstraint, FacingMode, MediaDevices, MediaStream, VideoConstraints};
use crate::config::CameraConfig;
use crate::errors::MediaError;

const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const FRAME_READ_ATTEMPTS: u32 = 3;
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Raspberry Pi cameras driven through the `rpicam-*` command line tools.
///
/// Pi camera modules carry no facing information, so each facing mode is
/// mapped to a configured camera index.
pub struct RpicamDevices {
    available: bool,
    user_index: u32,
    environment_index: u32,
    frame_interval_ms: u64,
    jpeg_quality: u8,
}

impl RpicamDevices {
    /// Checks once whether the rpicam tools are installed.
    pub fn probe(config: &CameraConfig) -> Self {
        let available = match Command::new("rpicam-still").arg("--help").output() {
            Ok(_) => {
                log::info!("Raspberry Pi camera tools found (rpicam-still)");
                true
            }
            Err(e) => {
                log::warn!("rpicam-still not found: {}. Camera disabled.", e);
                false
            }
        };

        Self {
            available,
            user_index: config.user_camera_index,
            environment_index: config.environment_camera_index,
            frame_interval_ms: config.frame_interval_ms,
            jpeg_quality: config.jpeg_quality,
        }
    }

    fn camera_index(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::User => self.user_index,
            FacingMode::Environment => self.environment_index,
        }
    }

    async fn list_cameras(&self) -> Result<Vec<u32>, MediaError> {
        let output = tokio::process::Command::new("rpicam-hello")
            .arg("--list-cameras")
            .output()
            .await
            .map_err(spawn_error)?;

        let listing = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        log::debug!("rpicam-hello --list-cameras: {}", listing);
        Ok(parse_camera_list(&listing))
    }

    fn select_camera(&self, cameras: &[u32], facing: FacingConstraint) -> Result<u32, MediaError> {
        if cameras.is_empty() {
            return Err(MediaError::NotFound("no cameras detected".to_string()));
        }
        match facing {
            FacingConstraint::Exact(mode) => {
                let wanted = self.camera_index(mode);
                if cameras.contains(&wanted) {
                    Ok(wanted)
                } else {
                    Err(MediaError::Overconstrained(facing.to_string()))
                }
            }
            FacingConstraint::Ideal(mode) => {
                let wanted = self.camera_index(mode);
                Ok(if cameras.contains(&wanted) { wanted } else { cameras[0] })
            }
        }
    }
}

#[async_trait]
impl MediaDevices for RpicamDevices {
    fn is_supported(&self) -> bool {
        self.available
    }

    async fn get_user_media(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, MediaError> {
        if !self.available {
            return Err(MediaError::NotSupported);
        }

        let cameras = self.list_cameras().await?;
        let index = self.select_camera(&cameras, constraints.facing)?;
        let frame_path = std::env::temp_dir().join(format!("image_transformer_camera{}.jpg", index));
        let _ = tokio::fs::remove_file(&frame_path).await;

        let args = [
            "--camera".to_string(),
            index.to_string(),
            "--width".to_string(),
            constraints.width.to_string(),
            "--height".to_string(),
            constraints.height.to_string(),
            "--quality".to_string(),
            self.jpeg_quality.to_string(),
            "--timelapse".to_string(),
            self.frame_interval_ms.to_string(),
            "--timeout".to_string(),
            "0".to_string(), // run until stopped
            "--nopreview".to_string(),
            "-o".to_string(),
            frame_path.display().to_string(),
        ];
        log::info!("Stream command: rpicam-still {}", args.join(" "));

        let child = tokio::process::Command::new("rpicam-still")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let mut stream = RpicamStream {
            child: Mutex::new(Some(child)),
            frame_path,
            index,
            resolution: (constraints.width, constraints.height),
        };
        stream.wait_for_first_frame().await?;
        Ok(Box::new(stream))
    }
}

pub struct RpicamStream {
    child: Mutex<Option<tokio::process::Child>>,
    frame_path: PathBuf,
    index: u32,
    resolution: (u32, u32),
}

impl RpicamStream {
    async fn wait_for_first_frame(&mut self) -> Result<(), MediaError> {
        let started = Instant::now();
        loop {
            if tokio::fs::metadata(&self.frame_path).await.is_ok() {
                return Ok(());
            }

            let exited = match self.child.get_mut().as_mut() {
                Some(child) => match child.try_wait() {
                    Ok(Some(status)) => Some((status, child.stderr.take())),
                    _ => None,
                },
                None => None,
            };
            if let Some((status, pipe)) = exited {
                *self.child.get_mut() = None;
                let mut stderr = String::new();
                if let Some(mut pipe) = pipe {
                    let _ = tokio::io::AsyncReadExt::read_to_string(&mut pipe, &mut stderr).await;
                }
                return Err(classify_exit(status.code(), &stderr));
            }

            if started.elapsed() > FIRST_FRAME_TIMEOUT {
                self.stop_tracks();
                return Err(MediaError::Aborted("camera produced no frames".to_string()));
            }
            sleep(Duration::from_millis(50)).await;
        }
    }
}

#[async_trait]
impl MediaStream for RpicamStream {
    fn label(&self) -> String {
        format!("rpicam camera {}", self.index)
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn stop_tracks(&self) {
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
            log::debug!("Capture process for camera {} stopped", self.index);
        }
        if self.frame_path.exists() {
            let _ = std::fs::remove_file(&self.frame_path);
        }
    }

    async fn current_frame(&self) -> Result<RgbImage, MediaError> {
        if self.child.lock().is_none() {
            return Err(MediaError::Aborted("stream stopped".to_string()));
        }
        read_frame(&self.frame_path).await
    }
}

/// Reads the frame file. The capture process rewrites it in place, so a read
/// can catch it half written; undecodable reads are retried a few times.
async fn read_frame(path: &Path) -> Result<RgbImage, MediaError> {
    let mut attempt = 1;
    loop {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| MediaError::Aborted(format!("frame unavailable: {}", e)))?;

        let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|img| img.to_rgb8()))
            .await
            .map_err(|e| MediaError::Aborted(e.to_string()))?;

        match decoded {
            Ok(frame) => return Ok(frame),
            Err(e) if attempt < FRAME_READ_ATTEMPTS => {
                log::debug!("Frame read {} of {} failed: {}", attempt, path.display(), e);
                attempt += 1;
                sleep(FRAME_RETRY_DELAY).await;
            }
            Err(e) => return Err(MediaError::Aborted(format!("frame not decodable: {}", e))),
        }
    }
}

impl Drop for RpicamStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Extracts camera indices from `rpicam-hello --list-cameras` output, whose
/// entries look like `0 : imx708 [4608x2592 10-bit RGGB] (/base/...)`.
pub fn parse_camera_list(listing: &str) -> Vec<u32> {
    listing
        .lines()
        .filter_map(|line| {
            let (index, rest) = line.trim().split_once(':')?;
            if rest.trim().is_empty() {
                return None;
            }
            index.trim().parse().ok()
        })
        .collect()
}

fn spawn_error(e: std::io::Error) -> MediaError {
    match e.kind() {
        ErrorKind::NotFound => MediaError::NotSupported,
        ErrorKind::PermissionDenied => MediaError::PermissionDenied(e.to_string()),
        _ => MediaError::Aborted(e.to_string()),
    }
}

fn classify_exit(code: Option<i32>, stderr: &str) -> MediaError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        MediaError::PermissionDenied(stderr.trim().to_string())
    } else if lower.contains("no cameras available") || lower.contains("invalid camera") {
        MediaError::NotFound(stderr.trim().to_string())
    } else {
        MediaError::Aborted(format!(
            "capture process exited ({}): {}",
            code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
            stderr.trim()
        ))
    }
}
