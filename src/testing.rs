//! Fakes shared by the unit tests.

use async_trait::async_trait;
use image::{ImageBuffer, Rgb, RgbImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::camera::{FacingConstraint, FacingMode, MediaDevices, MediaStream, VideoConstraints};
use crate::errors::{MediaError, TransformError};
use crate::intake::CandidateImage;
use crate::upload::{EndpointReply, TransformEndpoint};

pub fn gradient(width: u32, height: u32) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128])
    })
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    crate::camera::encode_snapshot(gradient(width, height), (width, height), 90).unwrap()
}

/// Polls `condition` until it holds, for work finishing on a background task.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

pub struct FakeDevices {
    supported: bool,
    deny: bool,
    cameras: Vec<FacingMode>,
    frame_delay: Duration,
    requests: Mutex<Vec<VideoConstraints>>,
    streams: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeDevices {
    pub fn with_cameras(cameras: &[FacingMode]) -> Self {
        Self {
            supported: true,
            deny: false,
            cameras: cameras.to_vec(),
            frame_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::with_cameras(&[])
        }
    }

    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::with_cameras(&[FacingMode::User])
        }
    }

    /// Every frame read takes `delay`, like a slow camera.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<VideoConstraints> {
        self.requests.lock().clone()
    }

    /// Stop flag of the n-th stream handed out.
    pub fn stream_stopped(&self, index: usize) -> Arc<AtomicBool> {
        Arc::clone(&self.streams.lock()[index])
    }

    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .iter()
            .filter(|stopped| !stopped.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn get_user_media(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>, MediaError> {
        self.requests.lock().push(*constraints);
        if self.deny {
            return Err(MediaError::PermissionDenied("user dismissed the prompt".to_string()));
        }

        let facing = match constraints.facing {
            FacingConstraint::Exact(mode) if self.cameras.contains(&mode) => mode,
            FacingConstraint::Exact(_) => return Err(MediaError::Overconstrained(constraints.facing.to_string())),
            FacingConstraint::Ideal(mode) if self.cameras.contains(&mode) => mode,
            FacingConstraint::Ideal(_) => match self.cameras.first() {
                Some(mode) => *mode,
                None => return Err(MediaError::NotFound("no cameras".to_string())),
            },
        };

        let stopped = Arc::new(AtomicBool::new(false));
        self.streams.lock().push(Arc::clone(&stopped));
        Ok(Box::new(FakeStream {
            facing,
            stopped,
            resolution: (constraints.width, constraints.height),
            frame_delay: self.frame_delay,
        }))
    }
}

struct FakeStream {
    facing: FacingMode,
    stopped: Arc<AtomicBool>,
    resolution: (u32, u32),
    frame_delay: Duration,
}

#[async_trait]
impl MediaStream for FakeStream {
    fn label(&self) -> String {
        format!("fake {} camera", self.facing)
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn stop_tracks(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn current_frame(&self) -> Result<RgbImage, MediaError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MediaError::Aborted("stream stopped".to_string()));
        }
        if !self.frame_delay.is_zero() {
            tokio::time::sleep(self.frame_delay).await;
        }
        // half the native size, so snapshots have to scale up
        Ok(gradient(self.resolution.0 / 2, self.resolution.1 / 2))
    }
}

pub struct FakeEndpoint {
    reply: Option<EndpointReply>,
    delay: Duration,
    calls: AtomicUsize,
    last_upload: Mutex<Option<String>>,
}

impl FakeEndpoint {
    pub fn replying(status: u16, body: serde_json::Value) -> Self {
        Self::raw(status, &body.to_string())
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            reply: Some(EndpointReply {
                status,
                body: body.as_bytes().to_vec(),
            }),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_upload: Mutex::new(None),
        }
    }

    /// Every request fails before reaching a server.
    pub fn unreachable() -> Self {
        Self {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_upload: Mutex::new(None),
        }
    }

    /// Replies only after `delay`, like a slow transformation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_upload_name(&self) -> Option<String> {
        self.last_upload.lock().clone()
    }
}

#[async_trait]
impl TransformEndpoint for FakeEndpoint {
    async fn post_image(&self, candidate: &CandidateImage) -> Result<EndpointReply, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_upload.lock() = Some(candidate.name().to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| TransformError::Transport("connection refused".to_string()))
    }
}
