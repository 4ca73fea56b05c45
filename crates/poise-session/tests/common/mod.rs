//! Scripted camera and landmark fakes for controller tests.

#![allow(dead_code)]

use image::{ImageFormat, Rgb, RgbImage};
use poise_core::{
    BoundingBox, Capability, FrameDims, FrameView, LandmarkFrame, LandmarkSource, SourceError,
};
use poise_hw::{CameraError, CameraProvider, Frame, VideoSource};
use poise_session::SessionConfig;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const CAMERA_WIDTH: u32 = 600;
pub const CAMERA_HEIGHT: u32 = 800;

pub fn config() -> SessionConfig {
    SessionConfig {
        sample_interval: Duration::from_millis(100),
        dwell_threshold: Duration::from_millis(2000),
        countdown: Duration::from_secs(3),
        ..SessionConfig::default()
    }
}

// --- Camera ---

#[derive(Default)]
pub struct CameraStats {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub grabs: AtomicUsize,
}

impl CameraStats {
    /// Cameras acquired and not yet released.
    pub fn held(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    stats: Arc<CameraStats>,
    fail_grabs: bool,
    released: bool,
    sequence: u32,
}

impl VideoSource for FakeCamera {
    fn dims(&self) -> FrameDims {
        FrameDims::new(CAMERA_WIDTH, CAMERA_HEIGHT)
    }

    fn grab_frame(&mut self) -> Result<Frame, CameraError> {
        if self.released {
            return Err(CameraError::Released);
        }
        if self.fail_grabs {
            return Err(CameraError::CaptureFailed("scripted failure".into()));
        }
        self.stats.grabs.fetch_add(1, Ordering::SeqCst);
        self.sequence += 1;
        let image = RgbImage::from_pixel(CAMERA_WIDTH, CAMERA_HEIGHT, Rgb([150, 120, 100]));
        Ok(Frame::from_rgb_image(image, self.sequence))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct FakeProvider {
    pub stats: Arc<CameraStats>,
    pub acquire_error: Option<fn() -> CameraError>,
    pub fail_grabs: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(CameraStats::default()),
            acquire_error: None,
            fail_grabs: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            acquire_error: Some(|| CameraError::PermissionDenied("/dev/video0".into())),
            ..Self::new()
        }
    }

    pub fn failing_grabs() -> Self {
        Self {
            fail_grabs: true,
            ..Self::new()
        }
    }
}

impl CameraProvider for FakeProvider {
    type Camera = FakeCamera;

    fn acquire(&mut self) -> Result<FakeCamera, CameraError> {
        if let Some(make_error) = self.acquire_error {
            return Err(make_error());
        }
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeCamera {
            stats: Arc::clone(&self.stats),
            fail_grabs: self.fail_grabs,
            released: false,
            sequence: 0,
        })
    }
}

// --- Landmarks ---

#[derive(Default)]
pub struct SourceStats {
    pub probes: AtomicUsize,
    pub detects: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub releases: AtomicUsize,
}

impl SourceStats {
    pub fn detects(&self) -> usize {
        self.detects.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when a detection is dropped mid-await.
struct InFlight<'a>(&'a SourceStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a SourceStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedSource {
    pub stats: Arc<SourceStats>,
    capability: Option<Capability>,
    script: VecDeque<Option<LandmarkFrame>>,
    fallback: Option<LandmarkFrame>,
    delay: Duration,
}

impl ScriptedSource {
    /// Always sees one well-framed face.
    pub fn perfect() -> Self {
        Self {
            stats: Arc::new(SourceStats::default()),
            capability: Some(Capability::FaceOnly),
            script: VecDeque::new(),
            fallback: Some(LandmarkFrame::face_box(1, centered_face())),
            delay: Duration::ZERO,
        }
    }

    /// Probe fails, so the session must run without guidance.
    pub fn broken() -> Self {
        Self {
            capability: None,
            ..Self::perfect()
        }
    }

    /// Frames returned before falling back to the default frame.
    pub fn with_script(mut self, script: impl IntoIterator<Item = Option<LandmarkFrame>>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    pub fn with_fallback(mut self, fallback: Option<LandmarkFrame>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl LandmarkSource for ScriptedSource {
    fn probe(&mut self) -> Result<Capability, SourceError> {
        self.stats.probes.fetch_add(1, Ordering::SeqCst);
        self.capability
            .ok_or_else(|| SourceError::Unavailable("scripted probe failure".into()))
    }

    async fn detect(&mut self, _frame: FrameView<'_>) -> Option<LandmarkFrame> {
        self.stats.detects.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.stats);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.script.pop_front() {
            Some(frame) => frame,
            None => self.fallback.clone(),
        }
    }

    fn release(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// A face box filling the default guide zone exactly.
pub fn centered_face() -> BoundingBox {
    BoundingBox {
        x: 0.25,
        y: 0.15,
        width: 0.5,
        height: 0.6,
        confidence: 0.95,
        landmarks: None,
    }
}

/// A face box far larger than the guide zone.
pub fn oversized_face() -> BoundingBox {
    BoundingBox {
        x: 0.05,
        y: 0.05,
        width: 0.9,
        height: 0.9,
        confidence: 0.95,
        landmarks: None,
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    RgbImage::from_pixel(width, height, Rgb([200, 180, 160]))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
