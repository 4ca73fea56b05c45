//! The capture session record and the messages exchanged with the UI.

use chrono::{DateTime, Utc};
use poise_core::{AlignmentStatus, Capability, StillReport, Warning};
use poise_hw::Frame;
use serde::Serialize;
use uuid::Uuid;

/// How stills are triggered for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Live evaluation with automatic capture after the dwell threshold.
    Guided,
    /// User-initiated capture only.
    Manual,
    /// Fixed elapsed-time capture with no evaluation.
    Countdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing acquired yet.
    Permission,
    /// Idle, choosing between camera and upload.
    Select,
    CameraActive,
    Captured,
    Analyzing,
    Review,
    Confirmed,
}

/// Where a still came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StillOrigin {
    Guided,
    Manual,
    Countdown,
    Upload,
}

pub struct CapturedStill {
    pub frame: Frame,
    pub origin: StillOrigin,
}

/// Single owner of everything a capture flow knows about itself.
pub struct CaptureSession {
    pub id: Uuid,
    pub mode: CaptureMode,
    pub phase: Phase,
    pub captured: Option<CapturedStill>,
    pub review: Option<StillReport>,
    pub started_at: DateTime<Utc>,
}

impl CaptureSession {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            phase: Phase::Permission,
            captured: None,
            review: None,
            started_at: Utc::now(),
        }
    }

    /// Forget any still so the session can capture again.
    pub(crate) fn clear_still(&mut self) {
        self.captured = None;
        self.review = None;
    }
}

/// Snapshot published to the UI on every transition and sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveUpdate {
    pub phase: Phase,
    pub mode: Option<CaptureMode>,
    pub status: AlignmentStatus,
    /// Contiguous `perfect` time credited toward the automatic capture.
    pub dwell_ms: u64,
    pub countdown_remaining_ms: Option<u64>,
}

impl Default for LiveUpdate {
    fn default() -> Self {
        Self {
            phase: Phase::Permission,
            mode: None,
            status: AlignmentStatus::Initializing,
            dwell_ms: 0,
            countdown_remaining_ms: None,
        }
    }
}

/// User actions delivered to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Capture,
    Cancel,
}

/// How a sampling run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Captured(StillOrigin),
    Cancelled,
}

/// A still that passed the dimension gate, handed off after confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedStill {
    pub session_id: Uuid,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub origin: StillOrigin,
    pub capability: Capability,
    pub warnings: Vec<Warning>,
}

pub(crate) fn mode_for(capability: Capability, fallback: crate::FallbackMode) -> CaptureMode {
    match (capability.supports_guidance(), fallback) {
        (true, _) => CaptureMode::Guided,
        (false, crate::FallbackMode::Manual) => CaptureMode::Manual,
        (false, crate::FallbackMode::Countdown) => CaptureMode::Countdown,
    }
}
