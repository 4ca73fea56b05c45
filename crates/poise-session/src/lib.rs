//! poise-session: Capture session controller.
//!
//! Runs one capture flow at a time: camera acquisition, fixed-interval
//! sampling with automatic or user-initiated capture, post-capture review
//! and hand-off of the confirmed still.

pub mod config;
pub mod controller;
pub mod session;

pub use config::{FallbackMode, SessionConfig};
pub use controller::{CaptureController, SessionError};
pub use session::{
    CaptureCommand, CaptureMode, CaptureSession, CapturedStill, LiveUpdate, Phase, RunOutcome,
    StillOrigin, ValidatedStill,
};
