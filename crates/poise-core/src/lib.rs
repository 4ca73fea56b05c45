//! poise-core: Capture guidance engine.
//!
//! Evaluates body and face landmarks against framing rules, debounces the
//! result into a single automatic capture, and re-checks captured or
//! uploaded stills for the review checklist.

pub mod detector;
pub mod evaluator;
pub mod hysteresis;
pub mod source;
pub mod thresholds;
pub mod types;
pub mod validator;

pub use detector::{DetectorError, FaceDetector};
pub use evaluator::{evaluate_live, evaluate_still, Evaluator};
pub use hysteresis::{HysteresisState, HysteresisTrigger, TriggerEvent};
pub use source::{LandmarkSource, NoDetector, ScrfdSource, SourceError};
pub use thresholds::{Thresholds, ThresholdsError};
pub use types::{
    AlignmentStatus, BoundingBox, Capability, FaceLandmarks, FrameDims, FrameView, GuideZone,
    LandmarkFrame, LandmarkPoint, PoseLandmark, PoseLandmarks, Severity, Subject, Warning,
    WarningCategory, WarningKind,
};
pub use validator::{check_dimensions, decode_upload, validate_still, StillReport, ValidationError};

/// Default directory for ONNX model files.
///
/// Resolves to `$XDG_DATA_HOME/poise/models`, falling back to
/// `$HOME/.local/share/poise/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_dir.join("poise/models")
}
