use poise_core::{Thresholds, ThresholdsError};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// What a session does when no detector is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Wait for an explicit capture command.
    Manual,
    /// Capture after a fixed countdown.
    Countdown,
}

impl FallbackMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(FallbackMode::Manual),
            "countdown" => Some(FallbackMode::Countdown),
            _ => None,
        }
    }
}

/// Session configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Fixed polling interval of the sampling loop.
    pub sample_interval: Duration,
    /// Contiguous `perfect` time before an automatic capture.
    pub dwell_threshold: Duration,
    /// Delay before a countdown capture.
    pub countdown: Duration,
    pub fallback: FallbackMode,
    /// Optional TOML file overriding the default thresholds.
    pub thresholds_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            camera_width: 1280,
            camera_height: 720,
            model_dir: poise_core::default_model_dir(),
            sample_interval: Duration::from_millis(100),
            dwell_threshold: Duration::from_millis(2000),
            countdown: Duration::from_secs(3),
            fallback: FallbackMode::Manual,
            thresholds_path: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from `POISE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model_dir = std::env::var("POISE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);

        let fallback = match std::env::var("POISE_FALLBACK") {
            Ok(v) => FallbackMode::parse(&v).unwrap_or_else(|| {
                tracing::warn!(value = %v, "unknown POISE_FALLBACK; using manual");
                FallbackMode::Manual
            }),
            Err(_) => defaults.fallback,
        };

        Self {
            camera_device: std::env::var("POISE_CAMERA_DEVICE").unwrap_or(defaults.camera_device),
            camera_width: env_u32("POISE_CAMERA_WIDTH", defaults.camera_width),
            camera_height: env_u32("POISE_CAMERA_HEIGHT", defaults.camera_height),
            model_dir,
            sample_interval: Duration::from_millis(env_u64("POISE_SAMPLE_INTERVAL_MS", 100).max(1)),
            dwell_threshold: Duration::from_millis(env_u64("POISE_DWELL_THRESHOLD_MS", 2000)),
            countdown: Duration::from_secs(env_u64("POISE_COUNTDOWN_SECS", 3)),
            fallback,
            thresholds_path: std::env::var("POISE_THRESHOLDS").ok().map(PathBuf::from),
        }
    }

    /// Effective threshold table: the override file if set, else defaults.
    pub fn thresholds(&self) -> Result<Thresholds, ThresholdsError> {
        match &self.thresholds_path {
            Some(path) => Thresholds::load(path),
            None => Ok(Thresholds::default()),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
