//! Tunable constants shared by live guidance and still-image review.
//!
//! Every geometric rule reads its limit from [`Thresholds`]; nothing in the
//! evaluator hard-codes a number. A TOML file may override any subset of keys.

use crate::types::GuideZone;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const EDGE_MARGIN: f32 = 0.05;
pub const HEAD_CROP_Y: f32 = 0.03;
pub const MAX_TILT_RATIO: f32 = 0.15;
pub const MIN_VISIBILITY: f32 = 0.5;
pub const MAX_WRIST_DISTANCE: f32 = 0.25;
pub const MAX_GAZE_OFFSET: f32 = 0.15;
pub const MIN_IMAGE_WIDTH: u32 = 500;
pub const MIN_IMAGE_HEIGHT: u32 = 700;

pub const MIN_SHOULDER_WIDTH: f32 = 0.18;
pub const MAX_SHOULDER_WIDTH: f32 = 0.65;
pub const MAX_POSE_CENTER_OFFSET: f32 = 0.2;

pub const MIN_BOX_AREA_RATIO: f32 = 0.25;
pub const MAX_BOX_AREA_RATIO: f32 = 1.3;
pub const MAX_BOX_CENTER_OFFSET: f32 = 0.3;
pub const DEFAULT_GUIDE_ZONE: GuideZone = GuideZone {
    x: 0.25,
    y: 0.15,
    width: 0.5,
    height: 0.6,
};

#[derive(Error, Debug)]
pub enum ThresholdsError {
    #[error("failed to read thresholds file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid thresholds TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid threshold {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fraction of each dimension treated as the frame border.
    pub edge_margin: f32,
    /// Head landmarks above this normalized y count as cropped.
    pub head_crop_y: f32,
    /// Vertical eye offset over horizontal eye distance.
    pub max_tilt_ratio: f32,
    pub min_visibility: f32,
    /// Wrists further apart than this are not clasped.
    pub max_wrist_distance: f32,
    /// Nose offset from the cheek midpoint, as a fraction of face width.
    pub max_gaze_offset: f32,
    pub min_image_width: u32,
    pub min_image_height: u32,
    pub pose: PoseFraming,
    pub face_box: BoxFraming,
}

/// Size and centring limits for the pose skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseFraming {
    pub min_shoulder_width: f32,
    pub max_shoulder_width: f32,
    pub max_center_offset: f32,
}

/// Size and centring limits for the single-face box detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxFraming {
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
    pub max_center_offset: f32,
    pub guide: GuideZone,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            edge_margin: EDGE_MARGIN,
            head_crop_y: HEAD_CROP_Y,
            max_tilt_ratio: MAX_TILT_RATIO,
            min_visibility: MIN_VISIBILITY,
            max_wrist_distance: MAX_WRIST_DISTANCE,
            max_gaze_offset: MAX_GAZE_OFFSET,
            min_image_width: MIN_IMAGE_WIDTH,
            min_image_height: MIN_IMAGE_HEIGHT,
            pose: PoseFraming::default(),
            face_box: BoxFraming::default(),
        }
    }
}

impl Default for PoseFraming {
    fn default() -> Self {
        Self {
            min_shoulder_width: MIN_SHOULDER_WIDTH,
            max_shoulder_width: MAX_SHOULDER_WIDTH,
            max_center_offset: MAX_POSE_CENTER_OFFSET,
        }
    }
}

impl Default for BoxFraming {
    fn default() -> Self {
        Self {
            min_area_ratio: MIN_BOX_AREA_RATIO,
            max_area_ratio: MAX_BOX_AREA_RATIO,
            max_center_offset: MAX_BOX_CENTER_OFFSET,
            guide: DEFAULT_GUIDE_ZONE,
        }
    }
}

impl Thresholds {
    /// Parse a (possibly partial) TOML table; missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ThresholdsError> {
        let thresholds: Thresholds = toml::from_str(src)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn load(path: &Path) -> Result<Self, ThresholdsError> {
        let src = std::fs::read_to_string(path).map_err(|source| ThresholdsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let thresholds = Self::from_toml_str(&src)?;
        tracing::info!(path = %path.display(), "loaded threshold overrides");
        Ok(thresholds)
    }

    fn validate(&self) -> Result<(), ThresholdsError> {
        if !(0.0..0.5).contains(&self.edge_margin) {
            return Err(ThresholdsError::Invalid {
                field: "edge_margin",
                reason: format!("{} is outside [0, 0.5)", self.edge_margin),
            });
        }
        if self.pose.min_shoulder_width > self.pose.max_shoulder_width {
            return Err(ThresholdsError::Invalid {
                field: "pose.min_shoulder_width",
                reason: "greater than pose.max_shoulder_width".into(),
            });
        }
        if self.face_box.min_area_ratio > self.face_box.max_area_ratio {
            return Err(ThresholdsError::Invalid {
                field: "face_box.min_area_ratio",
                reason: "greater than face_box.max_area_ratio".into(),
            });
        }
        if self.face_box.guide.area() <= 0.0 {
            return Err(ThresholdsError::Invalid {
                field: "face_box.guide",
                reason: "guide zone has no area".into(),
            });
        }
        Ok(())
    }
}
