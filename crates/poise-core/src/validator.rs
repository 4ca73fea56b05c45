//! Post-capture validation of a single still.
//!
//! The dimension gate runs before anything else; only images that pass it
//! reach the detector and the still-image evaluator. The resulting warnings
//! are advisory and never block the caller.

use crate::evaluator::Evaluator;
use crate::source::LandmarkSource;
use crate::thresholds::Thresholds;
use crate::types::{Capability, FrameDims, FrameView, Severity, Warning, WarningKind};
use image::{ImageReader, RgbImage};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("image is {width}x{height}, minimum is {min_width}x{min_height}")]
    TooSmall {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

impl ValidationError {
    /// The checklist entry to show for a rejected image, if any.
    pub fn warning(&self) -> Option<Warning> {
        match self {
            ValidationError::TooSmall { .. } => Some(Warning::from(WarningKind::ImageTooSmall)),
            _ => None,
        }
    }
}

/// Review checklist for one still.
#[derive(Debug, Clone, Serialize)]
pub struct StillReport {
    pub dims: FrameDims,
    pub capability: Capability,
    /// False when no detector ran, so only the dimension gate was applied.
    pub analyzed: bool,
    pub warnings: Vec<Warning>,
}

impl StillReport {
    pub fn has_errors(&self) -> bool {
        self.warnings.iter().any(|w| w.severity == Severity::Error)
    }
}

/// Minimum-resolution gate shared by live capture and uploads.
pub fn check_dimensions(width: u32, height: u32, t: &Thresholds) -> Result<(), ValidationError> {
    if width < t.min_image_width || height < t.min_image_height {
        return Err(ValidationError::TooSmall {
            width,
            height,
            min_width: t.min_image_width,
            min_height: t.min_image_height,
        });
    }
    Ok(())
}

/// Decode an uploaded file, rejecting it on the header dimensions before
/// any pixel data is decoded.
pub fn decode_upload(bytes: &[u8], t: &Thresholds) -> Result<RgbImage, ValidationError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    check_dimensions(width, height, t)?;
    let image = image::load_from_memory(bytes)?.to_rgb8();
    tracing::debug!(width, height, "decoded upload");
    Ok(image)
}

/// Gate, detect and evaluate a still.
pub async fn validate_still<S: LandmarkSource>(
    frame: FrameView<'_>,
    capability: Capability,
    source: &mut S,
    evaluator: &Evaluator,
) -> Result<StillReport, ValidationError> {
    check_dimensions(frame.width, frame.height, evaluator.thresholds())?;
    let dims = frame.dims();

    let mut report = StillReport {
        dims,
        capability,
        analyzed: false,
        warnings: Vec::new(),
    };
    if !capability.supports_guidance() {
        return Ok(report);
    }

    match source.detect(frame).await {
        Some(landmarks) => {
            report.warnings = evaluator.evaluate_still(&landmarks, dims);
            report.analyzed = true;
        }
        None => tracing::warn!("detector produced no result for still; skipping geometric checks"),
    }
    tracing::info!(
        width = dims.width,
        height = dims.height,
        warnings = report.warnings.len(),
        "still validated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::fixtures;
    use crate::source::SourceError;
    use crate::types::{LandmarkFrame, LandmarkPoint, PoseLandmark};
    use image::ImageFormat;

    /// Returns a fixed frame and counts calls.
    struct Scripted {
        frame: Option<LandmarkFrame>,
        calls: usize,
    }

    impl LandmarkSource for Scripted {
        fn probe(&mut self) -> Result<Capability, SourceError> {
            Ok(Capability::PoseAndFace)
        }

        async fn detect(&mut self, _frame: FrameView<'_>) -> Option<LandmarkFrame> {
            self.calls += 1;
            self.frame.clone()
        }

        fn release(&mut self) {}
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_dimension_gate() {
        let t = Thresholds::default();
        assert!(check_dimensions(500, 700, &t).is_ok());
        assert!(check_dimensions(499, 700, &t).is_err());
        assert!(check_dimensions(500, 699, &t).is_err());
        let err = check_dimensions(400, 600, &t).unwrap_err();
        assert_eq!(err.warning().unwrap().kind, WarningKind::ImageTooSmall);
    }

    #[tokio::test]
    async fn test_small_still_never_reaches_detector() {
        let rgb = vec![0u8; 400 * 600 * 3];
        let view = FrameView { rgb: &rgb, width: 400, height: 600 };
        let mut source = Scripted { frame: Some(fixtures::good_frame()), calls: 0 };
        let evaluator = Evaluator::default();
        let result = validate_still(view, Capability::PoseAndFace, &mut source, &evaluator).await;
        assert!(matches!(result, Err(ValidationError::TooSmall { width: 400, height: 600, .. })));
        assert_eq!(source.calls, 0);
    }

    #[tokio::test]
    async fn test_still_lists_all_warnings() {
        let mut pose =
            fixtures::good_pose().with(PoseLandmark::Nose, LandmarkPoint::new(0.5, 0.02));
        pose.remove(PoseLandmark::LeftWrist);
        pose.remove(PoseLandmark::RightWrist);
        let frame = LandmarkFrame::pose(1, pose, None);

        let rgb = vec![0u8; 600 * 800 * 3];
        let view = FrameView { rgb: &rgb, width: 600, height: 800 };
        let mut source = Scripted { frame: Some(frame), calls: 0 };
        let evaluator = Evaluator::default();
        let report = validate_still(view, Capability::PoseAndFace, &mut source, &evaluator)
            .await
            .unwrap();
        assert!(report.analyzed);
        assert!(report.has_errors());
        let kinds: Vec<_> = report.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::HeadCropped, WarningKind::HandsNotVisible]);
    }

    #[tokio::test]
    async fn test_no_capability_only_gates() {
        let rgb = vec![0u8; 600 * 800 * 3];
        let view = FrameView { rgb: &rgb, width: 600, height: 800 };
        let mut source = Scripted { frame: Some(LandmarkFrame::empty()), calls: 0 };
        let report = validate_still(view, Capability::None, &mut source, &Evaluator::default())
            .await
            .unwrap();
        assert!(!report.analyzed);
        assert!(report.warnings.is_empty());
        assert_eq!(source.calls, 0);
    }

    #[tokio::test]
    async fn test_failed_detection_is_not_an_error() {
        let rgb = vec![0u8; 600 * 800 * 3];
        let view = FrameView { rgb: &rgb, width: 600, height: 800 };
        let mut source = Scripted { frame: None, calls: 0 };
        let report = validate_still(view, Capability::FaceOnly, &mut source, &Evaluator::default())
            .await
            .unwrap();
        assert!(!report.analyzed);
        assert_eq!(source.calls, 1);
    }

    #[test]
    fn test_decode_upload_gates_on_header() {
        let t = Thresholds::default();
        let err = decode_upload(&png(400, 600), &t).unwrap_err();
        assert!(matches!(err, ValidationError::TooSmall { .. }));

        let image = decode_upload(&png(600, 800), &t).unwrap();
        assert_eq!(image.dimensions(), (600, 800));
    }

    #[test]
    fn test_decode_upload_rejects_garbage() {
        let err = decode_upload(b"definitely not an image", &Thresholds::default()).unwrap_err();
        assert!(matches!(err, ValidationError::Decode(_)));
    }
}
