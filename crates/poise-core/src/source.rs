//! Landmark sources: one interface over pose, face-mesh and face-box detectors.

use crate::detector::{DetectorError, FaceDetector};
use crate::types::{Capability, FrameView, LandmarkFrame};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// A detector wrapped behind a capability probe.
///
/// `probe` runs once per capture session and may load model state, which is
/// held until `release`. `detect` never fails loudly: a tick whose detection
/// could not run returns `None` and the caller keeps its previous status.
#[allow(async_fn_in_trait)]
pub trait LandmarkSource {
    fn probe(&mut self) -> Result<Capability, SourceError>;

    async fn detect(&mut self, frame: FrameView<'_>) -> Option<LandmarkFrame>;

    fn release(&mut self);
}

/// Platforms with no detector at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDetector;

impl LandmarkSource for NoDetector {
    fn probe(&mut self) -> Result<Capability, SourceError> {
        Ok(Capability::None)
    }

    async fn detect(&mut self, _frame: FrameView<'_>) -> Option<LandmarkFrame> {
        None
    }

    fn release(&mut self) {}
}

/// Run `infer` against a shared model on the blocking pool.
///
/// Dropping the returned future abandons the result but not the model: the
/// blocking run finishes on its own and the next call waits for the lock.
async fn run_blocking<M, T>(
    model: &Arc<Mutex<M>>,
    frame: FrameView<'_>,
    infer: fn(&mut M, FrameView<'_>) -> T,
) -> Result<T, JoinError>
where
    M: Send + 'static,
    T: Send + 'static,
{
    let model = Arc::clone(model);
    let (rgb, width, height) = (frame.rgb.to_vec(), frame.width, frame.height);
    tokio::task::spawn_blocking(move || {
        let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
        infer(&mut model, FrameView { rgb: &rgb, width, height })
    })
    .await
}

/// Face-box source backed by the SCRFD model.
///
/// Inference runs off the async task, so a caller racing `detect` against
/// other work gets control back as soon as that work is ready.
pub struct ScrfdSource {
    model_path: PathBuf,
    detector: Option<Arc<Mutex<FaceDetector>>>,
}

impl ScrfdSource {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            detector: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_some()
    }
}

impl LandmarkSource for ScrfdSource {
    fn probe(&mut self) -> Result<Capability, SourceError> {
        if self.detector.is_none() {
            let detector = FaceDetector::load(&self.model_path)?;
            self.detector = Some(Arc::new(Mutex::new(detector)));
        }
        Ok(Capability::FaceOnly)
    }

    async fn detect(&mut self, frame: FrameView<'_>) -> Option<LandmarkFrame> {
        let detector = self.detector.as_ref()?;
        match run_blocking(detector, frame, FaceDetector::detect).await {
            Ok(Ok(faces)) => {
                let count = faces.len();
                Some(match faces.into_iter().next() {
                    Some(best) => LandmarkFrame::face_box(count, best),
                    None => LandmarkFrame::empty(),
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "face detection failed for this frame");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "face detection task failed");
                None
            }
        }
    }

    fn release(&mut self) {
        if self.detector.take().is_some() {
            tracing::info!(path = %self.model_path.display(), "released SCRFD session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Counter {
        calls: u32,
    }

    fn slow_count(counter: &mut Counter, frame: FrameView<'_>) -> (u32, usize) {
        std::thread::sleep(Duration::from_millis(50));
        counter.calls += 1;
        (counter.calls, frame.rgb.len())
    }

    #[tokio::test]
    async fn test_abandoned_inference_keeps_model() {
        let model = Arc::new(Mutex::new(Counter { calls: 0 }));
        let rgb = vec![0u8; 12];
        let view = FrameView { rgb: &rgb, width: 2, height: 2 };

        // The caller gives up long before the blocking run is done.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            run_blocking(&model, view, slow_count),
        )
        .await;
        assert!(abandoned.is_err());

        let (calls, len) = run_blocking(&model, view, slow_count).await.unwrap();
        assert!(calls >= 1);
        assert_eq!(len, 12);

        // The abandoned run still completes against the same model.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(model.lock().unwrap().calls, 2);
    }

    #[tokio::test]
    async fn test_no_detector_reports_no_capability() {
        let mut source = NoDetector;
        assert_eq!(source.probe().unwrap(), Capability::None);
        let rgb = vec![0u8; 12];
        let view = FrameView { rgb: &rgb, width: 2, height: 2 };
        assert!(source.detect(view).await.is_none());
    }

    #[tokio::test]
    async fn test_scrfd_probe_fails_without_model() {
        let mut source = ScrfdSource::new("/nonexistent/det_10g.onnx");
        let err = source.probe().unwrap_err();
        assert!(matches!(err, SourceError::Detector(DetectorError::ModelNotFound(_))));
        assert!(!source.is_loaded());

        // Unprobed source yields no landmarks rather than an error.
        let rgb = vec![0u8; 12];
        let view = FrameView { rgb: &rgb, width: 2, height: 2 };
        assert!(source.detect(view).await.is_none());
        source.release();
    }
}
