//! Capture session controller.
//!
//! Owns the camera, the sampling interval, the hysteresis trigger and the
//! still under review. All of it lives on one task: sampling ticks and user
//! commands are multiplexed with `tokio::select!`, and each detection is
//! awaited inline so at most one is ever in flight. Ticks that come due
//! while a detection is running are skipped, not queued, and a user
//! command drops the in-flight detection.

use crate::config::SessionConfig;
use crate::session::{
    mode_for, CaptureCommand, CaptureMode, CaptureSession, CapturedStill, LiveUpdate, Phase,
    RunOutcome, StillOrigin, ValidatedStill,
};
use poise_core::{
    decode_upload, validate_still, AlignmentStatus, Capability, Evaluator, FrameDims,
    HysteresisState, HysteresisTrigger, LandmarkSource, StillReport, Thresholds, TriggerEvent,
    ValidationError,
};
use poise_hw::{AcquireFailure, CameraError, CameraProvider, Frame, FrameError, VideoSource};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

const JPEG_QUALITY: u8 = 92;

/// Consecutive failed grabs tolerated before the camera counts as lost.
const MAX_GRAB_FAILURES: u32 = 10;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera unavailable ({reason:?}): {source}")]
    CameraUnavailable {
        reason: AcquireFailure,
        #[source]
        source: CameraError,
    },
    #[error("camera failed during capture: {0}")]
    Camera(#[source] CameraError),
    #[error("camera stopped delivering frames after {0} attempts")]
    CameraStalled(u32),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not encode still: {0}")]
    Encode(#[from] FrameError),
    #[error("cannot {action} while {phase:?}")]
    InvalidPhase { action: &'static str, phase: Phase },
}

impl SessionError {
    /// User-facing reason code when the camera could not be acquired.
    pub fn acquire_failure(&self) -> Option<AcquireFailure> {
        match self {
            SessionError::CameraUnavailable { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Resources held only while in `CameraActive`. Dropping it stops sampling
/// and releases the camera.
struct ActiveCapture<C: VideoSource> {
    camera: C,
    interval: Interval,
    /// Present in guided mode only.
    trigger: Option<HysteresisTrigger>,
    started: Instant,
    last_status: AlignmentStatus,
    grab_failures: u32,
}

impl<C: VideoSource> Drop for ActiveCapture<C> {
    fn drop(&mut self) {
        self.camera.release();
    }
}

enum Tick {
    Idle,
    Fire(StillOrigin, Option<Frame>),
}

/// A command that arrived while a detection was in flight preempts it.
enum Event {
    Command(Option<CaptureCommand>),
    Sampled(Result<Tick, SessionError>),
}

pub struct CaptureController<P: CameraProvider, S: LandmarkSource> {
    config: SessionConfig,
    evaluator: Evaluator,
    provider: P,
    source: S,
    capability: Option<Capability>,
    session: CaptureSession,
    active: Option<ActiveCapture<P::Camera>>,
    updates: watch::Sender<LiveUpdate>,
}

impl<P: CameraProvider, S: LandmarkSource> CaptureController<P, S> {
    pub fn new(config: SessionConfig, thresholds: Thresholds, provider: P, source: S) -> Self {
        let (updates, _) = watch::channel(LiveUpdate::default());
        Self {
            config,
            evaluator: Evaluator::new(thresholds),
            provider,
            source,
            capability: None,
            session: CaptureSession::new(CaptureMode::Manual),
            active: None,
            updates,
        }
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn mode(&self) -> CaptureMode {
        self.session.mode
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// True while the camera is held and the interval is armed.
    pub fn is_sampling(&self) -> bool {
        self.active.is_some()
    }

    /// Dimensions of the active camera stream.
    pub fn camera_dims(&self) -> Option<FrameDims> {
        self.active.as_ref().map(|a| a.camera.dims())
    }

    /// Trigger state of the running guided session.
    pub fn hysteresis(&self) -> Option<&HysteresisState> {
        self.active.as_ref()?.trigger.as_ref().map(HysteresisTrigger::state)
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveUpdate> {
        self.updates.subscribe()
    }

    /// Probe the landmark source once. A failed probe counts as no
    /// capability for the rest of this controller's life.
    pub fn capability(&mut self) -> Capability {
        if let Some(capability) = self.capability {
            return capability;
        }
        let capability = match self.source.probe() {
            Ok(capability) => capability,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = ?self.config.fallback,
                    "landmark source unavailable; guidance disabled"
                );
                Capability::None
            }
        };
        tracing::info!(capability = ?capability, "landmark capability resolved");
        self.capability = Some(capability);
        capability
    }

    /// Acquire the camera and start sampling. Must be called from within a
    /// tokio runtime.
    ///
    /// On acquisition failure the controller returns to `Select` and the
    /// error carries the reason code to show the user.
    pub fn start_camera(&mut self) -> Result<CaptureMode, SessionError> {
        match self.session.phase {
            Phase::Permission | Phase::Select => self.begin_session(),
            phase => {
                return Err(SessionError::InvalidPhase {
                    action: "start the camera",
                    phase,
                })
            }
        }
        self.activate()?;
        Ok(self.session.mode)
    }

    /// Drive the sampling loop until a still is captured, the user cancels,
    /// or the camera fails. Every exit leaves `CameraActive` with the camera
    /// released. A closed command channel counts as cancel.
    pub async fn run(
        &mut self,
        commands: &mut mpsc::Receiver<CaptureCommand>,
    ) -> Result<RunOutcome, SessionError> {
        if self.session.phase != Phase::CameraActive || self.active.is_none() {
            return Err(SessionError::InvalidPhase {
                action: "sample",
                phase: self.session.phase,
            });
        }

        loop {
            let event = tokio::select! {
                biased;
                command = commands.recv() => Event::Command(command),
                _ = next_tick(&mut self.active) => tokio::select! {
                    biased;
                    command = commands.recv() => Event::Command(command),
                    sampled = self.sample() => Event::Sampled(sampled),
                },
            };

            match event {
                Event::Command(Some(CaptureCommand::Capture)) => {
                    return self.capture(StillOrigin::Manual, None)
                }
                Event::Command(Some(CaptureCommand::Cancel) | None) => {
                    self.cancel();
                    return Ok(RunOutcome::Cancelled);
                }
                Event::Sampled(Ok(Tick::Idle)) => {}
                Event::Sampled(Ok(Tick::Fire(origin, frame))) => return self.capture(origin, frame),
                Event::Sampled(Err(e)) => {
                    tracing::warn!(session = %self.session.id, error = %e, "sampling aborted");
                    self.teardown(Phase::Select);
                    return Err(e);
                }
            }
        }
    }

    /// Run the post-capture validator over the captured still.
    ///
    /// A still that fails the dimension gate is discarded and the
    /// controller returns to `Select`; otherwise it moves to `Review`.
    pub async fn analyze(&mut self) -> Result<StillReport, SessionError> {
        if self.session.phase != Phase::Captured {
            return Err(SessionError::InvalidPhase {
                action: "analyze",
                phase: self.session.phase,
            });
        }
        self.set_phase(Phase::Analyzing);

        let capability = self.capability.unwrap_or(Capability::None);
        let result = match self.session.captured.as_ref() {
            Some(still) => {
                let view = still.frame.view();
                validate_still(view, capability, &mut self.source, &self.evaluator).await
            }
            None => {
                self.set_phase(Phase::Select);
                return Err(SessionError::InvalidPhase {
                    action: "analyze",
                    phase: Phase::Captured,
                });
            }
        };

        match result {
            Ok(report) => {
                self.session.review = Some(report.clone());
                self.set_phase(Phase::Review);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(session = %self.session.id, error = %e, "still rejected");
                self.session.clear_still();
                self.set_phase(Phase::Select);
                Err(e.into())
            }
        }
    }

    /// Accept an uploaded image in place of a camera capture.
    ///
    /// The dimension gate runs on the image header first; a rejected upload
    /// leaves the controller where it was and never reaches the detector.
    pub async fn submit_upload(&mut self, bytes: &[u8]) -> Result<StillReport, SessionError> {
        let phase = self.session.phase;
        if !matches!(
            phase,
            Phase::Permission | Phase::Select | Phase::Captured | Phase::Review
        ) {
            return Err(SessionError::InvalidPhase {
                action: "accept an upload",
                phase,
            });
        }

        let image = decode_upload(bytes, self.evaluator.thresholds())?;
        if matches!(phase, Phase::Permission | Phase::Select) {
            self.begin_session();
        }
        self.session.review = None;
        self.session.captured = Some(CapturedStill {
            frame: Frame::from_rgb_image(image, 0),
            origin: StillOrigin::Upload,
        });
        self.set_phase(Phase::Captured);
        tracing::info!(session = %self.session.id, "upload accepted");
        self.analyze().await
    }

    /// Discard the still and go back to the camera with a freshly armed
    /// trigger. The capability probe is not repeated.
    pub fn retake(&mut self) -> Result<(), SessionError> {
        match self.session.phase {
            Phase::Captured | Phase::Review => {}
            phase => {
                return Err(SessionError::InvalidPhase {
                    action: "retake",
                    phase,
                })
            }
        }
        self.session.clear_still();
        tracing::info!(session = %self.session.id, "retake requested");
        self.activate()
    }

    /// Hand off the reviewed still. Releases the detector; the controller
    /// is finished afterwards.
    pub fn confirm(&mut self) -> Result<ValidatedStill, SessionError> {
        let (Phase::Review, Some(still), Some(report)) = (
            self.session.phase,
            self.session.captured.as_ref(),
            self.session.review.as_ref(),
        ) else {
            return Err(SessionError::InvalidPhase {
                action: "confirm",
                phase: self.session.phase,
            });
        };

        let validated = ValidatedStill {
            session_id: self.session.id,
            jpeg: still.frame.encode_jpeg(JPEG_QUALITY)?,
            width: still.frame.width,
            height: still.frame.height,
            origin: still.origin,
            capability: report.capability,
            warnings: report.warnings.clone(),
        };

        self.source.release();
        self.set_phase(Phase::Confirmed);
        tracing::info!(
            session = %validated.session_id,
            origin = ?validated.origin,
            bytes = validated.jpeg.len(),
            warnings = validated.warnings.len(),
            "still confirmed"
        );
        Ok(validated)
    }

    /// Abandon the current attempt and return to `Select`.
    pub fn cancel(&mut self) {
        if self.session.phase == Phase::Confirmed {
            return;
        }
        self.session.clear_still();
        self.teardown(Phase::Select);
        tracing::info!(session = %self.session.id, "capture cancelled");
    }

    /// Tear the session down and free every resource it holds.
    pub fn end(mut self) {
        self.cancel();
    }

    fn begin_session(&mut self) {
        let mode = mode_for(self.capability(), self.config.fallback);
        let phase = self.session.phase;
        self.session = CaptureSession::new(mode);
        self.session.phase = phase;
        tracing::info!(session = %self.session.id, mode = ?mode, "capture session started");
    }

    /// Enter `CameraActive`: camera, interval and trigger are acquired together.
    fn activate(&mut self) -> Result<(), SessionError> {
        let camera = match self.provider.acquire() {
            Ok(camera) => camera,
            Err(source) => {
                let reason = source.reason();
                tracing::warn!(
                    session = %self.session.id,
                    reason = ?reason,
                    error = %source,
                    "camera acquisition failed"
                );
                self.set_phase(Phase::Select);
                return Err(SessionError::CameraUnavailable { reason, source });
            }
        };

        let mode = self.session.mode;
        let mut interval = tokio::time::interval(self.config.sample_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let trigger = (mode == CaptureMode::Guided).then(|| {
            HysteresisTrigger::new(self.config.sample_interval, self.config.dwell_threshold)
        });
        let status = match mode {
            CaptureMode::Guided => AlignmentStatus::Initializing,
            CaptureMode::Manual | CaptureMode::Countdown => AlignmentStatus::Manual,
        };
        let dims = camera.dims();

        self.active = Some(ActiveCapture {
            camera,
            interval,
            trigger,
            started: Instant::now(),
            last_status: status,
            grab_failures: 0,
        });
        self.session.phase = Phase::CameraActive;
        tracing::info!(
            session = %self.session.id,
            mode = ?mode,
            width = dims.width,
            height = dims.height,
            "camera active"
        );
        let countdown = (mode == CaptureMode::Countdown).then(|| millis(self.config.countdown));
        self.publish(status, 0, countdown);
        Ok(())
    }

    /// One sampling tick.
    async fn sample(&mut self) -> Result<Tick, SessionError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(Tick::Idle);
        };

        match self.session.mode {
            CaptureMode::Manual => Ok(Tick::Idle),
            CaptureMode::Countdown => {
                let remaining = self.config.countdown.saturating_sub(active.started.elapsed());
                if remaining.is_zero() {
                    return Ok(Tick::Fire(StillOrigin::Countdown, None));
                }
                self.publish(AlignmentStatus::Manual, 0, Some(millis(remaining)));
                Ok(Tick::Idle)
            }
            CaptureMode::Guided => {
                let frame = match active.camera.grab_frame() {
                    Ok(frame) => {
                        active.grab_failures = 0;
                        frame
                    }
                    Err(e) => {
                        active.grab_failures += 1;
                        tracing::warn!(
                            error = %e,
                            failures = active.grab_failures,
                            "frame grab failed; keeping previous status"
                        );
                        if active.grab_failures >= MAX_GRAB_FAILURES {
                            return Err(SessionError::CameraStalled(active.grab_failures));
                        }
                        return Ok(Tick::Idle);
                    }
                };

                let Some(landmarks) = self.source.detect(frame.view()).await else {
                    tracing::debug!(
                        status = %active.last_status,
                        "detection unavailable; status retained"
                    );
                    return Ok(Tick::Idle);
                };
                let status = self.evaluator.evaluate_live(&landmarks, frame.dims());
                active.last_status = status;

                let (event, dwell_ms) = match active.trigger.as_mut() {
                    Some(trigger) => {
                        let event = trigger.observe(status);
                        (event, trigger.state().dwell_ms)
                    }
                    None => (TriggerEvent::Waiting, 0),
                };
                tracing::debug!(status = %status, dwell_ms, "sample");
                self.publish(status, dwell_ms, None);

                if event == TriggerEvent::Fired {
                    tracing::info!(
                        session = %self.session.id,
                        dwell_ms,
                        "automatic capture triggered"
                    );
                    return Ok(Tick::Fire(StillOrigin::Guided, Some(frame)));
                }
                Ok(Tick::Idle)
            }
        }
    }

    fn capture(
        &mut self,
        origin: StillOrigin,
        frame: Option<Frame>,
    ) -> Result<RunOutcome, SessionError> {
        let frame = match frame {
            Some(frame) => frame,
            None => {
                let grabbed = match self.active.as_mut() {
                    Some(active) => active.camera.grab_frame(),
                    None => Err(CameraError::Released),
                };
                match grabbed {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(session = %self.session.id, error = %e, "capture failed");
                        self.teardown(Phase::Select);
                        return Err(SessionError::Camera(e));
                    }
                }
            }
        };

        self.teardown(Phase::Captured);
        tracing::info!(
            session = %self.session.id,
            origin = ?origin,
            width = frame.width,
            height = frame.height,
            "still captured"
        );
        self.session.captured = Some(CapturedStill { frame, origin });
        Ok(RunOutcome::Captured(origin))
    }

    /// Leave `CameraActive`. Stops the interval and releases the camera in
    /// the same step.
    fn teardown(&mut self, next: Phase) {
        if self.active.take().is_some() {
            tracing::debug!(session = %self.session.id, "sampling stopped");
        }
        self.set_phase(next);
    }

    fn set_phase(&mut self, phase: Phase) {
        self.session.phase = phase;
        let mode = self.session.mode;
        self.updates.send_modify(|update| {
            update.phase = phase;
            update.mode = Some(mode);
            update.countdown_remaining_ms = None;
        });
    }

    fn publish(&self, status: AlignmentStatus, dwell_ms: u64, countdown_remaining_ms: Option<u64>) {
        self.updates.send_replace(LiveUpdate {
            phase: self.session.phase,
            mode: Some(self.session.mode),
            status,
            dwell_ms,
            countdown_remaining_ms,
        });
    }
}

impl<P: CameraProvider, S: LandmarkSource> Drop for CaptureController<P, S> {
    fn drop(&mut self) {
        self.active = None;
        self.source.release();
    }
}

async fn next_tick<C: VideoSource>(active: &mut Option<ActiveCapture<C>>) {
    match active {
        Some(active) => {
            active.interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
