//! poise-hw: Camera acquisition for live capture guidance.
//!
//! Provides V4L2-based camera access producing RGB frames, plus the
//! `VideoSource` / `CameraProvider` seams the session controller drives.

pub mod camera;
pub mod frame;

pub use camera::{
    AcquireFailure, CameraError, CameraProvider, DeviceInfo, PixelFormat, V4lCamera, V4lProvider,
    VideoSource,
};
pub use frame::{Frame, FrameError};
