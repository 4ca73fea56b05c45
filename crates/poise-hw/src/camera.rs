//! Camera acquisition: the `VideoSource` seam and its V4L2 implementation.

use crate::frame::{self, Frame};
use poise_core::FrameDims;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("camera already released")]
    Released,
}

/// User-facing reason a camera could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireFailure {
    Denied,
    NotFound,
    Other,
}

impl CameraError {
    pub fn reason(&self) -> AcquireFailure {
        match self {
            CameraError::PermissionDenied(_) => AcquireFailure::Denied,
            CameraError::DeviceNotFound(_) => AcquireFailure::NotFound,
            _ => AcquireFailure::Other,
        }
    }
}

/// A live camera stream owned by one capture session.
pub trait VideoSource {
    fn dims(&self) -> FrameDims;

    /// Grab the most recent frame on demand.
    fn grab_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop the stream and free the device. Idempotent.
    fn release(&mut self);
}

/// Opens cameras on behalf of the session controller.
pub trait CameraProvider {
    type Camera: VideoSource;

    fn acquire(&mut self) -> Result<Self::Camera, CameraError>;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpeg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb3),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }

    /// Convert one dequeued buffer to packed RGB.
    fn to_rgb(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let convert = |e: frame::FrameError| CameraError::CaptureFailed(e.to_string());
        match self {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height).map_err(convert),
            PixelFormat::Rgb3 => {
                let expected = width as usize * height as usize * 3;
                buf.get(..expected).map(<[u8]>::to_vec).ok_or_else(|| {
                    CameraError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    ))
                })
            }
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(buf)
                .map(|image| image.into_raw())
                .map_err(convert),
        }
    }
}

/// Buffers queued with the driver while streaming.
const STREAM_BUFFERS: u32 = 4;

/// Longest wait for a frame before a grab counts as failed.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// V4L2 camera device handle.
///
/// The mmap stream is started once on open and stays on until release, so
/// each grab only dequeues the next buffer.
pub struct V4lCamera {
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

fn map_open_error(device_path: &str, e: io::Error) -> CameraError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(device_path.to_string()),
        io::ErrorKind::NotFound => CameraError::DeviceNotFound(device_path.to_string()),
        _ if e.raw_os_error() == Some(EBUSY) => CameraError::DeviceBusy,
        _ => CameraError::Open {
            path: device_path.to_string(),
            source: e,
        },
    }
}

const EBUSY: i32 = 16;

impl V4lCamera {
    /// Open a V4L2 device and negotiate the requested resolution.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| map_open_error(device_path, e))?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, RGB3, or MJPG)",
                negotiated.fourcc
            ))
        })?;

        let mut stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera opened"
        );

        Ok(Self {
            stream: Some(stream),
            device: Some(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card.clone(),
                        driver: caps.driver.clone(),
                        bus: caps.bus.clone(),
                    })
            })
            .collect()
    }
}

impl VideoSource for V4lCamera {
    fn dims(&self) -> FrameDims {
        FrameDims::new(self.width, self.height)
    }

    fn grab_frame(&mut self) -> Result<Frame, CameraError> {
        let (pixel_format, width, height) = (self.pixel_format, self.width, self.height);
        let stream = self.stream.as_mut().ok_or(CameraError::Released)?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        let data = pixel_format.to_rgb(buf, width, height)?;

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    fn release(&mut self) {
        // Stream off before the device handle goes.
        drop(self.stream.take());
        if self.device.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }
}

impl Drop for V4lCamera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens a fixed V4L2 device path at a requested resolution.
#[derive(Debug, Clone)]
pub struct V4lProvider {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
}

impl CameraProvider for V4lProvider {
    type Camera = V4lCamera;

    fn acquire(&mut self) -> Result<V4lCamera, CameraError> {
        V4lCamera::open(&self.device_path, self.width, self.height)
    }
}
