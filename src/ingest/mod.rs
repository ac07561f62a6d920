//! Frame sources for the live session and the offline tool.
//!
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic test pattern (always available)
//!
//! A source hands out owned `RgbImage` frames; nothing here keeps a frame
//! after returning it.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::Deserialize;

pub use file::VideoFileSource;

/// A camera the live session can own and hand between threads.
pub type CameraHandle = Box<dyn FrameSource + Send>;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Anything that yields frames one at a time.
pub trait FrameSource {
    /// Human-readable identity for logs, e.g. `/dev/video0`.
    fn describe(&self) -> String;

    /// Next frame. `Ok(None)` means no frame right now (or end of file);
    /// `Err` is a read failure. Neither closes the source.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;

    /// False once the source can no longer produce frames.
    fn is_open(&self) -> bool;
}

/// Capture API tried when opening a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// V4L2, asking the driver for packed RGB first.
    V4l2,
    /// V4L2, asking for YUYV first. Most UVC webcams only stream YUYV or MJPEG.
    #[serde(rename = "v4l2-yuyv")]
    V4l2Yuyv,
    Synthetic,
}

impl CaptureBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureBackend::V4l2 => "v4l2",
            CaptureBackend::V4l2Yuyv => "v4l2-yuyv",
            CaptureBackend::Synthetic => "synthetic",
        }
    }
}

impl FromStr for CaptureBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v4l2" | "v4l" => Ok(CaptureBackend::V4l2),
            "v4l2-yuyv" | "yuyv" => Ok(CaptureBackend::V4l2Yuyv),
            "synthetic" | "stub" => Ok(CaptureBackend::Synthetic),
            other => Err(anyhow!("unknown capture backend '{}'", other)),
        }
    }
}

/// Requested capture geometry. Devices may pick something else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Open the first camera that works, trying every index on each backend in
/// order. The error lists every failed attempt.
pub fn open_camera(
    backends: &[CaptureBackend],
    indices: &[u32],
    capture: CaptureConfig,
) -> Result<CameraHandle> {
    let mut failures = Vec::new();
    for &backend in backends {
        for &index in indices {
            match open_device(backend, index, capture) {
                Ok(source) => {
                    log::info!(
                        "camera opened: backend={} index={} ({})",
                        backend.as_str(),
                        index,
                        source.describe()
                    );
                    return Ok(source);
                }
                Err(err) => {
                    log::debug!(
                        "camera open failed: backend={} index={}: {:#}",
                        backend.as_str(),
                        index,
                        err
                    );
                    failures.push(format!("{}:{}: {:#}", backend.as_str(), index, err));
                }
            }
        }
    }
    if failures.is_empty() {
        return Err(anyhow!("no capture backends or device indices configured"));
    }
    Err(anyhow!("no camera available ({})", failures.join("; ")))
}

fn open_device(
    backend: CaptureBackend,
    index: u32,
    capture: CaptureConfig,
) -> Result<CameraHandle> {
    match backend {
        CaptureBackend::Synthetic => Ok(Box::new(SyntheticSource::new(
            format!("synthetic://{}", index),
            capture.width,
            capture.height,
        ))),
        #[cfg(feature = "ingest-v4l2")]
        CaptureBackend::V4l2 | CaptureBackend::V4l2Yuyv => {
            let preferred_fourcc = match backend {
                CaptureBackend::V4l2Yuyv => *b"YUYV",
                _ => *b"RGB3",
            };
            let mut source = V4l2Source::new(v4l2::V4l2Config {
                device: format!("/dev/video{}", index),
                width: capture.width,
                height: capture.height,
                target_fps: capture.target_fps,
                preferred_fourcc,
            });
            source.connect()?;
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        CaptureBackend::V4l2 | CaptureBackend::V4l2Yuyv => Err(anyhow!(
            "{} capture requires the ingest-v4l2 feature",
            backend.as_str()
        )),
    }
}
