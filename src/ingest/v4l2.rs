//! V4L2 camera source (`/dev/video{index}`).

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::normalize::{to_rgb_image, PixelFormat};
use super::FrameSource;

#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path, e.g. `/dev/video0`.
    pub device: String,
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Pixel format requested first; the driver may substitute its own.
    pub preferred_fourcc: [u8; 4],
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
            preferred_fourcc: *b"RGB3",
        }
    }
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<V4l2State>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
    consecutive_errors: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Read failures in a row before the device counts as lost.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            consecutive_errors: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(&self.config.preferred_fourcc);

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "{} delivers unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        self.consecutive_errors = 0;

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let captured = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
                .and_then(|(buf, _meta)| to_rgb_image(buf, width, height, format))
        });

        match captured {
            Ok(frame) => {
                self.frame_count += 1;
                self.consecutive_errors = 0;
                Ok(Some(frame))
            }
            Err(err) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    log::warn!(
                        "V4l2Source: {} lost after {} failed reads",
                        self.config.device,
                        self.consecutive_errors
                    );
                    self.state = None;
                }
                Err(err)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_connect() {
        let mut source = V4l2Source::new(V4l2Config {
            device: "/dev/video250".to_string(),
            ..V4l2Config::default()
        });
        assert!(source.connect().is_err());
        assert!(!source.is_open());
        assert!(source.read_frame().is_err());
    }
}
