//! Synthetic camera: a moving test pattern for demos and tests.

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::FrameSource;

/// Side of the moving square, in pixels.
const MARKER_SIZE: u32 = 48;

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        let name = name.into();
        log::info!("SyntheticSource: opened {} ({}x{})", name, width, height);
        Self {
            name,
            width: width.max(1),
            height: height.max(1),
            frame_count: 0,
            open: true,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    /// Mark the source as lost, as a device would after being unplugged.
    pub fn close(&mut self) {
        self.open = false;
    }

    fn render(&self) -> RgbImage {
        let span_x = self.width.saturating_sub(MARKER_SIZE).max(1) as u64;
        let span_y = self.height.saturating_sub(MARKER_SIZE).max(1) as u64;
        let marker_x = ((self.frame_count * 4) % span_x) as u32;
        let marker_y = ((self.frame_count * 3) % span_y) as u32;
        let shade = (self.frame_count % 64) as u8;

        RgbImage::from_fn(self.width, self.height, |x, y| {
            let inside = x >= marker_x
                && x < marker_x + MARKER_SIZE
                && y >= marker_y
                && y < marker_y + MARKER_SIZE;
            if inside {
                Rgb([230, 60, 40])
            } else {
                let gx = (x * 255 / self.width) as u8;
                let gy = (y * 255 / self.height) as u8;
                Rgb([gx / 2, gy / 2, 96u8.wrapping_add(shade)])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.open {
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(self.render()))
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
