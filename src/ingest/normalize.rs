use anyhow::{anyhow, Result};
use image::RgbImage;

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per two pixels.
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }
}

pub(crate) fn to_rgb_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage> {
    let rgb = match format {
        PixelFormat::Rgb24 => {
            let expected = frame_len(width, height, 3)?;
            // Drivers may pad the buffer past the image.
            pixels
                .get(..expected)
                .ok_or_else(|| {
                    anyhow!(
                        "RGB frame too short: expected {}, got {}",
                        expected,
                        pixels.len()
                    )
                })?
                .to_vec()
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height)?,
    };
    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))
}

fn frame_len(width: u32, height: u32, bytes_per_pixel: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(bytes_per_pixel))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frame width must be even, got {}", width));
    }
    let expected = frame_len(width, height, 2)?;
    let packed = pixels.get(..expected).ok_or_else(|| {
        anyhow!(
            "YUYV frame too short: expected {}, got {}",
            expected,
            pixels.len()
        )
    })?;

    let mut rgb = Vec::with_capacity(frame_len(width, height, 3)?);
    for chunk in packed.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
