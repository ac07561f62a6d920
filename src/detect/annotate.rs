//! Box and label drawing onto a copy of the frame.

use image::{Rgb, RgbImage};

use super::classes::ColorTable;
use super::glyphs::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::result::Detection;

/// Box outline width in pixels.
pub const BOX_STROKE: i64 = 2;
/// Label baseline sits this far below the box's top edge.
pub const LABEL_OFFSET_Y: i64 = 20;
/// Pixel size of one glyph cell.
pub const LABEL_SCALE: i64 = 2;
/// Label text color, independent of the class color.
pub const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Return an annotated copy of `frame`. The input is left untouched.
pub fn annotate(frame: &RgbImage, detections: &[Detection], colors: &ColorTable) -> RgbImage {
    let mut canvas = frame.clone();
    for det in detections {
        let bbox = det.bbox();
        draw_box(
            &mut canvas,
            bbox.x as i64,
            bbox.y as i64,
            bbox.w as i64,
            bbox.h as i64,
            colors.color(det.class_id()),
        );
        draw_text(
            &mut canvas,
            bbox.x as i64,
            bbox.y as i64 + LABEL_OFFSET_Y,
            &label_text(det),
            LABEL_COLOR,
        );
    }
    canvas
}

/// `"<label> <confidence to two decimals>"`
pub fn label_text(det: &Detection) -> String {
    format!("{} {:.2}", det.label(), det.confidence())
}

fn draw_box(image: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, color: Rgb<u8>) {
    for inset in 0..BOX_STROKE {
        let left = x + inset;
        let top = y + inset;
        let right = x + w - inset;
        let bottom = y + h - inset;
        if right < left || bottom < top {
            break;
        }
        for px in left..=right {
            put(image, px, top, color);
            put(image, px, bottom, color);
        }
        for py in top..=bottom {
            put(image, left, py, color);
            put(image, right, py, color);
        }
    }
}

/// Draw `text` with its baseline at `baseline_y`, starting at `x`.
fn draw_text(image: &mut RgbImage, x: i64, baseline_y: i64, text: &str, color: Rgb<u8>) {
    let top = baseline_y - GLYPH_HEIGHT as i64 * LABEL_SCALE;
    let mut cursor = x;
    for ch in text.chars() {
        let rows = glyph(ch);
        for (row, &bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                let cell_x = cursor + col as i64 * LABEL_SCALE;
                let cell_y = top + row as i64 * LABEL_SCALE;
                for dy in 0..LABEL_SCALE {
                    for dx in 0..LABEL_SCALE {
                        put(image, cell_x + dx, cell_y + dy, color);
                    }
                }
            }
        }
        cursor += GLYPH_ADVANCE as i64 * LABEL_SCALE;
    }
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return;
    }
    image.put_pixel(x as u32, y as u32, color);
}
