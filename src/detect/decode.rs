//! Raw network output → candidate boxes in frame pixel space.
//!
//! Detector families disagree on output shape. A backend announces its
//! `OutputStyle` once at load time and the decoder is built for that style;
//! it never sniffs the shape per frame.

use anyhow::{anyhow, Result};

use super::result::{BBox, Candidate};

/// Column layout of a raw row. Geometry is always normalized
/// `[cx, cy, w, h]` in the first four columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowLayout {
    /// `[cx, cy, w, h, class scores…]`
    ScoresOnly,
    /// `[cx, cy, w, h, objectness, class scores…]`, confidence is the best class score.
    ObjectnessIgnored,
    /// `[cx, cy, w, h, objectness, class scores…]`, confidence is objectness × best class score.
    ObjectnessWeighted,
}

impl RowLayout {
    fn scores_offset(self) -> usize {
        match self {
            RowLayout::ScoresOnly => 4,
            RowLayout::ObjectnessIgnored | RowLayout::ObjectnessWeighted => 5,
        }
    }
}

/// Output convention of a loaded backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStyle {
    Rows(RowLayout),
    Corners,
}

/// Pre-decoded box in absolute frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
}

/// What a backend hands back for one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum RawOutput {
    /// One entry per output layer, each a list of rows.
    Rows(Vec<Vec<Vec<f32>>>),
    Corners(Vec<CornerBox>),
}

impl RawOutput {
    fn kind(&self) -> &'static str {
        match self {
            RawOutput::Rows(_) => "rows",
            RawOutput::Corners(_) => "corners",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BoxDecoder {
    style: OutputStyle,
}

impl BoxDecoder {
    pub fn new(style: OutputStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> OutputStyle {
        self.style
    }

    /// Decode `output` for a `frame_width`×`frame_height` frame, keeping only
    /// candidates whose confidence is strictly above `confidence_threshold`.
    pub fn decode(
        &self,
        output: &RawOutput,
        frame_width: u32,
        frame_height: u32,
        confidence_threshold: f32,
    ) -> Result<Vec<Candidate>> {
        match (self.style, output) {
            (OutputStyle::Rows(layout), RawOutput::Rows(layers)) => Ok(layers
                .iter()
                .flatten()
                .filter_map(|row| decode_row(row, layout, frame_width, frame_height))
                .filter(|cand| cand.confidence > confidence_threshold)
                .collect()),
            (OutputStyle::Corners, RawOutput::Corners(boxes)) => Ok(boxes
                .iter()
                .filter(|corner| corner.score > confidence_threshold)
                .map(decode_corner)
                .collect()),
            (style, output) => Err(anyhow!(
                "detector produced {} output but was loaded with {:?} style",
                output.kind(),
                style
            )),
        }
    }
}

fn decode_row(
    row: &[f32],
    layout: RowLayout,
    frame_width: u32,
    frame_height: u32,
) -> Option<Candidate> {
    let scores = row.get(layout.scores_offset()..)?;
    let (class_id, best) = argmax(scores)?;
    let confidence = match layout {
        RowLayout::ObjectnessWeighted => row[4] * best,
        RowLayout::ScoresOnly | RowLayout::ObjectnessIgnored => best,
    };

    let width = frame_width as f64;
    let height = frame_height as f64;
    let center_x = (row[0] as f64 * width) as i32;
    let center_y = (row[1] as f64 * height) as i32;
    let w = (row[2] as f64 * width) as i32;
    let h = (row[3] as f64 * height) as i32;
    let x = (center_x as f64 - w as f64 / 2.0) as i32;
    let y = (center_y as f64 - h as f64 / 2.0) as i32;

    Some(Candidate {
        class_id,
        confidence,
        bbox: BBox::new(x, y, w, h),
    })
}

fn decode_corner(corner: &CornerBox) -> Candidate {
    let x1 = corner.x1 as i32;
    let y1 = corner.y1 as i32;
    let x2 = corner.x2 as i32;
    let y2 = corner.y2 as i32;
    Candidate {
        class_id: corner.class_id,
        confidence: corner.score,
        bbox: BBox::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1)),
    }
}

/// Index and value of the first maximum. NaN scores never win.
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3_row(geom: [f32; 4], objectness: f32, scores: &[f32]) -> Vec<f32> {
        let mut row = geom.to_vec();
        row.push(objectness);
        row.extend_from_slice(scores);
        row
    }

    #[test]
    fn normalized_center_geometry_is_scaled_to_frame() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ObjectnessIgnored));
        let output = RawOutput::Rows(vec![vec![v3_row(
            [0.5, 0.25, 0.2, 0.1],
            0.9,
            &[0.1, 0.8, 0.3],
        )]]);
        let cands = decoder.decode(&output, 640, 480, 0.2)?;
        assert_eq!(cands.len(), 1);
        let cand = cands[0];
        assert_eq!(cand.class_id, 1);
        assert_eq!(cand.confidence, 0.8);
        // cx=320 cy=120 w=128 h=48
        assert_eq!(cand.bbox, BBox::new(256, 96, 128, 48));
        Ok(())
    }

    #[test]
    fn coordinates_truncate_toward_zero() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ScoresOnly));
        // cx = 5, w = 11 -> x = trunc(5 - 5.5) = 0
        let row = vec![0.078125, 0.078125, 0.171875, 0.171875, 0.9];
        let cands = decoder.decode(&RawOutput::Rows(vec![vec![row]]), 64, 64, 0.2)?;
        assert_eq!(cands[0].bbox, BBox::new(0, 0, 11, 11));
        Ok(())
    }

    #[test]
    fn boxes_are_not_clamped_to_the_frame() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ScoresOnly));
        let row = vec![0.96875, 0.015625, 0.25, 0.25, 0.9];
        let cands = decoder.decode(&RawOutput::Rows(vec![vec![row]]), 128, 128, 0.2)?;
        let bbox = cands[0].bbox;
        assert_eq!(bbox, BBox::new(108, -14, 32, 32));
        assert!(bbox.x + bbox.w > 128);
        Ok(())
    }

    #[test]
    fn threshold_drops_exactly_the_rows_at_or_below_it() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ScoresOnly));
        let scores = [0.1, 0.2, 0.2001, 0.5, 0.19999];
        let rows: Vec<Vec<f32>> = scores
            .iter()
            .map(|&score| vec![0.5, 0.5, 0.1, 0.1, score])
            .collect();
        let cands = decoder.decode(&RawOutput::Rows(vec![rows]), 100, 100, 0.2)?;
        let kept: Vec<f32> = cands.iter().map(|cand| cand.confidence).collect();
        assert_eq!(kept, vec![0.2001, 0.5]);
        Ok(())
    }

    #[test]
    fn objectness_weighting_multiplies_scores() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ObjectnessWeighted));
        let row = v3_row([0.5, 0.5, 0.1, 0.1], 0.5, &[0.0, 0.6]);
        let cands = decoder.decode(&RawOutput::Rows(vec![vec![row]]), 100, 100, 0.2)?;
        assert_eq!(cands.len(), 1);
        assert!((cands[0].confidence - 0.3).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn rows_from_every_layer_are_decoded() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ScoresOnly));
        let layer = |score: f32| vec![vec![0.5, 0.5, 0.1, 0.1, score]];
        let output = RawOutput::Rows(vec![layer(0.9), layer(0.1), layer(0.7)]);
        assert_eq!(decoder.decode(&output, 10, 10, 0.2)?.len(), 2);
        Ok(())
    }

    #[test]
    fn short_rows_are_skipped() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Rows(RowLayout::ObjectnessIgnored));
        let output = RawOutput::Rows(vec![vec![vec![0.5, 0.5, 0.1, 0.1, 0.9]]]);
        assert!(decoder.decode(&output, 10, 10, 0.2)?.is_empty());
        Ok(())
    }

    #[test]
    fn ties_pick_the_first_class() {
        assert_eq!(argmax(&[0.3, 0.7, 0.7]), Some((1, 0.7)));
        assert_eq!(argmax(&[f32::NAN, 0.1]), Some((1, 0.1)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn corners_become_xywh() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Corners);
        let output = RawOutput::Corners(vec![
            CornerBox {
                x1: 10.7,
                y1: 20.2,
                x2: 110.9,
                y2: 70.0,
                score: 0.9,
                class_id: 3,
            },
            CornerBox {
                x1: 0.0,
                y1: 0.0,
                x2: 5.0,
                y2: 5.0,
                score: 0.25,
                class_id: 1,
            },
        ]);
        let cands = decoder.decode(&output, 640, 480, 0.25)?;
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].class_id, 3);
        assert_eq!(cands[0].bbox, BBox::new(10, 20, 100, 50));
        Ok(())
    }

    #[test]
    fn extreme_corners_saturate() -> Result<()> {
        let decoder = BoxDecoder::new(OutputStyle::Corners);
        let output = RawOutput::Corners(vec![CornerBox {
            x1: -3e9,
            y1: 0.0,
            x2: 3e9,
            y2: f32::INFINITY,
            score: 0.9,
            class_id: 0,
        }]);
        let cands = decoder.decode(&output, 640, 480, 0.25)?;
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].bbox, BBox::new(i32::MIN, 0, i32::MAX, i32::MAX));
        Ok(())
    }

    #[test]
    fn mismatched_output_style_is_rejected() {
        let decoder = BoxDecoder::new(OutputStyle::Corners);
        let err = decoder
            .decode(&RawOutput::Rows(vec![]), 10, 10, 0.2)
            .unwrap_err();
        assert!(err.to_string().contains("rows output"));
    }
}
