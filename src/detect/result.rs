//! Detection result types shared by the decoder, suppressor and annotator.

use serde::Serialize;

/// Axis-aligned box in pixel coordinates of the source frame.
///
/// Coordinates may be negative or extend past the frame edge; nothing
/// clamps them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BBox {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w.max(0) as f32 * self.h.max(0) as f32
    }

    /// Right and bottom edges as `i64`; `x + w` can exceed `i32::MAX`.
    fn edges(&self) -> (i64, i64, i64, i64) {
        let x = self.x as i64;
        let y = self.y as i64;
        (x, y, x + self.w as i64, y + self.h as i64)
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let (ax1, ay1, ax2, ay2) = self.edges();
        let (bx1, by1, bx2, by2) = other.edges();
        let left = ax1.max(bx1);
        let top = ay1.max(by1);
        let right = ax2.min(bx2);
        let bottom = ay2.min(by2);
        if right <= left || bottom <= top {
            return 0.0;
        }
        (right - left) as f32 * (bottom - top) as f32
    }

    /// Intersection over union. Zero for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    pub fn to_array(self) -> [i32; 4] {
        [self.x, self.y, self.w, self.h]
    }
}

/// Pre-suppression detection produced by the box decoder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BBox,
}

/// One accepted detection. Built once by the pipeline and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    label: String,
    class_id: usize,
    confidence: f32,
    bbox: BBox,
}

impl Detection {
    /// Widths and heights below zero are floored to zero.
    pub fn new(label: impl Into<String>, class_id: usize, confidence: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            class_id,
            confidence,
            bbox: BBox {
                w: bbox.w.max(0),
                h: bbox.h.max(0),
                ..bbox
            },
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Wire form used by the upload response.
    pub fn summary(&self) -> DetectionSummary {
        DetectionSummary {
            label: self.label.clone(),
            confidence: round2(self.confidence),
            bbox: self.bbox.to_array(),
        }
    }
}

/// JSON shape of a detection: `{label, confidence, bbox: [x, y, w, h]}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionSummary {
    pub label: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
}

pub(crate) fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BBox::new(10, 10, 50, 50);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn iou_near_coordinate_limit_does_not_overflow() {
        let a = BBox::new(i32::MAX - 10, 0, 100, 100);
        let b = BBox::new(i32::MAX - 60, 0, 100, 100);
        // Overlap spans x in [MAX-10, MAX+40): 50 x 100.
        let expected = 5000.0 / 15000.0;
        assert!((a.iou(&b) - expected).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(10, 0, 10, 10);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_shifted_boxes() {
        let a = BBox::new(10, 10, 50, 50);
        let b = BBox::new(12, 12, 50, 50);
        // 48 * 48 = 2304 overlap, union 2500 + 2500 - 2304 = 2696
        assert!((a.iou(&b) - 2304.0 / 2696.0).abs() < 1e-6);
    }

    #[test]
    fn zero_area_boxes_do_not_divide_by_zero() {
        let a = BBox::new(5, 5, 0, 0);
        assert_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn detection_floors_negative_extent() {
        let det = Detection::new("car", 2, 0.5, BBox::new(-4, 3, -1, 7));
        assert_eq!(det.bbox(), BBox::new(-4, 3, 0, 7));
    }

    #[test]
    fn summary_rounds_confidence() {
        let det = Detection::new("person", 0, 0.876, BBox::new(1, 2, 3, 4));
        let summary = det.summary();
        assert_eq!(summary.confidence, 0.88);
        assert_eq!(summary.bbox, [1, 2, 3, 4]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["label"], "person");
        assert_eq!(json["bbox"], serde_json::json!([1, 2, 3, 4]));
    }
}
