//! Named detector configurations.
//!
//! Each call site runs with its own thresholds. The values differ on purpose
//! and are not meant to be unified.

/// How the suppressor lets candidates of different classes interact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressionPolicy {
    /// Every candidate competes with every other candidate.
    ClassAgnostic,
    /// Only candidates of the same class suppress each other.
    PerClass,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorConfig {
    /// Rows at or below this score are dropped by the decoder.
    pub confidence_threshold: f32,
    /// Candidates overlapping an accepted box by more than this are suppressed.
    pub iou_threshold: f32,
    /// Network input (width, height).
    pub input_size: (u32, u32),
    pub policy: SuppressionPolicy,
}

impl DetectorConfig {
    /// Offline image/video detection.
    pub const FILE: Self = Self {
        confidence_threshold: 0.20,
        iou_threshold: 0.40,
        input_size: (416, 416),
        policy: SuppressionPolicy::ClassAgnostic,
    };

    /// One-shot upload endpoint.
    pub const UPLOAD: Self = Self {
        confidence_threshold: 0.25,
        iou_threshold: 0.45,
        input_size: (640, 640),
        policy: SuppressionPolicy::PerClass,
    };

    /// Live stream.
    pub const LIVE: Self = Self {
        confidence_threshold: 0.30,
        iou_threshold: 0.45,
        input_size: (640, 640),
        policy: SuppressionPolicy::PerClass,
    };

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_size = (width, height);
        self
    }
}
