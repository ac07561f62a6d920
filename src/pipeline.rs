//! Frame-level detection: decode, suppress, label, annotate.

use image::RgbImage;
use serde::Serialize;

use crate::codec::{decode_image, encode_jpeg, to_base64};
use crate::detect::{
    annotate, suppress_indices, Detection, DetectionSummary, Detector, DetectorConfig,
    LoadedModel,
};
use crate::error::DetectError;

/// One processed frame.
pub struct FrameOutcome {
    pub annotated: RgbImage,
    pub detections: Vec<Detection>,
}

/// Run the full detection chain on one frame with a loaded model.
pub fn process_frame(
    model: &LoadedModel,
    frame: &RgbImage,
    cfg: &DetectorConfig,
) -> Result<FrameOutcome, DetectError> {
    let detections = detect_frame(model, frame, cfg)?;
    let annotated = annotate(frame, &detections, model.colors());
    Ok(FrameOutcome {
        annotated,
        detections,
    })
}

/// Detections for one frame, without drawing.
pub fn detect_frame(
    model: &LoadedModel,
    frame: &RgbImage,
    cfg: &DetectorConfig,
) -> Result<Vec<Detection>, DetectError> {
    let raw = model.detect(frame, cfg).map_err(DetectError::inference)?;
    let candidates = model
        .decoder()
        .decode(
            &raw,
            frame.width(),
            frame.height(),
            cfg.confidence_threshold,
        )
        .map_err(DetectError::inference)?;
    let keep = suppress_indices(&candidates, cfg.iou_threshold, cfg.policy);
    log::debug!(
        "frame {}x{}: {} candidates, {} kept",
        frame.width(),
        frame.height(),
        candidates.len(),
        keep.len()
    );

    Ok(keep
        .into_iter()
        .map(|idx| {
            let cand = &candidates[idx];
            Detection::new(
                model.classes().label(cand.class_id),
                cand.class_id,
                cand.confidence,
                cand.bbox,
            )
        })
        .collect())
}

/// Result of the upload path.
pub struct OneShotResult {
    /// Annotated frame, JPEG encoded.
    pub jpeg: Vec<u8>,
    pub detections: Vec<Detection>,
}

impl OneShotResult {
    pub fn response(&self) -> UploadResponse {
        UploadResponse {
            success: true,
            image: to_base64(&self.jpeg),
            detections: self.detections.iter().map(Detection::summary).collect(),
        }
    }
}

/// JSON body returned by `POST /upload`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub image: String,
    pub detections: Vec<DetectionSummary>,
}

/// Detect on an encoded image. Zero detections is a success.
pub fn detect_once(
    detector: &Detector,
    bytes: &[u8],
    cfg: &DetectorConfig,
    jpeg_quality: u8,
) -> Result<OneShotResult, DetectError> {
    let model = detector.model().ok_or(DetectError::ModelNotLoaded)?;
    let frame = decode_image(bytes)?;
    let outcome = process_frame(&model, &frame, cfg)?;
    let jpeg = encode_jpeg(&outcome.annotated, jpeg_quality).map_err(DetectError::inference)?;
    log::info!(
        "one-shot detection on {}x{} image: {} objects",
        frame.width(),
        frame.height(),
        outcome.detections.len()
    );
    Ok(OneShotResult {
        jpeg,
        detections: outcome.detections,
    })
}
