//! Error taxonomy surfaced at the service boundary.
//!
//! Internal plumbing uses `anyhow`; anything that reaches a caller of the
//! one-shot pipeline or the live session is folded into `DetectError` so the
//! HTTP layer can map it to a status code without string matching.

/// Structured detection failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectError {
    /// No model is loaded (load never ran or failed).
    ModelNotLoaded,
    /// Submitted bytes did not decode to an image.
    Decode(String),
    /// The detector backend failed on a frame.
    Inference(String),
    /// No frame source could be acquired.
    SourceUnavailable(String),
    /// A single frame pull failed during an active session.
    FrameRead(String),
}

impl DetectError {
    /// Stable machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            DetectError::ModelNotLoaded => "model_not_loaded",
            DetectError::Decode(_) => "decode_error",
            DetectError::Inference(_) => "inference_error",
            DetectError::SourceUnavailable(_) => "source_unavailable",
            DetectError::FrameRead(_) => "frame_read_failure",
        }
    }

    pub(crate) fn inference(err: anyhow::Error) -> Self {
        DetectError::Inference(format!("{err:#}"))
    }
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::ModelNotLoaded => write!(f, "model not loaded"),
            DetectError::Decode(msg) => write!(f, "invalid image file: {}", msg),
            DetectError::Inference(msg) => write!(f, "error during detection: {}", msg),
            DetectError::SourceUnavailable(msg) => write!(f, "could not access camera: {}", msg),
            DetectError::FrameRead(msg) => write!(f, "frame read failed: {}", msg),
        }
    }
}

impl std::error::Error for DetectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            DetectError::ModelNotLoaded,
            DetectError::Decode(String::new()),
            DetectError::Inference(String::new()),
            DetectError::SourceUnavailable(String::new()),
            DetectError::FrameRead(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(DetectError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn inference_error_keeps_context_chain() {
        let err = anyhow::anyhow!("shape mismatch").context("ONNX inference failed");
        let mapped = DetectError::inference(err);
        assert_eq!(
            mapped,
            DetectError::Inference("ONNX inference failed: shape mismatch".to_string())
        );
    }
}
