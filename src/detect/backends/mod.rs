use anyhow::{anyhow, Result};

pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Tensor layout of the exported ONNX model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnnxLayout {
    /// Single output `[1, 4 + C, N]`, geometry in network input pixels.
    Yolov8,
    /// One output per detection layer, rows of `5 + C` with normalized geometry.
    Yolov3,
}

impl OnnxLayout {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yolov8" | "v8" => Ok(OnnxLayout::Yolov8),
            "yolov3" | "v3" => Ok(OnnxLayout::Yolov3),
            other => Err(anyhow!(
                "unknown model layout '{}'; expected yolov8 or yolov3",
                other
            )),
        }
    }
}
