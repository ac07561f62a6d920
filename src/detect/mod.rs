//! Detection core: model adapter, box decoding, suppression, and annotation.

mod annotate;
mod backend;
pub mod backends;
mod classes;
mod decode;
mod detector;
mod glyphs;
mod nms;
mod preset;
mod result;

pub use annotate::{annotate, label_text};
pub use backend::DetectorBackend;
pub use backends::{OnnxLayout, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use classes::{ClassNames, ColorTable, COLOR_TABLE_SIZE, DEFAULT_CLASS_NAMES};
pub use decode::{BoxDecoder, CornerBox, OutputStyle, RawOutput, RowLayout};
pub use detector::{BackendLoader, Detector, LoadStatus, LoadedModel};
pub use nms::{suppress, suppress_indices};
pub use preset::{DetectorConfig, SuppressionPolicy};
pub use result::{BBox, Candidate, Detection, DetectionSummary};
