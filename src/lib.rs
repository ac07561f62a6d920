//! live-detect
//!
//! Object detection service: one-shot detection on uploaded images, a live
//! camera session streamed as MJPEG, and an offline tool for image and video
//! files.
//!
//! # Module Structure
//!
//! - `detect`: model adapter, box decoding, non-maximum suppression, annotation
//! - `pipeline`: decode → suppress → label → annotate for one frame
//! - `ingest`: camera and video file frame sources
//! - `live`: session controller (IDLE/ACTIVE) and the MJPEG stream emitter
//! - `api`: HTTP front end
//! - `config`: daemon configuration (TOML file + environment)
//! - `codec`: image decode/encode helpers
//! - `error`: structured errors surfaced to callers

pub mod api;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod ingest;
pub mod live;
pub mod pipeline;

pub use detect::{
    BBox, Detection, Detector, DetectorBackend, DetectorConfig, LoadStatus, OutputStyle,
    RawOutput, SuppressionPolicy,
};
pub use error::DetectError;
pub use live::{LiveSession, StreamEmitter};
pub use pipeline::{detect_once, process_frame, OneShotResult};
