use anyhow::Result;
use image::RgbImage;

use super::decode::{OutputStyle, RawOutput};

/// Detector backend trait.
///
/// A backend wraps one loaded network. It is shared read-only across request
/// threads once loaded, so `infer` takes `&self` and implementations must be
/// `Sync`.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Output convention, fixed for the lifetime of the backend.
    fn output_style(&self) -> OutputStyle;

    /// Class-index table embedded in the model, ordered by index.
    ///
    /// Backends whose model format carries no names return `None` and the
    /// class list file is used instead.
    fn class_names(&self) -> Option<Vec<String>> {
        None
    }

    /// Run the network on an RGB frame resized to `input_size`.
    ///
    /// Row-style outputs must use geometry normalized to the frame, so the
    /// decoder can rescale without knowing the network input size.
    fn infer(&self, frame: &RgbImage, input_size: (u32, u32)) -> Result<RawOutput>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
