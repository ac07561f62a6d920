use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::decode::{OutputStyle, RawOutput, RowLayout};

/// Scripted backend for tests and demos. Returns the same raw output for
/// every frame, or fails every call when built with `failing`.
pub struct StubBackend {
    style: OutputStyle,
    classes: Option<Vec<String>>,
    output: RawOutput,
    failure: Option<String>,
    calls: AtomicU64,
}

impl StubBackend {
    pub fn new(style: OutputStyle, output: RawOutput) -> Self {
        Self {
            style,
            classes: None,
            output,
            failure: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Backend that never reports anything.
    pub fn empty() -> Self {
        Self::new(
            OutputStyle::Rows(RowLayout::ScoresOnly),
            RawOutput::Rows(Vec::new()),
        )
    }

    /// Backend whose every inference call fails with `message`.
    pub fn failing(message: &str) -> Self {
        let mut backend = Self::empty();
        backend.failure = Some(message.to_string());
        backend
    }

    /// Embed a class table, as a model with names would.
    pub fn with_classes<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.classes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn output_style(&self) -> OutputStyle {
        self.style
    }

    fn class_names(&self) -> Option<Vec<String>> {
        self.classes.clone()
    }

    fn infer(&self, _frame: &RgbImage, _input_size: (u32, u32)) -> Result<RawOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(self.output.clone()),
        }
    }
}
