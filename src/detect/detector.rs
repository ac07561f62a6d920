//! Detector adapter: owns the loaded model and the tables derived from it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::backend::DetectorBackend;
use super::classes::{ClassNames, ColorTable};
use super::decode::{BoxDecoder, RawOutput};
use super::preset::DetectorConfig;

/// Builds a backend. Called again on every load attempt until one succeeds.
pub type BackendLoader = Box<dyn Fn() -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// A loaded network plus its class and color tables. Read-only once built.
pub struct LoadedModel {
    backend: Box<dyn DetectorBackend>,
    classes: ClassNames,
    colors: ColorTable,
    decoder: BoxDecoder,
}

impl LoadedModel {
    pub fn new(backend: Box<dyn DetectorBackend>, classes: ClassNames) -> Self {
        let decoder = BoxDecoder::new(backend.output_style());
        Self {
            backend,
            classes,
            colors: ColorTable::generate(),
            decoder,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn classes(&self) -> &ClassNames {
        &self.classes
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    pub fn decoder(&self) -> &BoxDecoder {
        &self.decoder
    }

    /// Run the network on `frame` with the preset's input size.
    pub fn detect(&self, frame: &RgbImage, cfg: &DetectorConfig) -> Result<RawOutput> {
        self.backend.infer(frame, cfg.input_size)
    }
}

/// Result of a successful `Detector::load`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// This call loaded the model; carries the class count.
    Loaded(usize),
    /// A model was already loaded; nothing was reloaded.
    AlreadyLoaded(usize),
}

impl LoadStatus {
    pub fn class_count(self) -> usize {
        match self {
            LoadStatus::Loaded(count) | LoadStatus::AlreadyLoaded(count) => count,
        }
    }

    pub fn message(self) -> String {
        match self {
            LoadStatus::Loaded(count) => {
                format!("model loaded successfully with {} classes", count)
            }
            LoadStatus::AlreadyLoaded(count) => {
                format!("model already loaded with {} classes", count)
            }
        }
    }
}

/// Process-wide detector handle.
///
/// `load` is idempotent and retryable: a failed load leaves the detector
/// unloaded and a later call tries again.
pub struct Detector {
    loader: BackendLoader,
    classes_path: Option<PathBuf>,
    /// Serializes load attempts. Never taken by `model()`.
    loading: Mutex<()>,
    model: Mutex<Option<Arc<LoadedModel>>>,
}

impl Detector {
    pub fn new(loader: BackendLoader) -> Self {
        Self {
            loader,
            classes_path: None,
            loading: Mutex::new(()),
            model: Mutex::new(None),
        }
    }

    /// Detector that loads `backend` once, on the first `load` call.
    pub fn with_backend<B: DetectorBackend + 'static>(backend: B) -> Self {
        let slot = Mutex::new(Some(backend));
        Self::new(Box::new(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("backend slot lock poisoned"))?;
            let backend = guard
                .take()
                .ok_or_else(|| anyhow!("backend was already consumed by a previous load"))?;
            Ok(Box::new(backend) as Box<dyn DetectorBackend>)
        }))
    }

    /// Class list file used when the model carries no names.
    pub fn with_classes_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.classes_path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<LoadStatus> {
        // Concurrent callers wait here and then see the installed model.
        let _loading = self
            .loading
            .lock()
            .map_err(|_| anyhow!("detector load lock poisoned"))?;
        if let Some(model) = self.model() {
            return Ok(LoadStatus::AlreadyLoaded(model.classes().len()));
        }

        let backend = (self.loader)().context("failed to load detector backend")?;
        let classes = match backend.class_names() {
            Some(names) => ClassNames::new(names),
            None => {
                let path = self.classes_path.as_ref().ok_or_else(|| {
                    anyhow!(
                        "backend '{}' carries no class names and no class list is configured",
                        backend.name()
                    )
                })?;
                ClassNames::from_file(path)?
            }
        };
        backend
            .warm_up()
            .with_context(|| format!("backend '{}' warm-up failed", backend.name()))?;

        let count = classes.len();
        log::info!(
            "detector loaded: backend={} classes={}",
            backend.name(),
            count
        );
        let model = Arc::new(LoadedModel::new(backend, classes));
        *self
            .model
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))? = Some(model);
        Ok(LoadStatus::Loaded(count))
    }

    /// The loaded model, if any. Cheap; callers hold the `Arc` for as long
    /// as they need it without blocking other requests.
    pub fn model(&self) -> Option<Arc<LoadedModel>> {
        match self.model.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => {
                log::error!("detector lock poisoned");
                None
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model().is_some()
    }

    /// Number of known classes, zero when unloaded.
    pub fn class_count(&self) -> usize {
        self.model().map_or(0, |model| model.classes().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;

    #[test]
    fn load_is_idempotent() -> Result<()> {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let detector = Detector::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubBackend::empty().with_classes(["a", "b", "c"]))
                as Box<dyn DetectorBackend>)
        }));

        assert_eq!(detector.load()?, LoadStatus::Loaded(3));
        assert_eq!(detector.load()?, LoadStatus::AlreadyLoaded(3));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(detector.class_count(), 3);
        Ok(())
    }

    #[test]
    fn model_lookup_does_not_wait_for_a_slow_load() -> Result<()> {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let detector = Arc::new(Detector::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(600));
            Ok(Box::new(StubBackend::empty().with_classes(["person"]))
                as Box<dyn DetectorBackend>)
        })));

        let loaders: Vec<_> = (0..2)
            .map(|_| {
                let detector = detector.clone();
                thread::spawn(move || detector.load())
            })
            .collect();
        thread::sleep(Duration::from_millis(100));

        let begun = Instant::now();
        assert!(detector.model().is_none());
        assert!(begun.elapsed() < Duration::from_millis(300));

        let mut statuses = Vec::new();
        for loader in loaders {
            statuses.push(loader.join().expect("loader panicked")?);
        }
        statuses.sort_by_key(|status| matches!(status, LoadStatus::AlreadyLoaded(_)));
        assert_eq!(
            statuses,
            vec![LoadStatus::Loaded(1), LoadStatus::AlreadyLoaded(1)]
        );
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(detector.is_loaded());
        Ok(())
    }

    #[test]
    fn failed_load_leaves_detector_unloaded_and_retryable() -> Result<()> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let detector = Detector::new(Box::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("weights not found"))
            } else {
                Ok(Box::new(StubBackend::empty().with_classes(["person"]))
                    as Box<dyn DetectorBackend>)
            }
        }));

        let err = detector.load().unwrap_err();
        assert!(format!("{err:#}").contains("weights not found"));
        assert!(!detector.is_loaded());
        assert_eq!(detector.class_count(), 0);

        assert_eq!(detector.load()?, LoadStatus::Loaded(1));
        assert!(detector.is_loaded());
        Ok(())
    }

    #[test]
    fn class_file_is_used_when_model_has_no_names() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        std::io::Write::write_all(&mut file, b"person\nbicycle\ncar\n")?;
        let detector = Detector::with_backend(StubBackend::empty()).with_classes_path(file.path());
        assert_eq!(detector.load()?, LoadStatus::Loaded(3));
        let model = detector.model().expect("model loaded");
        assert_eq!(model.classes().label(2), "car");
        assert_eq!(model.backend_name(), "stub");
        Ok(())
    }

    #[test]
    fn missing_class_list_fails_load() {
        let detector = Detector::with_backend(StubBackend::empty())
            .with_classes_path("/nonexistent/classes.txt");
        assert!(detector.load().is_err());
        assert!(!detector.is_loaded());
    }

    #[test]
    fn status_messages_report_class_count() {
        assert_eq!(
            LoadStatus::Loaded(80).message(),
            "model loaded successfully with 80 classes"
        );
        assert_eq!(
            LoadStatus::AlreadyLoaded(80).message(),
            "model already loaded with 80 classes"
        );
    }
}
