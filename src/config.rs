use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::api::ApiConfig;
use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::detect::{BackendLoader, DetectorBackend, OnnxLayout, StubBackend};
use crate::ingest::{open_camera, CaptureBackend, CaptureConfig};
use crate::live::SourceOpener;

const DEFAULT_API_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WEIGHTS_PATH: &str = "yolov8n.onnx";
const DEFAULT_CLASSES_PATH: &str = "classes.txt";
const DEFAULT_CAMERA_INDICES: [u32; 4] = [0, 1, 2, 3];
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectdConfigFile {
    api: Option<ApiConfigFile>,
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<String>,
    weights_path: Option<PathBuf>,
    classes_path: Option<PathBuf>,
    layout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    indices: Option<Vec<u32>>,
    backends: Option<Vec<CaptureBackend>>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    jpeg_quality: Option<u8>,
}

/// Which detector backend the daemon loads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelBackend {
    /// ONNX weights through tract (feature `backend-tract`).
    Tract,
    /// Scripted backend that never detects anything.
    Stub,
}

impl FromStr for ModelBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" | "onnx" => Ok(ModelBackend::Tract),
            "stub" => Ok(ModelBackend::Stub),
            other => Err(anyhow!(
                "unknown model backend '{}' (expected tract or stub)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectdConfig {
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub model: ModelSettings,
    pub camera: CameraSettings,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: ModelBackend,
    pub weights_path: PathBuf,
    pub classes_path: PathBuf,
    pub layout: OnnxLayout,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub indices: Vec<u32>,
    /// Tried in order, each over every index. Defaults to RGB-first V4L2
    /// followed by YUYV-first V4L2.
    pub backends: Vec<CaptureBackend>,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl DetectdConfig {
    /// File named by `DETECT_CONFIG` (TOML), then `DETECT_*` environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectdConfigFile) -> Result<Self> {
        let api = file.api.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();

        let backend = match model.backend.as_deref() {
            Some(name) => name.parse()?,
            None => ModelBackend::Tract,
        };
        let layout = match model.layout.as_deref() {
            Some(name) => OnnxLayout::parse(name)?,
            None => OnnxLayout::Yolov8,
        };

        Ok(Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            model: ModelSettings {
                backend,
                weights_path: model
                    .weights_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH)),
                classes_path: model
                    .classes_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSES_PATH)),
                layout,
            },
            camera: CameraSettings {
                indices: camera
                    .indices
                    .unwrap_or_else(|| DEFAULT_CAMERA_INDICES.to_vec()),
                backends: camera
                    .backends
                    .unwrap_or_else(|| vec![CaptureBackend::V4l2, CaptureBackend::V4l2Yuyv]),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            jpeg_quality: stream.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("DETECT_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr.trim().to_string();
            }
        }
        if let Ok(backend) = std::env::var("DETECT_MODEL_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.parse()?;
            }
        }
        if let Ok(path) = std::env::var("DETECT_WEIGHTS_PATH") {
            if !path.trim().is_empty() {
                self.model.weights_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("DETECT_CLASSES_PATH") {
            if !path.trim().is_empty() {
                self.model.classes_path = PathBuf::from(path);
            }
        }
        if let Ok(indices) = std::env::var("DETECT_CAMERA_INDICES") {
            let parsed = split_csv(&indices)
                .iter()
                .map(|entry| {
                    entry.parse::<u32>().map_err(|_| {
                        anyhow!("DETECT_CAMERA_INDICES must be a comma-separated list of integers")
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if !parsed.is_empty() {
                self.camera.indices = parsed;
            }
        }
        if let Ok(backends) = std::env::var("DETECT_CAMERA_BACKENDS") {
            let parsed = split_csv(&backends)
                .iter()
                .map(|entry| entry.parse::<CaptureBackend>())
                .collect::<Result<Vec<_>>>()?;
            if !parsed.is_empty() {
                self.camera.backends = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.api_addr
            .parse::<SocketAddr>()
            .map_err(|_| anyhow!("api addr '{}' is not a valid socket address", self.api_addr))?;
        if self.camera.indices.is_empty() {
            return Err(anyhow!("camera.indices must list at least one device index"));
        }
        if self.camera.backends.is_empty() {
            return Err(anyhow!("camera.backends must list at least one capture backend"));
        }
        let mut seen = Vec::with_capacity(self.camera.backends.len());
        self.camera.backends.retain(|backend| {
            if seen.contains(backend) {
                false
            } else {
                seen.push(*backend);
                true
            }
        });
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!(
                "stream.jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("api.max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            addr: self.api_addr.clone(),
            jpeg_quality: self.jpeg_quality,
            max_body_bytes: self.max_upload_bytes,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            width: self.camera.width,
            height: self.camera.height,
            target_fps: self.camera.target_fps,
        }
    }

    /// Camera opener for the live session: every configured backend, every
    /// configured index, in order.
    pub fn session_opener(&self) -> SourceOpener {
        let backends = self.camera.backends.clone();
        let indices = self.camera.indices.clone();
        let capture = self.capture_config();
        Box::new(move || open_camera(&backends, &indices, capture))
    }
}

impl ModelSettings {
    /// Loader for the configured backend, compiled for `input_size`.
    pub fn loader(&self, input_size: (u32, u32)) -> BackendLoader {
        match self.backend {
            ModelBackend::Stub => Box::new(|| {
                log::warn!("using stub detector backend; nothing will be detected");
                Ok(Box::new(StubBackend::empty()) as Box<dyn DetectorBackend>)
            }),
            ModelBackend::Tract => tract_loader(&self.weights_path, self.layout, input_size),
        }
    }
}

#[cfg(feature = "backend-tract")]
fn tract_loader(weights: &Path, layout: OnnxLayout, input_size: (u32, u32)) -> BackendLoader {
    let weights = weights.to_path_buf();
    Box::new(move || {
        if !weights.exists() {
            return Err(anyhow!("model weights not found at {}", weights.display()));
        }
        let backend =
            crate::detect::TractBackend::new(&weights, input_size.0, input_size.1, layout)?;
        Ok(Box::new(backend) as Box<dyn DetectorBackend>)
    })
}

#[cfg(not(feature = "backend-tract"))]
fn tract_loader(weights: &Path, _layout: OnnxLayout, _input_size: (u32, u32)) -> BackendLoader {
    let weights = weights.to_path_buf();
    Box::new(move || {
        Err(anyhow!(
            "cannot load {}: the tract backend requires the backend-tract feature",
            weights.display()
        ))
    })
}

fn read_config_file(path: &Path) -> Result<DetectdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
