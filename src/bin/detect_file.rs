//! detect_file - run detection over a still image or a video file
//!
//! Uses the offline preset (confidence 0.20, IoU 0.40, 416x416 input,
//! class-agnostic suppression) and writes annotated output next to the input
//! unless `--output` says otherwise.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use live_detect::codec::{decode_image, encode_jpeg, DEFAULT_JPEG_QUALITY};
use live_detect::config::{ModelBackend, ModelSettings};
use live_detect::detect::{ClassNames, LoadedModel, OnnxLayout};
use live_detect::ingest::{FrameSource, VideoFileSource};
use live_detect::{process_frame, Detection, Detector, DetectorConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Still image to process.
    #[arg(long, conflicts_with = "video", required_unless_present = "video")]
    image: Option<PathBuf>,
    /// Video file to process (requires the ingest-file-ffmpeg feature).
    #[arg(long)]
    video: Option<PathBuf>,
    /// ONNX model weights.
    #[arg(long, env = "DETECT_WEIGHTS_PATH", default_value = "yolov8n.onnx")]
    weights: PathBuf,
    /// Class names, one per line. A default list is written if missing.
    #[arg(long, env = "DETECT_CLASSES_PATH", default_value = "classes.txt")]
    classes: PathBuf,
    /// Output tensor layout of the model (yolov8 or yolov3).
    #[arg(long, default_value = "yolov8")]
    layout: String,
    /// Detector backend (tract or stub).
    #[arg(long, env = "DETECT_MODEL_BACKEND", default_value = "tract")]
    backend: String,
    /// Annotated image path, or output directory for video frames.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Stop after this many video frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// JPEG quality for written frames.
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !args.classes.exists() {
        log::warn!(
            "{} not found; writing the default class list",
            args.classes.display()
        );
        let defaults = ClassNames::write_default(&args.classes)?;
        log::info!("default class list written ({} classes)", defaults.len());
    }

    let settings = ModelSettings {
        backend: args.backend.parse::<ModelBackend>()?,
        weights_path: args.weights.clone(),
        classes_path: args.classes.clone(),
        layout: OnnxLayout::parse(&args.layout)?,
    };
    let preset = DetectorConfig::FILE;
    let detector = Detector::new(settings.loader(preset.input_size))
        .with_classes_path(settings.classes_path.clone());
    let status = detector.load()?;
    log::info!("{}", status.message());
    let model = detector
        .model()
        .ok_or_else(|| anyhow!("detector reported loaded but has no model"))?;

    match (&args.image, &args.video) {
        (Some(image), _) => run_image(&model, image, args.output.as_deref(), &preset),
        (None, Some(video)) => run_video(&model, video, &args, &preset),
        (None, None) => Err(anyhow!("one of --image or --video is required")),
    }
}

fn run_image(
    model: &LoadedModel,
    input: &Path,
    output: Option<&Path>,
    preset: &DetectorConfig,
) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let frame = decode_image(&bytes)?;
    let outcome = process_frame(model, &frame, preset)?;
    log_detections(&outcome.detections);

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling_path(input, "_detected.jpg"));
    outcome
        .annotated
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!(
        "{} objects detected; annotated image written to {}",
        outcome.detections.len(),
        output.display()
    );
    Ok(())
}

fn run_video(
    model: &LoadedModel,
    input: &Path,
    args: &Args,
    preset: &DetectorConfig,
) -> Result<()> {
    let mut source = VideoFileSource::open(input)?;
    let out_dir = args
        .output
        .clone()
        .unwrap_or_else(|| sibling_path(input, "_frames"));
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut frames = 0u64;
    let mut objects = 0usize;
    loop {
        if args.max_frames.is_some_and(|max| frames >= max) {
            break;
        }
        let Some(frame) = source.read_frame()? else {
            break;
        };
        frames += 1;
        let annotated = match process_frame(model, &frame, preset) {
            Ok(outcome) => {
                log::info!("frame {}: {} objects", frames, outcome.detections.len());
                log_detections(&outcome.detections);
                objects += outcome.detections.len();
                outcome.annotated
            }
            Err(err) => {
                log::warn!("frame {} written unannotated: {}", frames, err);
                frame
            }
        };
        let path = out_dir.join(format!("frame_{:06}.jpg", frames));
        fs::write(&path, encode_jpeg(&annotated, args.quality)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    log::info!(
        "End of video: {} frames, {} objects; output in {}",
        frames,
        objects,
        out_dir.display()
    );
    Ok(())
}

fn log_detections(detections: &[Detection]) {
    for det in detections {
        let bbox = det.bbox();
        log::info!(
            "{} (confidence: {:.2}) at ({}, {}, {}, {})",
            det.label(),
            det.confidence(),
            bbox.x,
            bbox.y,
            bbox.w,
            bbox.h
        );
    }
}

/// `clip.mp4` + `_frames` → `clip_frames`, in the same directory.
fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}{}", stem, suffix))
}
