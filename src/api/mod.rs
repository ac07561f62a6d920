//! HTTP front end: upload detection, model status, live session control,
//! and the MJPEG feed.
//!
//! One thread per connection. A `/video_feed` connection keeps its thread
//! for as long as the stream runs.

mod http;
mod multipart;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::detect::{Detector, DetectorConfig};
use crate::error::DetectError;
use crate::live::{LiveSession, StreamEmitter, CONTENT_TYPE};
use crate::pipeline::detect_once;
use http::{read_request, HttpRequest, PayloadTooLarge};

const INDEX_HTML: &str = include_str!("index.html");
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub jpeg_quality: u8,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Shared service state handed to every connection.
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<Detector>,
    pub session: Arc<LiveSession>,
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections and end running streams at their next
    /// loop check.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: AppState) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|err| anyhow!("invalid api address '{}': {}", self.cfg.addr, err))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("detection api listening on http://{}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let ctx = Arc::new(Context {
            cfg: self.cfg,
            state: self.state,
            shutdown: shutdown.clone(),
        });
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, ctx, shutdown_thread) {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct Context {
    cfg: ApiConfig,
    state: AppState,
    shutdown: Arc<AtomicBool>,
}

fn run_api(listener: TcpListener, ctx: Arc<Context>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                let spawned = std::thread::Builder::new()
                    .name("detectd-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &ctx) {
                            log::warn!("request from {} failed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &Context) -> Result<()> {
    stream.set_nonblocking(false)?;
    http::set_timeouts(&stream)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    let request = match read_request(&mut stream, ctx.cfg.max_body_bytes) {
        Ok(request) => request,
        Err(err) => {
            if let Some(too_large) = err.downcast_ref::<PayloadTooLarge>() {
                http::write_json(&mut stream, 413, &ErrorBody::new(too_large.to_string()))?;
                return Ok(());
            }
            return Err(err);
        }
    };
    log::debug!("{} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => http::write_preflight(&mut stream),
        ("GET", "/") => http::write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            INDEX_HTML.as_bytes(),
        ),
        ("POST", "/upload") => handle_upload(&mut stream, &request, ctx),
        ("GET", "/status") => handle_status(&mut stream, ctx),
        ("POST", "/start_live_detection") => handle_start(&mut stream, ctx),
        ("POST", "/stop_live_detection") => {
            let message = ctx.state.session.stop();
            http::write_json(&mut stream, 200, &MessageBody::ok(message))
        }
        ("GET", "/video_feed") => handle_video_feed(&mut stream, ctx),
        (
            _,
            "/" | "/upload" | "/status" | "/start_live_detection" | "/stop_live_detection"
            | "/video_feed",
        ) => http::write_json(&mut stream, 405, &ErrorBody::new("method not allowed")),
        _ => http::write_json(&mut stream, 404, &ErrorBody::new("not found")),
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Serialize)]
struct MessageBody {
    success: bool,
    message: String,
}

impl MessageBody {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct StatusBody {
    success: bool,
    message: String,
    classes_loaded: usize,
}

/// The submitted image bytes, or the client-facing reason there are none.
fn upload_bytes(request: &HttpRequest) -> Result<&[u8], &'static str> {
    let content_type = request.header("content-type").unwrap_or("");
    let Some(boundary) = multipart::boundary(content_type) else {
        if request.body.is_empty() {
            return Err("No file uploaded");
        }
        return Ok(&request.body);
    };
    match multipart::find_file(&request.body, &boundary, "file") {
        Ok(Some(part)) => match part.filename.as_deref() {
            Some("") => Err("No file selected"),
            Some(_) => Ok(part.data),
            // A field without a filename is a form value, not a file.
            None => Err("No file uploaded"),
        },
        Ok(None) => Err("No file uploaded"),
        Err(err) => {
            log::debug!("malformed multipart upload: {:#}", err);
            Err("No file uploaded")
        }
    }
}

fn handle_upload(stream: &mut TcpStream, request: &HttpRequest, ctx: &Context) -> Result<()> {
    let bytes = match upload_bytes(request) {
        Ok(bytes) => bytes,
        Err(reason) => return http::write_json(stream, 400, &ErrorBody::new(reason)),
    };

    match detect_once(
        &ctx.state.detector,
        bytes,
        &DetectorConfig::UPLOAD,
        ctx.cfg.jpeg_quality,
    ) {
        Ok(result) => http::write_json(stream, 200, &result.response()),
        Err(err) => {
            log::warn!("upload rejected ({}): {}", err.code(), err);
            let (status, message) = match &err {
                DetectError::Decode(_) => (400, "Invalid image file".to_string()),
                DetectError::ModelNotLoaded | DetectError::Inference(_) => (400, err.to_string()),
                DetectError::SourceUnavailable(_) | DetectError::FrameRead(_) => {
                    (500, err.to_string())
                }
            };
            http::write_json(stream, status, &ErrorBody::new(message))
        }
    }
}

fn handle_status(stream: &mut TcpStream, ctx: &Context) -> Result<()> {
    let body = match ctx.state.detector.load() {
        Ok(status) => StatusBody {
            success: true,
            message: status.message(),
            classes_loaded: status.class_count(),
        },
        Err(err) => {
            log::error!("model load failed: {:#}", err);
            StatusBody {
                success: false,
                message: format!("Error loading model: {:#}", err),
                classes_loaded: 0,
            }
        }
    };
    http::write_json(stream, 200, &body)
}

fn handle_start(stream: &mut TcpStream, ctx: &Context) -> Result<()> {
    let body = match ctx.state.session.start() {
        Ok(outcome) => MessageBody::ok(outcome.message()),
        Err(err) => {
            log::warn!("{}: {}", err.code(), err);
            MessageBody::failed("Could not access camera")
        }
    };
    http::write_json(stream, 200, &body)
}

fn handle_video_feed(stream: &mut TcpStream, ctx: &Context) -> Result<()> {
    http::write_stream_head(stream, CONTENT_TYPE)?;
    let emitter = StreamEmitter::new(
        ctx.state.detector.clone(),
        ctx.state.session.clone(),
        ctx.cfg.jpeg_quality,
    )
    .with_shutdown(ctx.shutdown.clone());
    let stats = emitter.run(stream);
    log::info!(
        "video feed closed after {} frames ({:?})",
        stats.frames_sent,
        stats.end
    );
    Ok(())
}
