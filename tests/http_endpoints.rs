use anyhow::Result;
use image::{Rgb, RgbImage};
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use live_detect::api::{ApiConfig, ApiHandle, ApiServer, AppState};
use live_detect::detect::{CornerBox, OutputStyle, RawOutput, StubBackend};
use live_detect::ingest::{CameraHandle, SyntheticSource};
use live_detect::{Detector, LiveSession};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let frame = RgbImage::from_pixel(width, height, Rgb([30, 60, 90]));
    let mut out = Cursor::new(Vec::new());
    frame
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

fn person_backend() -> StubBackend {
    let output = RawOutput::Corners(vec![
        CornerBox {
            x1: 10.0,
            y1: 10.0,
            x2: 60.0,
            y2: 60.0,
            score: 0.9,
            class_id: 0,
        },
        CornerBox {
            x1: 12.0,
            y1: 12.0,
            x2: 62.0,
            y2: 62.0,
            score: 0.8,
            class_id: 0,
        },
    ]);
    StubBackend::new(OutputStyle::Corners, output).with_classes(["person", "bicycle"])
}

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestApi {
    api_handle: Option<ApiHandle>,
    detector: Arc<Detector>,
    session: Arc<LiveSession>,
}

impl TestApi {
    fn new(backend: StubBackend) -> Result<Self> {
        let detector = Arc::new(Detector::with_backend(backend));
        let session = Arc::new(LiveSession::new(Box::new(|| {
            Ok(Box::new(SyntheticSource::new("synthetic://0", 96, 72)) as CameraHandle)
        })));
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ApiConfig::default()
        };
        let state = AppState {
            detector: detector.clone(),
            session: session.clone(),
        };
        let api_handle = ApiServer::new(api_config, state).spawn()?;
        Ok(Self {
            api_handle: Some(api_handle),
            detector,
            session,
        })
    }

    fn loaded(backend: StubBackend) -> Result<Self> {
        let api = Self::new(backend)?;
        api.detector.load()?;
        Ok(api)
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(self.handle().addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        Ok(stream)
    }

    fn send(&self, head: &str, body: &[u8]) -> Result<(String, String)> {
        let mut stream = self.connect()?;
        stream.write_all(head.as_bytes())?;
        stream.write_all(body)?;
        read_response(&mut stream)
    }

    fn post_json(&self, path: &str) -> Result<(String, Value)> {
        let (headers, body) = self.send(
            &format!("POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n"),
            b"",
        )?;
        Ok((headers, serde_json::from_str(&body)?))
    }

    fn upload_multipart(&self, filename: &str, data: &[u8]) -> Result<(String, Value)> {
        let mut body = Vec::new();
        body.extend_from_slice(b"--TESTBOUNDARY\r\n");
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n--TESTBOUNDARY--\r\n");
        let head = format!(
            "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: multipart/form-data; boundary=TESTBOUNDARY\r\nContent-Length: {}\r\n\r\n",
            body.len()
        );
        let (headers, body) = self.send(&head, &body)?;
        Ok((headers, serde_json::from_str(&body)?))
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        self.session.stop();
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

#[test]
fn status_loads_the_model_once() -> Result<()> {
    let api = TestApi::new(person_backend())?;
    let request = "GET /status HTTP/1.1\r\nHost: localhost\r\n\r\n";

    let (headers, body) = api.send(request, b"")?;
    assert!(headers.contains("200 OK"));
    assert!(headers.contains("Access-Control-Allow-Origin: *"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["success"], true);
    assert_eq!(value["classes_loaded"], 2);
    assert_eq!(value["message"], "model loaded successfully with 2 classes");

    let (_, body) = api.send(request, b"")?;
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["message"], "model already loaded with 2 classes");
    Ok(())
}

#[test]
fn upload_before_load_reports_model_not_loaded() -> Result<()> {
    let api = TestApi::new(person_backend())?;
    let (headers, value) = api.upload_multipart("cat.png", &png_bytes(8, 8))?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(value["error"], "model not loaded");
    Ok(())
}

#[test]
fn upload_rejects_missing_and_invalid_files() -> Result<()> {
    let api = TestApi::loaded(person_backend())?;

    let (headers, body) = api.send(
        "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n",
        b"",
    )?;
    assert!(headers.contains("400 Bad Request"));
    assert!(body.contains(r#""error":"No file uploaded""#));

    let (headers, value) = api.upload_multipart("", b"")?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(value["error"], "No file selected");

    let (headers, value) = api.upload_multipart("notes.txt", b"this is not an image")?;
    assert!(headers.contains("400 Bad Request"));
    assert_eq!(value["error"], "Invalid image file");
    Ok(())
}

#[test]
fn upload_returns_annotated_image_and_suppressed_detections() -> Result<()> {
    let api = TestApi::loaded(person_backend())?;
    let (headers, value) = api.upload_multipart("street.png", &png_bytes(128, 96))?;
    assert!(headers.contains("200 OK"));
    assert_eq!(value["success"], true);
    assert!(!value["image"].as_str().unwrap_or_default().is_empty());

    let detections = value["detections"].as_array().expect("detections array");
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["label"], "person");
    assert_eq!(detections[0]["bbox"], serde_json::json!([10, 10, 50, 50]));
    Ok(())
}

#[test]
fn raw_body_upload_is_accepted() -> Result<()> {
    let api = TestApi::loaded(StubBackend::empty().with_classes(["person"]))?;
    let png = png_bytes(16, 16);
    let head = format!(
        "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Type: image/png\r\nContent-Length: {}\r\n\r\n",
        png.len()
    );
    let (headers, body) = api.send(&head, &png)?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["detections"], serde_json::json!([]));
    Ok(())
}

#[test]
fn live_session_start_stop_is_idempotent() -> Result<()> {
    let api = TestApi::loaded(person_backend())?;

    let (_, value) = api.post_json("/stop_live_detection")?;
    assert_eq!(value["success"], true);
    assert_eq!(value["message"], "Live detection stopped");

    let (_, value) = api.post_json("/start_live_detection")?;
    assert_eq!(value["message"], "Live detection started");
    let (_, value) = api.post_json("/start_live_detection")?;
    assert_eq!(value["success"], true);
    assert_eq!(value["message"], "Detection already active");
    assert!(api.session.is_active());

    let (_, value) = api.post_json("/stop_live_detection")?;
    assert_eq!(value["message"], "Live detection stopped");
    assert!(!api.session.is_active());
    Ok(())
}

#[test]
fn start_without_camera_reports_failure() -> Result<()> {
    let detector = Arc::new(Detector::with_backend(StubBackend::empty()));
    let session = Arc::new(LiveSession::new(Box::new(|| {
        Err(anyhow::anyhow!("no camera available"))
    })));
    let state = AppState {
        detector,
        session: session.clone(),
    };
    let handle = ApiServer::new(
        ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            ..ApiConfig::default()
        },
        state,
    )
    .spawn()?;

    let mut stream = TcpStream::connect(handle.addr)?;
    stream.write_all(
        b"POST /start_live_detection HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n",
    )?;
    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));
    let value: Value = serde_json::from_str(&body)?;
    assert_eq!(value["success"], false);
    assert_eq!(value["message"], "Could not access camera");
    assert!(!session.is_active());

    handle.stop()?;
    Ok(())
}

#[test]
fn video_feed_streams_jpeg_parts_while_active() -> Result<()> {
    let api = TestApi::loaded(person_backend())?;
    api.post_json("/start_live_detection")?;

    let mut stream = api.connect()?;
    stream.write_all(b"GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

    let mut received = Vec::new();
    let mut buf = [0u8; 8192];
    while received.windows(7).filter(|w| w == b"--frame").count() < 2 {
        let n = stream.read(&mut buf)?;
        assert!(n > 0, "stream closed early");
        received.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&received);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("Content-Type: multipart/x-mixed-replace; boundary=frame\r\n"));
    assert!(text.contains("--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
    drop(stream);

    // The consumer going away leaves the session running.
    assert!(api.session.is_active());
    Ok(())
}

#[test]
fn video_feed_ends_when_idle() -> Result<()> {
    let api = TestApi::loaded(person_backend())?;
    let (headers, body) = api.send("GET /video_feed HTTP/1.1\r\nHost: localhost\r\n\r\n", b"")?;
    assert!(headers.contains("multipart/x-mixed-replace"));
    assert!(body.is_empty());
    Ok(())
}

#[test]
fn unknown_routes_and_methods() -> Result<()> {
    let api = TestApi::new(StubBackend::empty())?;
    let (headers, _) = api.send("GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n", b"")?;
    assert!(headers.contains("404 Not Found"));
    let (headers, _) = api.send("GET /upload HTTP/1.1\r\nHost: localhost\r\n\r\n", b"")?;
    assert!(headers.contains("405 Method Not Allowed"));
    let (headers, body) = api.send("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n", b"")?;
    assert!(headers.contains("text/html"));
    assert!(body.contains("/video_feed"));
    Ok(())
}
