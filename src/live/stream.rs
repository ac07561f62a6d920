//! MJPEG stream emitter for `GET /video_feed`.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::RgbImage;

use super::session::{LiveSession, Pull};
use crate::codec::encode_jpeg;
use crate::detect::{Detector, DetectorConfig};
use crate::pipeline::process_frame;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
/// Pause after each emitted frame (~30 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(30);
/// Pause after a missed or failed frame read.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Why a stream loop ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The session went IDLE (or the server is shutting down).
    Stopped,
    /// Writing to the consumer failed.
    Disconnected(io::Error),
}

#[derive(Debug)]
pub struct StreamStats {
    pub frames_sent: u64,
    pub misses: u64,
    pub inference_failures: u64,
    pub end: StreamEnd,
}

/// Drives one consumer's stream. Several emitters may share a session.
pub struct StreamEmitter {
    detector: Arc<Detector>,
    session: Arc<LiveSession>,
    config: DetectorConfig,
    jpeg_quality: u8,
    frame_interval: Duration,
    retry_delay: Duration,
    shutdown: Option<Arc<AtomicBool>>,
}

impl StreamEmitter {
    pub fn new(detector: Arc<Detector>, session: Arc<LiveSession>, jpeg_quality: u8) -> Self {
        Self {
            detector,
            session,
            config: DetectorConfig::LIVE,
            jpeg_quality,
            frame_interval: FRAME_INTERVAL,
            retry_delay: RETRY_DELAY,
            shutdown: None,
        }
    }

    pub fn with_timing(mut self, frame_interval: Duration, retry_delay: Duration) -> Self {
        self.frame_interval = frame_interval;
        self.retry_delay = retry_delay;
        self
    }

    /// End the loop when `flag` is set, independent of the session state.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Emit parts until the session goes IDLE or the consumer goes away.
    /// Never changes the session state.
    pub fn run<W: Write>(&self, out: &mut W) -> StreamStats {
        let mut stats = StreamStats {
            frames_sent: 0,
            misses: 0,
            inference_failures: 0,
            end: StreamEnd::Stopped,
        };
        loop {
            if self.shutting_down() {
                break;
            }
            let frame = match self.session.pull_frame() {
                Pull::Stopped => break,
                Pull::Missed => {
                    stats.misses += 1;
                    thread::sleep(self.retry_delay);
                    continue;
                }
                Pull::Frame(frame) => frame,
            };

            let (annotated, inference_ok) = self.render(&frame);
            if !inference_ok {
                stats.inference_failures += 1;
            }
            let jpeg = match encode_jpeg(&annotated, self.jpeg_quality) {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    log::warn!("stream frame skipped: {:#}", err);
                    continue;
                }
            };
            if let Err(err) = write_part(out, &jpeg) {
                log::info!("stream consumer disconnected: {}", err);
                stats.end = StreamEnd::Disconnected(err);
                break;
            }
            stats.frames_sent += 1;
            thread::sleep(self.frame_interval);
        }
        log::debug!(
            "stream ended after {} frames ({} misses, {} inference failures)",
            stats.frames_sent,
            stats.misses,
            stats.inference_failures
        );
        stats
    }

    /// Annotated frame, or the plain frame when no model is loaded or
    /// inference fails. The flag is false only on inference failure.
    fn render(&self, frame: &RgbImage) -> (RgbImage, bool) {
        let Some(model) = self.detector.model() else {
            return (frame.clone(), true);
        };
        match process_frame(&model, frame, &self.config) {
            Ok(outcome) => (outcome.annotated, true),
            Err(err) => {
                log::warn!("live frame sent unannotated: {}", err);
                (frame.clone(), false)
            }
        }
    }

    fn shutting_down(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Write one multipart part: boundary, part header, JPEG, CRLF.
pub fn write_part<W: Write>(out: &mut W, jpeg: &[u8]) -> io::Result<()> {
    write!(out, "--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY)?;
    out.write_all(jpeg)?;
    out.write_all(b"\r\n")?;
    out.flush()
}
