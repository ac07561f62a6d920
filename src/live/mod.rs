//! Live camera detection: the session controller and the MJPEG emitter.

pub mod session;
pub mod stream;

pub use session::{LiveSession, Pull, SessionState, SourceOpener, StartOutcome};
pub use stream::{write_part, StreamEmitter, StreamEnd, StreamStats, BOUNDARY, CONTENT_TYPE};
