//! Live session controller: IDLE/ACTIVE state plus the one camera handle.

use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use image::RgbImage;

use crate::error::DetectError;
use crate::ingest::CameraHandle;

/// Opens a camera. Called on every start from IDLE and on re-acquire.
pub type SourceOpener = Box<dyn Fn() -> Result<CameraHandle> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// IDLE → ACTIVE with a freshly opened camera.
    Started,
    /// Already ACTIVE; the camera handle was still good.
    AlreadyActive,
    /// Already ACTIVE, but the camera had gone away and was reopened.
    Reacquired,
}

impl StartOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StartOutcome::Started => "Live detection started",
            StartOutcome::AlreadyActive | StartOutcome::Reacquired => "Detection already active",
        }
    }
}

/// Result of one pull from the active camera.
pub enum Pull {
    /// The session is IDLE; stream loops should end.
    Stopped,
    Frame(RgbImage),
    /// No frame this time. The session stays ACTIVE.
    Missed,
}

struct Inner {
    state: SessionState,
    source: Option<CameraHandle>,
    /// A stream loop has taken `source` out for a read.
    checked_out: bool,
    /// Bumped on every stop; a handle checked out under an older epoch is
    /// dropped instead of returned.
    epoch: u64,
}

/// One per process. State and handle change together under a single lock.
/// Reads happen outside it: `pull_frame` checks the handle out, reads, and
/// hands it back only if the session was not stopped in the meantime.
pub struct LiveSession {
    opener: SourceOpener,
    inner: Mutex<Inner>,
}

impl LiveSession {
    pub fn new(opener: SourceOpener) -> Self {
        Self {
            opener,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                source: None,
                checked_out: false,
                epoch: 0,
            }),
        }
    }

    pub fn start(&self) -> Result<StartOutcome, DetectError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Active => {
                if inner.checked_out
                    || inner.source.as_ref().is_some_and(|source| source.is_open())
                {
                    return Ok(StartOutcome::AlreadyActive);
                }
                // Dropping the dead handle first keeps at most one open.
                inner.source = None;
                match (self.opener)() {
                    Ok(source) => {
                        log::warn!("live camera was lost; reopened {}", source.describe());
                        inner.source = Some(source);
                    }
                    Err(err) => {
                        // Stay ACTIVE; stream loops keep retrying pulls.
                        log::warn!("live camera was lost and could not be reopened: {:#}", err);
                    }
                }
                Ok(StartOutcome::Reacquired)
            }
            SessionState::Idle => match (self.opener)() {
                Ok(source) => {
                    log::info!("live detection started on {}", source.describe());
                    inner.source = Some(source);
                    inner.state = SessionState::Active;
                    Ok(StartOutcome::Started)
                }
                Err(err) => {
                    log::error!("live detection start failed: {:#}", err);
                    Err(DetectError::SourceUnavailable(format!("{err:#}")))
                }
            },
        }
    }

    /// Always succeeds without waiting on a pending read. Releases the
    /// camera when ACTIVE; a handle that is mid-read is dropped by its
    /// reader as soon as the read returns.
    pub fn stop(&self) -> &'static str {
        let mut inner = self.lock();
        if inner.state == SessionState::Active {
            inner.state = SessionState::Idle;
            inner.epoch = inner.epoch.wrapping_add(1);
            if let Some(source) = inner.source.take() {
                log::info!("live detection stopped; released {}", source.describe());
            } else if inner.checked_out {
                log::info!("live detection stopped; camera released after the pending read");
            }
            inner.checked_out = false;
        }
        "Live detection stopped"
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Whether a camera handle is currently held, including one mid-read.
    pub fn has_source(&self) -> bool {
        let inner = self.lock();
        inner.source.is_some() || inner.checked_out
    }

    /// Read one frame from the session's camera. The lock is not held
    /// during the read.
    pub fn pull_frame(&self) -> Pull {
        let (mut source, epoch) = {
            let mut inner = self.lock();
            if inner.state == SessionState::Idle {
                return Pull::Stopped;
            }
            // Another stream holds the camera, or it could not be reopened.
            let Some(source) = inner.source.take() else {
                return Pull::Missed;
            };
            inner.checked_out = true;
            (source, inner.epoch)
        };

        let read = source.read_frame();

        {
            let mut inner = self.lock();
            if inner.epoch == epoch && inner.state == SessionState::Active {
                inner.source = Some(source);
                inner.checked_out = false;
            } else {
                drop(inner);
                log::debug!("dropping {} after stop", source.describe());
                drop(source);
                return Pull::Stopped;
            }
        }

        match read {
            Ok(Some(frame)) => Pull::Frame(frame),
            Ok(None) => Pull::Missed,
            Err(err) => {
                let err = DetectError::FrameRead(format!("{err:#}"));
                log::debug!("{}: {}", err.code(), err);
                Pull::Missed
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Transitions are plain assignments; a poisoned Inner is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
