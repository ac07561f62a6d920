//! Local video file source for offline detection.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use image::RgbImage;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;

/// Decodes a local video file frame by frame. `read_frame` returns
/// `Ok(None)` at end of file.
pub struct VideoFileSource {
    path: PathBuf,
    #[cfg(feature = "ingest-file-ffmpeg")]
    inner: FfmpegFileSource,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "video input must be a local file path, got '{}'",
                path.display()
            ));
        }
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            Ok(Self {
                path: path.to_path_buf(),
                inner: FfmpegFileSource::open(path)?,
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "cannot open '{}': video input requires the ingest-file-ffmpeg feature",
                path.display()
            ))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            self.inner.next_frame()
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Ok(None)
        }
    }

    fn is_open(&self) -> bool {
        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            !self.inner.is_finished()
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            false
        }
    }
}

fn is_local_file_path(path: &Path) -> bool {
    let text = path.to_string_lossy();
    !text.trim().is_empty() && !text.contains("://")
}
