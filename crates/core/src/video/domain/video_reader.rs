use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("no video stream found in {0}")]
    NoVideoStream(PathBuf),
    #[error("decoder error: {0}")]
    Decoder(String),
    #[error("pixel format conversion failed: {0}")]
    Scaler(String),
    #[error("video reader is not open")]
    NotOpened,
    #[error("frames were already consumed; open the source again")]
    AlreadyConsumed,
}

/// Decodes frames from a video file.
///
/// Implementations handle codec and container details; the pipeline only
/// sees [`Frame`] and [`VideoMetadata`].
pub trait VideoReader: Send {
    /// Opens a video file and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, VideoError>;

    /// Returns a lazy iterator over frames in decode order.
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, VideoError>> + '_>;

    /// Releases decoder resources. Safe to call more than once.
    fn close(&mut self);
}
