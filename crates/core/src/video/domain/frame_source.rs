use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

use super::video_reader::{VideoError, VideoReader};

/// An opened video whose decoder is released exactly once.
///
/// The reader is closed by [`FrameSource::close`] or, failing that, when the
/// source is dropped, so early returns and unwinding release it too.
pub struct FrameSource {
    reader: Box<dyn VideoReader>,
    metadata: VideoMetadata,
    consumed: bool,
    closed: bool,
}

impl FrameSource {
    /// Opens `path` with `reader`. On failure the reader is closed before
    /// the error is returned.
    pub fn open(mut reader: Box<dyn VideoReader>, path: &Path) -> Result<Self, VideoError> {
        match reader.open(path) {
            Ok(metadata) => Ok(Self {
                reader,
                metadata,
                consumed: false,
                closed: false,
            }),
            Err(e) => {
                reader.close();
                Err(e)
            }
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn frame_rate(&self) -> f64 {
        self.metadata.frame_rate()
    }

    pub fn frame_count(&self) -> usize {
        self.metadata.total_frames
    }

    /// The single pass over this source's frames.
    ///
    /// The sequence ends at end-of-stream or at the first decode error.
    pub fn frames(&mut self) -> Result<Frames<'_>, VideoError> {
        if self.closed {
            return Err(VideoError::NotOpened);
        }
        if self.consumed {
            return Err(VideoError::AlreadyConsumed);
        }
        self.consumed = true;
        Ok(Frames {
            inner: self.reader.frames(),
            done: false,
        })
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.reader.close();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Lazy frame sequence that stops at the first decode error.
pub struct Frames<'a> {
    inner: Box<dyn Iterator<Item = Result<Frame, VideoError>> + 'a>,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Ok(frame)) => Some(frame),
            Some(Err(e)) => {
                log::warn!("Stopping at decode error: {e}");
                self.done = true;
                None
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
