use std::path::PathBuf;

use super::constants::DEFAULT_FRAME_RATE;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    /// Display width, after any rotation is applied.
    pub width: u32,
    /// Display height, after any rotation is applied.
    pub height: u32,
    /// Frame rate as reported by the container; may be 0 when unknown.
    pub fps: f64,
    /// Informational only; containers frequently report 0.
    pub total_frames: usize,
    pub codec: String,
    /// Clockwise rotation (0, 90, 180 or 270) applied to every decoded frame.
    pub rotation: i32,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Reported frame rate, or 30 fps when the source reports nothing usable.
    pub fn frame_rate(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            DEFAULT_FRAME_RATE
        }
    }
}
