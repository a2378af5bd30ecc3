use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("frame {index} is unusable for detection: {reason}")]
    InvalidFrame { index: usize, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Domain interface for face detection.
///
/// Detectors hold a loaded model and are shared read-only between
/// concurrent analyses, hence `&self` and `Sync`.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError>;
}
