use std::fmt;
use std::sync::Arc;

use super::face_detector::FaceDetector;

/// The face detector as loaded once at process start.
///
/// A failed load is a value, not an error: every analysis handed an
/// `Unavailable` capability reports the fallback score without decoding.
#[derive(Clone)]
pub enum DetectorCapability {
    Available(Arc<dyn FaceDetector>),
    Unavailable { reason: String },
}

impl DetectorCapability {
    /// Runs `loader` and records its failure instead of propagating it.
    pub fn load<D, E, F>(loader: F) -> Self
    where
        D: FaceDetector + 'static,
        E: fmt::Display,
        F: FnOnce() -> Result<D, E>,
    {
        match loader() {
            Ok(detector) => Self::Available(Arc::new(detector)),
            Err(e) => {
                log::error!("Face detector failed to load, analyses will use the fallback score: {e}");
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn from_detector(detector: Arc<dyn FaceDetector>) -> Self {
        Self::Available(detector)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn detector(&self) -> Option<&Arc<dyn FaceDetector>> {
        match self {
            Self::Available(detector) => Some(detector),
            Self::Unavailable { .. } => None,
        }
    }
}

impl fmt::Debug for DetectorCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(_) => write!(f, "Available"),
            Self::Unavailable { reason } => write!(f, "Unavailable({reason})"),
        }
    }
}
