pub const CASCADE_MODEL_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// Neutral score returned whenever a clip cannot be analyzed.
pub const FALLBACK_SCORE: f64 = 0.5;

/// Used when the container reports no frame rate.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Red-channel standard deviation that maps to a score of 1.0.
pub const SCORE_NORMALIZER: f64 = 20.0;

/// Fewer samples than this cannot yield a variability estimate.
pub const MIN_SAMPLES: usize = 2;

pub const DEFAULT_SCALE_FACTOR: f64 = 1.3;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 5;

/// Site identifier reported when the caller supplies none.
pub const UNKNOWN_SITE: &str = "unknown_site";

/// Capture method reported alongside every score.
pub const CAPTURE_METHOD: &str = "webcam";
