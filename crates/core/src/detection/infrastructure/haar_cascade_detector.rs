use std::path::{Path, PathBuf};
#[cfg(feature = "opencv")]
use std::sync::Mutex;

#[cfg(feature = "opencv")]
use opencv::core::{Mat, Rect, Scalar, Size, Vector, CV_8UC3};
#[cfg(feature = "opencv")]
use opencv::imgproc;
#[cfg(feature = "opencv")]
use opencv::objdetect::CascadeClassifier;
#[cfg(feature = "opencv")]
use opencv::prelude::*;
use thiserror::Error;

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR};
use crate::shared::frame::Frame;
use crate::shared::settings::AnalysisSettings;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    NotFound(PathBuf),
    #[error("cascade path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
    #[error("no usable cascade in {0}")]
    Empty(PathBuf),
    #[error("invalid detection config: {0}")]
    InvalidConfig(String),
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("Haar cascade detection needs the `opencv` feature")]
    NotBuilt,
}

/// Multi-scale search parameters, passed straight to `detectMultiScale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionConfig {
    /// Ratio between consecutive pyramid levels; must exceed 1.
    pub scale_factor: f64,
    /// Raw hits required around a face before it is reported. 0 returns raw hits.
    pub min_neighbors: u32,
    /// Smallest face side in pixels; 0 means the cascade window.
    pub min_size: u32,
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), CascadeError> {
        if !(self.scale_factor.is_finite() && self.scale_factor > 1.0) {
            return Err(CascadeError::InvalidConfig(format!(
                "scale factor must be greater than 1.0, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: 0,
        }
    }
}

impl From<&AnalysisSettings> for DetectionConfig {
    fn from(settings: &AnalysisSettings) -> Self {
        Self {
            scale_factor: settings.scale_factor,
            min_neighbors: settings.min_neighbors,
            min_size: settings.min_face_size,
        }
    }
}

/// Frontal-face detector backed by OpenCV's `CascadeClassifier`.
///
/// `detectMultiScale` needs `&mut`, so concurrent analyses take turns on the
/// classifier lock.
pub struct HaarCascadeDetector {
    #[cfg(feature = "opencv")]
    classifier: Mutex<CascadeClassifier>,
    config: DetectionConfig,
}

impl HaarCascadeDetector {
    pub fn from_file(path: &Path, config: DetectionConfig) -> Result<Self, CascadeError> {
        config.validate()?;
        if !path.is_file() {
            return Err(CascadeError::NotFound(path.to_path_buf()));
        }
        Self::load(path, config)
    }

    #[cfg(feature = "opencv")]
    fn load(path: &Path, config: DetectionConfig) -> Result<Self, CascadeError> {
        let filename = path
            .to_str()
            .ok_or_else(|| CascadeError::NonUtf8Path(path.to_path_buf()))?;
        let classifier = CascadeClassifier::new(filename)?;
        if classifier.empty()? {
            return Err(CascadeError::Empty(path.to_path_buf()));
        }
        log::info!(
            "Loaded cascade {} (scale_factor={}, min_neighbors={}, min_size={})",
            path.display(),
            config.scale_factor,
            config.min_neighbors,
            config.min_size
        );
        Ok(Self {
            classifier: Mutex::new(classifier),
            config,
        })
    }

    #[cfg(not(feature = "opencv"))]
    fn load(_path: &Path, _config: DetectionConfig) -> Result<Self, CascadeError> {
        Err(CascadeError::NotBuilt)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    #[cfg(feature = "opencv")]
    fn detect_gray(&self, gray: &Mat) -> opencv::Result<Vec<Rect>> {
        let min = i32::try_from(self.config.min_size).unwrap_or(i32::MAX);
        let min_neighbors = i32::try_from(self.config.min_neighbors).unwrap_or(i32::MAX);
        let mut objects = Vector::<Rect>::new();

        let mut classifier = self
            .classifier
            .lock()
            .map_err(|_| opencv::Error::new(opencv::core::StsError, "cascade lock poisoned"))?;
        classifier.detect_multi_scale(
            gray,
            &mut objects,
            self.config.scale_factor,
            min_neighbors,
            0,
            Size::new(min, min),
            Size::default(),
        )?;
        Ok(objects.to_vec())
    }
}

/// Packs the RGB frame into a `Mat` and converts it with the BT.601 weights.
#[cfg(feature = "opencv")]
fn to_gray(frame: &Frame) -> opencv::Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        frame.height() as i32,
        frame.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(frame.data());

    let mut gray = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY)?;
    Ok(gray)
}

fn check_frame(frame: &Frame) -> Result<(), DetectionError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(DetectionError::InvalidFrame {
            index: frame.index(),
            reason: "frame has no pixels".to_string(),
        });
    }
    if frame.channels() != 3 {
        return Err(DetectionError::InvalidFrame {
            index: frame.index(),
            reason: format!("expected RGB, got {} channels", frame.channels()),
        });
    }
    Ok(())
}

#[cfg(feature = "opencv")]
impl FaceDetector for HaarCascadeDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError> {
        check_frame(frame)?;

        let rects = to_gray(frame)
            .and_then(|gray| self.detect_gray(&gray))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        Ok(rects
            .into_iter()
            .filter_map(|r| {
                BoundingBox::new(
                    r.x.max(0) as u32,
                    r.y.max(0) as u32,
                    r.width.max(0) as u32,
                    r.height.max(0) as u32,
                )
                .clamp_to(frame.width(), frame.height())
            })
            .collect())
    }
}

/// Never constructed: [`HaarCascadeDetector::from_file`] fails without OpenCV.
#[cfg(not(feature = "opencv"))]
impl FaceDetector for HaarCascadeDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError> {
        check_frame(frame)?;
        Err(DetectionError::Inference(CascadeError::NotBuilt.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Single-stump cascade with a 4x4 window that accepts windows whose
    /// bottom half is brighter than the top half.
    const BRIGHT_BOTTOM_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>4</height>
  <width>4</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 5.0000000000000000e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 4 2 -1.</_>
        <_>
          0 2 4 2 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    /// OpenCV picks the storage format from the extension.
    fn cascade_file(xml: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn raw_config() -> DetectionConfig {
        DetectionConfig {
            min_neighbors: 0,
            ..DetectionConfig::default()
        }
    }

    #[test]
    fn test_rejects_scale_factor_of_one() {
        let file = cascade_file(BRIGHT_BOTTOM_CASCADE);
        let config = DetectionConfig {
            scale_factor: 1.0,
            ..DetectionConfig::default()
        };
        assert!(matches!(
            HaarCascadeDetector::from_file(file.path(), config),
            Err(CascadeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_cascade_file() {
        let result = HaarCascadeDetector::from_file(
            Path::new("/nonexistent/haarcascade.xml"),
            DetectionConfig::default(),
        );
        assert!(matches!(result, Err(CascadeError::NotFound(_))));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = AnalysisSettings {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_face_size: 40,
            ..AnalysisSettings::default()
        };
        let config = DetectionConfig::from(&settings);
        assert_eq!(
            config,
            DetectionConfig {
                scale_factor: 1.1,
                min_neighbors: 3,
                min_size: 40,
            }
        );
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_loading_without_opencv_fails() {
        let file = cascade_file(BRIGHT_BOTTOM_CASCADE);
        let result = HaarCascadeDetector::from_file(file.path(), DetectionConfig::default());
        assert!(matches!(result, Err(CascadeError::NotBuilt)));
    }

    #[cfg(feature = "opencv")]
    mod with_opencv {
        use super::*;

        fn detector(config: DetectionConfig) -> HaarCascadeDetector {
            let file = cascade_file(BRIGHT_BOTTOM_CASCADE);
            HaarCascadeDetector::from_file(file.path(), config).unwrap()
        }

        /// Gray frame whose rows from `bright_from` down are white.
        fn bright_bottom_frame(w: u32, h: u32, bright_from: u32) -> Frame {
            let mut data = Vec::with_capacity((w * h * 3) as usize);
            for y in 0..h {
                let v = if y >= bright_from { 255 } else { 0 };
                for _ in 0..w {
                    data.extend_from_slice(&[v, v, v]);
                }
            }
            Frame::new(data, w, h, 3, 0)
        }

        #[test]
        fn test_window_on_bottom_edge_is_scanned() {
            // Rows 4 and 5 bright: only the window at y=2 straddles the edge.
            let faces = detector(raw_config())
                .detect(&bright_bottom_frame(6, 6, 4))
                .unwrap();
            assert!(
                faces.contains(&BoundingBox::new(0, 2, 4, 4)),
                "faces = {faces:?}"
            );
        }

        #[test]
        fn test_uniform_frame_has_no_faces() {
            let frame = Frame::uniform(32, 32, [90, 90, 90], 0);
            assert!(detector(raw_config()).detect(&frame).unwrap().is_empty());
        }

        #[test]
        fn test_min_neighbors_drops_isolated_hits() {
            let frame = bright_bottom_frame(16, 16, 8);
            let raw = detector(raw_config()).detect(&frame).unwrap();
            let grouped = detector(DetectionConfig {
                min_neighbors: 1,
                ..DetectionConfig::default()
            })
            .detect(&frame)
            .unwrap();
            assert!(!raw.is_empty());
            assert!(grouped.len() < raw.len());
        }

        #[test]
        fn test_detected_boxes_lie_inside_frame() {
            let faces = detector(raw_config())
                .detect(&bright_bottom_frame(16, 12, 6))
                .unwrap();
            assert!(!faces.is_empty());
            for f in faces {
                assert!(f.x + f.width <= 16);
                assert!(f.y + f.height <= 12);
            }
        }

        #[test]
        fn test_empty_frame_is_invalid() {
            let frame = Frame::new(Vec::new(), 0, 0, 3, 7);
            assert!(matches!(
                detector(DetectionConfig::default()).detect(&frame),
                Err(DetectionError::InvalidFrame { index: 7, .. })
            ));
        }

        #[test]
        fn test_malformed_cascade_is_rejected() {
            let file = cascade_file("<opencv_storage><cascade></cascade></opencv_storage>");
            assert!(HaarCascadeDetector::from_file(file.path(), DetectionConfig::default()).is_err());
        }
    }
}
