/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// Alternative to the Haar cascade for clips where the cascade misses
/// faces. Produces plain boxes; landmarks in the model output are ignored.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

const NMS_IOU_THRESH: f64 = 0.3;

/// Anchors of the short-range model: 16x16x2 + 8x8x6.
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

/// BlazeFace detector backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so concurrent analyses take turns
/// on the session lock.
pub struct OnnxBlazefaceDetector {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(super::execution_provider::preferred_execution_providers())?
            .commit_from_file(model_path)?;
        log::info!(
            "Loaded BlazeFace model {} (confidence={confidence})",
            model_path.display()
        );
        Ok(Self {
            session: Mutex::new(session),
            confidence,
            anchors: generate_anchors(),
        })
    }

    fn infer(&self, frame: &Frame) -> Result<(Vec<f32>, Vec<f32>), DetectionError> {
        let input = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::Inference("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(DetectionError::Inference(format!(
                "expected 2 outputs, got {}",
                outputs.len()
            )));
        }
        let extract = |i: usize| -> Result<Vec<f32>, DetectionError> {
            let array = outputs[i]
                .try_extract_array::<f32>()
                .map_err(|e| DetectionError::Inference(e.to_string()))?;
            Ok(array.iter().copied().collect())
        };
        Ok((extract(0)?, extract(1)?))
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<BoundingBox>, DetectionError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectionError::InvalidFrame {
                index: frame.index(),
                reason: "frame has no pixels".to_string(),
            });
        }

        let (regressors, scores) = self.infer(frame)?;
        let mut candidates = decode(
            &regressors,
            &scores,
            &self.anchors,
            self.confidence as f32,
            frame.width(),
            frame.height(),
        );
        let kept = nms(&mut candidates, NMS_IOU_THRESH);

        Ok(kept
            .iter()
            .filter_map(|c| {
                let b = BoundingBox::new(
                    c.x1 as u32,
                    c.y1 as u32,
                    (c.x2 - c.x1) as u32,
                    (c.y2 - c.y1) as u32,
                );
                b.clamp_to(frame.width(), frame.height())
                    .filter(|b| !b.is_empty())
            })
            .collect())
    }
}

/// Nearest-neighbour resize to `size x size`, normalized to [0,1], NCHW.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
        src[[src_y, src_x, c]] as f32 / 255.0
    })
}

/// Anchor centers for the two short-range feature maps (16x16 and 8x8).
fn generate_anchors() -> Vec<[f32; 2]> {
    let layers = [(8usize, 2usize), (16, 6)]; // (stride, anchors per cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in layers {
        let grid = INPUT_SIZE as usize / stride;
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

#[derive(Clone, Debug, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Turns raw model outputs into frame-space candidates above `confidence`.
fn decode(
    regressors: &[f32],
    scores: &[f32],
    anchors: &[[f32; 2]],
    confidence: f32,
    frame_w: u32,
    frame_h: u32,
) -> Vec<Candidate> {
    let (fw, fh) = (frame_w as f32, frame_h as f32);
    let input = INPUT_SIZE as f32;

    scores
        .iter()
        .zip(anchors)
        .enumerate()
        .filter_map(|(i, (&raw, anchor))| {
            let score = sigmoid(raw);
            let reg = regressors.get(i * REGRESSOR_STRIDE..i * REGRESSOR_STRIDE + 4)?;
            if score < confidence {
                return None;
            }
            let cx = anchor[0] + reg[0] / input;
            let cy = anchor[1] + reg[1] / input;
            let w = reg[2] / input;
            let h = reg[3] / input;
            Some(Candidate {
                x1: ((cx - w / 2.0) * fw).max(0.0),
                y1: ((cy - h / 2.0) * fh).max(0.0),
                x2: ((cx + w / 2.0) * fw).min(fw),
                y2: ((cy + h / 2.0) * fh).min(fh),
                score,
            })
        })
        .filter(|c| c.x2 > c.x1 && c.y2 > c.y1)
        .collect()
}

/// Greedy non-maximum suppression, highest score first.
fn nms(candidates: &mut [Candidate], iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for c in candidates.iter() {
        if keep.iter().all(|k| iou(k, c) <= iou_thresh) {
            keep.push(c.clone());
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f64 {
    let iw = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0) as f64;
    let ih = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0) as f64;
    let inter = iw * ih;
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = ((a.x2 - a.x1) * (a.y2 - a.y1)) as f64;
    let area_b = ((b.x2 - b.x1) * (b.y2 - b.y1)) as f64;
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
