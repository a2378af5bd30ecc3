use std::ops::Range;

use ndarray::s;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::{Frame, RED_CHANNEL};

/// Forehead sub-region of a face box, as half-open row and column ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeheadRoi {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl ForeheadRoi {
    /// Rows `[y + h/5, y + h/3)` and columns `[x + w/4, x + 3w/4)`,
    /// integer division throughout.
    pub fn from_face(face: &BoundingBox) -> Self {
        let (x, y) = (face.x as usize, face.y as usize);
        let (w, h) = (face.width as usize, face.height as usize);
        Self {
            rows: y + h / 5..y + h / 3,
            cols: x + w / 4..x + 3 * w / 4,
        }
    }

    /// Restricts both ranges to a `width` x `height` frame. Ranges that fall
    /// outside the frame collapse to empty.
    pub fn clip(&self, width: u32, height: u32) -> Self {
        let clip = |r: &Range<usize>, limit: usize| {
            let end = r.end.min(limit);
            r.start.min(end)..end
        };
        Self {
            rows: clip(&self.rows, height as usize),
            cols: clip(&self.cols, width as usize),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    pub fn pixel_count(&self) -> usize {
        self.rows.len() * self.cols.len()
    }
}

/// Reduces a face's forehead to one red-intensity sample.
pub struct SignalExtractor;

impl SignalExtractor {
    /// Mean red value over the forehead ROI, or `None` when the ROI has no
    /// pixels inside the frame.
    pub fn extract(frame: &Frame, face: &BoundingBox) -> Option<f64> {
        let roi = ForeheadRoi::from_face(face).clip(frame.width(), frame.height());
        if roi.is_empty() {
            return None;
        }

        let view = frame.as_ndarray();
        let red = view.slice(s![roi.rows.clone(), roi.cols.clone(), RED_CHANNEL]);
        let total: u64 = red.iter().map(|&v| v as u64).sum();
        Some(total as f64 / roi.pixel_count() as f64)
    }
}
