/// Axis-aligned face box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Area in pixels, widened so large boxes cannot overflow.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamps the box to a `frame_w` x `frame_h` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<BoundingBox> {
        let x2 = self.x.saturating_add(self.width).min(frame_w);
        let y2 = self.y.saturating_add(self.height).min(frame_h);
        if self.x >= x2 || self.y >= y2 {
            return None;
        }
        Some(BoundingBox::new(self.x, self.y, x2 - self.x, y2 - self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_area() {
        assert_eq!(BoundingBox::new(5, 5, 20, 30).area(), 600);
    }

    #[test]
    fn test_area_does_not_overflow() {
        let b = BoundingBox::new(0, 0, u32::MAX, 2);
        assert_eq!(b.area(), u32::MAX as u64 * 2);
    }

    #[rstest]
    #[case::zero_width(BoundingBox::new(0, 0, 0, 10), true)]
    #[case::zero_height(BoundingBox::new(0, 0, 10, 0), true)]
    #[case::non_empty(BoundingBox::new(0, 0, 1, 1), false)]
    fn test_is_empty(#[case] b: BoundingBox, #[case] expected: bool) {
        assert_eq!(b.is_empty(), expected);
    }

    #[test]
    fn test_clamp_inside_frame_is_identity() {
        let b = BoundingBox::new(10, 10, 20, 20);
        assert_eq!(b.clamp_to(100, 100), Some(b));
    }

    #[test]
    fn test_clamp_trims_overhang() {
        let b = BoundingBox::new(90, 80, 20, 40);
        assert_eq!(b.clamp_to(100, 100), Some(BoundingBox::new(90, 80, 10, 20)));
    }

    #[test]
    fn test_clamp_outside_frame_is_none() {
        let b = BoundingBox::new(120, 10, 20, 20);
        assert_eq!(b.clamp_to(100, 100), None);
    }
}
