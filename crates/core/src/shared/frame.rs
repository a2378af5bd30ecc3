use ndarray::ArrayView3;

/// Channel index of red in a [`Frame`]'s packed pixel layout.
pub const RED_CHANNEL: usize = 0;

/// A single decoded video frame: contiguous RGB bytes in row-major order.
///
/// Frames are produced by a frame source, handed through one iteration of
/// the analysis loop and then dropped. Format conversion happens at the
/// decoder boundary only.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        debug_assert!(channels >= 3, "frames need at least three channels");
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Builds a frame where every pixel has the same RGB value.
    pub fn uniform(width: u32, height: u32, rgb: [u8; 3], index: usize) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of this frame in decode order, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `(height, width, channels)` view over the pixel buffer.
    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(
            (
                self.height as usize,
                self.width as usize,
                self.channels as usize,
            ),
            &self.data,
        )
        .expect("Frame data length must match dimensions")
    }
}
