use std::path::Path;

use image::{imageops, RgbImage};

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::{VideoError, VideoReader};

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec).
///
/// Converts each decoded frame to RGB24, turns it upright according to the
/// stream's display rotation and wraps it in a [`Frame`].
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
    rotation: i32,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
            rotation: 0,
        }
    }

    fn build_iter(&mut self) -> Result<FfmpegFrameIter<'_>, VideoError> {
        let ictx = self.input_ctx.as_mut().ok_or(VideoError::NotOpened)?;

        let stream = ictx
            .stream(self.video_stream_index)
            .ok_or(VideoError::NotOpened)?;
        let decoder = open_decoder(&stream)?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| VideoError::Scaler(e.to_string()))?;

        Ok(FfmpegFrameIter {
            ictx,
            decoder,
            scaler,
            width,
            height,
            rotation: self.rotation,
            video_stream_index: self.video_stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoReader for FfmpegReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, VideoError> {
        let open_err = |reason: String| VideoError::Open {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_err(e.to_string()))?;
        let ictx = ffmpeg_next::format::input(path).map_err(|e| open_err(e.to_string()))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| VideoError::NoVideoStream(path.to_path_buf()))?;

        let video_stream_index = stream.index();
        let decoder = open_decoder(&stream)?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let rotation = extract_rotation(&stream);
        let (width, height) = if rotation % 180 == 0 {
            (decoder.width(), decoder.height())
        } else {
            (decoder.height(), decoder.width())
        };

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            rotation,
            source_path: Some(path.to_path_buf()),
        };

        if rotation != 0 {
            log::debug!("{}: rotating frames {rotation} degrees", path.display());
        }
        self.video_stream_index = video_stream_index;
        self.rotation = rotation;
        self.input_ctx = Some(ictx);

        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, VideoError>> + '_> {
        match self.build_iter() {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
    }
}

fn open_decoder(
    stream: &ffmpeg_next::format::stream::Stream,
) -> Result<ffmpeg_next::decoder::Video, VideoError> {
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| VideoError::Decoder(e.to_string()))?;
    codec_ctx
        .decoder()
        .video()
        .map_err(|e| VideoError::Decoder(e.to_string()))
}

/// Lazy iterator that decodes one frame at a time.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    rotation: i32,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl FfmpegFrameIter<'_> {
    fn try_receive(&mut self) -> Option<Result<Frame, VideoError>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            self.done = true;
            return Some(Err(VideoError::Scaler(e.to_string())));
        }

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let index = self.frame_index;
        self.frame_index += 1;
        Some(
            orient(pixels, self.width, self.height, self.rotation)
                .map(|(pixels, width, height)| Frame::new(pixels, width, height, 3, index)),
        )
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<Frame, VideoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            // A packet the decoder rejects is dropped; later packets may still decode.
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Extracts the display rotation of a video stream as clockwise degrees.
///
/// Tries stream side data (DisplayMatrix) first, then falls back to the
/// `"rotate"` metadata tag. Returns 0, 90, 180, or 270.
fn extract_rotation(stream: &ffmpeg_next::format::stream::Stream) -> i32 {
    for side_data in stream.side_data() {
        if side_data.kind() == ffmpeg_next::codec::packet::side_data::Type::DisplayMatrix {
            if let Some(angle) = parse_display_matrix(side_data.data()) {
                return normalize_rotation(angle);
            }
        }
    }

    if let Some(rotate) = stream.metadata().get("rotate") {
        if let Ok(angle) = rotate.parse::<i32>() {
            return normalize_rotation(angle);
        }
    }

    0
}

/// Reads the clockwise display rotation from a 3x3 display matrix
/// (9 little-endian i32 values, 16.16 fixed point).
///
/// The matrix rotates the coded picture counterclockwise by
/// `-atan2(m[1], m[0])`; displaying it upright takes the opposite turn.
fn parse_display_matrix(data: &[u8]) -> Option<i32> {
    if data.len() < 36 {
        return None;
    }

    let m0 = i32::from_le_bytes(data[0..4].try_into().ok()?) as f64 / 65536.0;
    let m1 = i32::from_le_bytes(data[4..8].try_into().ok()?) as f64 / 65536.0;
    if m0 == 0.0 && m1 == 0.0 {
        return None;
    }

    Some(m1.atan2(m0).to_degrees().round() as i32)
}

/// Snaps an angle to the nearest of 0, 90, 180, or 270.
fn normalize_rotation(angle: i32) -> i32 {
    match angle.rem_euclid(360) {
        0..=44 | 316..=359 => 0,
        45..=134 => 90,
        135..=224 => 180,
        _ => 270,
    }
}

/// Rotates a packed RGB buffer clockwise by `rotation` degrees.
fn orient(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    rotation: i32,
) -> Result<(Vec<u8>, u32, u32), VideoError> {
    if rotation == 0 {
        return Ok((pixels, width, height));
    }
    let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
        VideoError::Decoder(format!("decoded frame is not {width}x{height} RGB"))
    })?;
    let upright = match rotation {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        _ => image,
    };
    let (width, height) = upright.dimensions();
    Ok((upright.into_raw(), width, height))
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

/// Encodes a small MPEG-4 clip whose frame `i` is filled with `color(i)`.
#[cfg(test)]
pub(crate) fn write_test_video(
    path: &Path,
    num_frames: usize,
    width: u32,
    height: u32,
    color: impl Fn(usize) -> [u8; 3],
) {
    let fps = 30;
    ffmpeg_next::init().unwrap();

    let mut octx = ffmpeg_next::format::output(path).unwrap();
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

    let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
    let mut ost = octx.add_stream(Some(codec)).unwrap();

    let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .unwrap();
    encoder_ctx.set_width(width);
    encoder_ctx.set_height(height);
    encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
    encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
    encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
    if global_header {
        encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
    }

    let mut encoder = encoder_ctx
        .open_with(ffmpeg_next::Dictionary::new())
        .unwrap();
    ost.set_parameters(&encoder);
    octx.write_header().unwrap();
    let ost_time_base = octx.stream(0).unwrap().time_base();

    let mut scaler = ffmpeg_next::software::scaling::Context::get(
        ffmpeg_next::format::Pixel::RGB24,
        width,
        height,
        ffmpeg_next::format::Pixel::YUV420P,
        width,
        height,
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )
    .unwrap();

    for i in 0..num_frames {
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
        );
        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data_mut(0);
        let rgb = color(i);
        for row in 0..height as usize {
            for col in 0..width as usize {
                let offset = row * stride + col * 3;
                data[offset..offset + 3].copy_from_slice(&rgb);
            }
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
        yuv_frame.set_pts(Some(i as i64));
        encoder.send_frame(&yuv_frame).unwrap();

        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
    }

    encoder.send_eof().unwrap();
    let mut encoded = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(0);
        encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
        encoded.write_interleaved(&mut octx).unwrap();
    }
    octx.write_trailer().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn test_video_path(dir: &Path) -> PathBuf {
        dir.join("test.mp4")
    }

    fn gray_ramp(i: usize) -> [u8; 3] {
        let v = ((i * 40) % 256) as u8;
        [v, v, v]
    }

    #[test]
    fn test_open_returns_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 5, 160, 120, gray_ramp);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&path).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!(meta.frame_rate() > 0.0);
        assert_eq!(meta.source_path, Some(path));
    }

    #[test]
    fn test_open_nonexistent_is_open_error() {
        let mut reader = FfmpegReader::new();
        let err = reader.open(Path::new("/nonexistent/test.mp4")).unwrap_err();
        assert!(matches!(err, VideoError::Open { .. }));
    }

    #[test]
    fn test_open_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.webm");
        std::fs::write(&path, b"definitely not a video container").unwrap();

        let mut reader = FfmpegReader::new();
        assert!(reader.open(&path).is_err());
    }

    #[test]
    fn test_frames_yields_correct_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 5, 160, 120, gray_ramp);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        let frames: Vec<_> = reader.frames().collect();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|f| f.is_ok()));
    }

    #[test]
    fn test_frames_have_sequential_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 5, 160, 120, gray_ramp);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        let frames: Vec<_> = reader.frames().map(|f| f.unwrap()).collect();
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
        }
    }

    #[test]
    fn test_frames_are_packed_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 2, 160, 120, |_| [200, 40, 40]);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();

        let frame = reader.frames().next().unwrap().unwrap();
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 160 * 120 * 3);
        // Lossy YUV round trip: red stays clearly dominant.
        let center = frame.as_ndarray()[[60, 80, 0]];
        assert!(center > 150, "red channel was {center}");
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = FfmpegReader::new();
        let result = reader.frames().next().unwrap();
        assert!(matches!(result, Err(VideoError::NotOpened)));
    }

    #[test]
    fn test_frames_after_close_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 1, 160, 120, gray_ramp);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        assert!(reader.frames().next().unwrap().is_err());
    }

    /// 3x2 buffer with a red pixel in the top-left corner.
    fn corner_marked() -> Vec<u8> {
        let mut pixels = vec![0u8; 3 * 2 * 3];
        pixels[0] = 255;
        pixels
    }

    fn display_matrix(m0: i32, m1: i32, m3: i32, m4: i32) -> Vec<u8> {
        let mut data = vec![0u8; 36];
        data[0..4].copy_from_slice(&m0.to_le_bytes());
        data[4..8].copy_from_slice(&m1.to_le_bytes());
        data[12..16].copy_from_slice(&m3.to_le_bytes());
        data[16..20].copy_from_slice(&m4.to_le_bytes());
        data[32..36].copy_from_slice(&(1i32 << 30).to_le_bytes());
        data
    }

    #[rstest]
    #[case::identity(display_matrix(65536, 0, 0, 65536), 0)]
    #[case::portrait_phone(display_matrix(0, 65536, -65536, 0), 90)]
    #[case::upside_down(display_matrix(-65536, 0, 0, -65536), 180)]
    #[case::portrait_flipped(display_matrix(0, -65536, 65536, 0), 270)]
    fn test_display_matrix_rotation(#[case] data: Vec<u8>, #[case] expected: i32) {
        let angle = parse_display_matrix(&data).unwrap();
        assert_eq!(normalize_rotation(angle), expected);
    }

    #[test]
    fn test_short_display_matrix_is_ignored() {
        assert_eq!(parse_display_matrix(&[0u8; 20]), None);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(90, 90)]
    #[case(-90, 270)]
    #[case(360, 0)]
    #[case(-180, 180)]
    #[case(44, 0)]
    #[case(45, 90)]
    #[case(315, 270)]
    #[case(316, 0)]
    fn test_normalize_rotation(#[case] angle: i32, #[case] expected: i32) {
        assert_eq!(normalize_rotation(angle), expected);
    }

    #[test]
    fn test_orient_quarter_turn_moves_corner_to_top_right() {
        let (pixels, w, h) = orient(corner_marked(), 3, 2, 90).unwrap();
        assert_eq!((w, h), (2, 3));
        let frame = Frame::new(pixels, w, h, 3, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr[[0, 1, 0]], 255);
        assert_eq!(arr[[0, 0, 0]], 0);
    }

    #[rstest]
    #[case(180, (3, 2), [1, 2])]
    #[case(270, (2, 3), [2, 0])]
    fn test_orient_other_turns(
        #[case] rotation: i32,
        #[case] dims: (u32, u32),
        #[case] marked: [usize; 2],
    ) {
        let (pixels, w, h) = orient(corner_marked(), 3, 2, rotation).unwrap();
        assert_eq!((w, h), dims);
        let frame = Frame::new(pixels, w, h, 3, 0);
        assert_eq!(frame.as_ndarray()[[marked[0], marked[1], 0]], 255);
    }

    #[test]
    fn test_orient_without_rotation_keeps_buffer() {
        let (pixels, w, h) = orient(corner_marked(), 3, 2, 0).unwrap();
        assert_eq!((w, h), (3, 2));
        assert_eq!(pixels, corner_marked());
    }

    #[test]
    fn test_unrotated_clip_reports_zero_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 1, 160, 120, gray_ramp);

        let mut reader = FfmpegReader::new();
        assert_eq!(reader.open(&path).unwrap().rotation, 0);
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video_path(dir.path());
        write_test_video(&path, 1, 160, 120, gray_ramp);

        let mut reader = FfmpegReader::new();
        reader.open(&path).unwrap();
        reader.close();
        reader.close();
    }
}
