//! Preview frame encoding: downsample, JPEG, base64, rate limit.
//!
//! A raw camera frame is far too large for a low-bandwidth link, so every
//! transmitted frame goes through the same pipeline:
//!
//! 1. Downsample to half width and half height.
//! 2. Compress as JPEG at low quality (40 by default).
//! 3. Base64-encode (standard alphabet) so it fits in the `value` string of a
//!    `PREVIEW_FRAME` message.
//!
//! [`FrameThrottle`] drops frames that arrive less than the minimum interval
//! after the last accepted one.  Dropped frames are gone; they are never
//! queued for later, because a stale preview is worse than a missing one.

use std::io::Cursor;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// Errors produced while encoding or decoding a preview frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The image has no pixels.
    #[error("frame has zero width or height")]
    EmptyFrame,

    /// JPEG compression or decompression failed.
    #[error("image codec error: {0}")]
    Encode(#[from] image::ImageError),

    /// The payload is not valid base64.
    #[error("frame payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Admits at most one frame per `min_interval`.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: None,
        }
    }

    /// Returns `true` and records `now` when a frame may be sent.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }

    /// Forgets the last accepted frame so the next one is admitted immediately.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Downsamples `frame` by two in each dimension, compresses it as JPEG at
/// `quality`, and returns the base64 text.
///
/// # Errors
///
/// - [`FrameError::EmptyFrame`] for a zero-sized image.
/// - [`FrameError::Encode`] if JPEG compression fails.
pub fn compress_frame(frame: &DynamicImage, quality: u8) -> Result<String, FrameError> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(FrameError::EmptyFrame);
    }

    let small = frame.resize_exact((width / 2).max(1), (height / 2).max(1), FilterType::Triangle);
    let rgb = small.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&rgb)?;

    Ok(STANDARD.encode(jpeg))
}

/// Reverses [`compress_frame`]: base64 text back to a decoded image.
///
/// # Errors
///
/// [`FrameError::Decode`] for bad base64, [`FrameError::Encode`] for bad JPEG.
pub fn decompress_frame(payload: &str) -> Result<DynamicImage, FrameError> {
    let bytes = STANDARD.decode(payload.trim())?;
    let image = image::load(Cursor::new(bytes), ImageFormat::Jpeg)?;
    Ok(image)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_throttle_admits_first_frame_then_waits() {
        // Arrange
        let mut throttle = FrameThrottle::new(Duration::from_millis(250));
        let t0 = Instant::now();

        // Act / Assert
        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(100)));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(249)));
        assert!(throttle.try_acquire(t0 + Duration::from_millis(250)));
    }

    #[test]
    fn test_throttle_skipped_frames_do_not_extend_window() {
        let mut throttle = FrameThrottle::new(Duration::from_millis(250));
        let t0 = Instant::now();
        assert!(throttle.try_acquire(t0));
        for ms in [50, 100, 150, 200] {
            assert!(!throttle.try_acquire(t0 + Duration::from_millis(ms)));
        }
        assert!(throttle.try_acquire(t0 + Duration::from_millis(260)));
    }

    #[test]
    fn test_throttle_reset_admits_immediately() {
        let mut throttle = FrameThrottle::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(throttle.try_acquire(now));
        throttle.reset();
        assert!(throttle.try_acquire(now));
    }

    #[test]
    fn test_compress_frame_halves_dimensions() {
        // Arrange
        let frame = gradient(64, 48);

        // Act
        let payload = compress_frame(&frame, 40).unwrap();
        let decoded = decompress_frame(&payload).unwrap();

        // Assert
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_compress_frame_output_is_standard_base64_jpeg() {
        let payload = compress_frame(&gradient(16, 16), 40).unwrap();
        let bytes = STANDARD.decode(&payload).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
        assert!(!payload.contains('\n'));
    }

    #[test]
    fn test_compress_frame_keeps_one_pixel_images() {
        let decoded = decompress_frame(&compress_frame(&gradient(1, 1), 40).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1, 1));
    }

    #[test]
    fn test_compress_frame_rejects_empty_image() {
        let result = compress_frame(&DynamicImage::new_rgb8(0, 0), 40);
        assert!(matches!(result, Err(FrameError::EmptyFrame)));
    }

    #[test]
    fn test_decompress_frame_rejects_bad_base64() {
        assert!(matches!(decompress_frame("not base64!!"), Err(FrameError::Decode(_))));
    }
}
