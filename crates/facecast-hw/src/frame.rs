//! Frame type and pixel conversion (YUYV, GREY, Y16, MJPG to RGB) plus still-image encoding.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::time::Instant;

/// An immutable RGB raster snapshot.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB8 pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    /// Monotonic sequence number assigned by whoever produced the frame.
    pub sequence: u64,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Still-image encoding used when a frame leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StillFormat {
    Jpeg,
    Png,
}

impl StillFormat {
    fn mime(self) -> &'static str {
        match self {
            StillFormat::Jpeg => "image/jpeg",
            StillFormat::Png => "image/png",
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            StillFormat::Jpeg => ImageFormat::Jpeg,
            StillFormat::Png => ImageFormat::Png,
        }
    }
}

impl Frame {
    /// Build a frame from packed RGB8 data, checking the buffer length.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self, FrameError> {
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        })
    }

    /// A uniformly filled frame. Mostly useful for tests and placeholders.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        let data = rgb.iter().copied().cycle().take(rgb_len(width, height)).collect();
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Copy the pixels into an `image` buffer for drawing or encoding.
    pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected: rgb_len(self.width, self.height),
                actual: self.data.len(),
            },
        )
    }

    /// Encode as a `data:<mime>;base64,<payload>` URL, the form the
    /// recognition and enrollment services accept.
    pub fn encode_data_url(&self, format: StillFormat) -> Result<String, FrameError> {
        let image = self.to_rgb_image()?;
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, format.image_format())
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(format!(
            "data:{};base64,{}",
            format.mime(),
            BASE64_STANDARD.encode(buf.into_inner())
        ))
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert one BT.601 limited-range YUV sample to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((298 * c + 409 * e + 128) >> 8),
        clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Expand 8-bit grayscale to RGB by replicating the channel.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if gray.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: gray.len(),
        });
    }
    Ok(gray[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits and expand to RGB.
pub fn y16_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected]
        .chunks_exact(2)
        .flat_map(|px| [px[1], px[1], px[1]])
        .collect())
}

/// Decode one motion-JPEG buffer to RGB, returning the decoded dimensions.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<(Vec<u8>, u32, u32), FrameError> {
    let decoded = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .into_rgb8();
    let (w, h) = decoded.dimensions();
    Ok((decoded.into_raw(), w, h))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: black then white, neutral chroma
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        let yuyv: Vec<u8> = [100u8, 128, 180, 128].repeat(4);
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.len(), 4 * 2 * 3);
        for px in rgb.chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb_replicates() {
        let rgb = grey_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // 0x12ab little-endian → 0x12
        let rgb = y16_to_rgb(&[0xab, 0x12], 1, 1).unwrap();
        assert_eq!(rgb, vec![0x12, 0x12, 0x12]);
    }

    #[test]
    fn test_frame_new_rejects_wrong_length() {
        let err = Frame::new(vec![0; 5], 2, 1, 0).unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength { expected: 6, actual: 5 }));
    }

    #[test]
    fn test_data_url_prefixes() {
        let frame = Frame::filled(8, 8, [10, 20, 30], 1);
        let jpeg = frame.encode_data_url(StillFormat::Jpeg).unwrap();
        assert!(jpeg.starts_with("data:image/jpeg;base64,"));
        let png = frame.encode_data_url(StillFormat::Png).unwrap();
        assert!(png.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_png_data_url_is_lossless() {
        let frame = Frame::filled(3, 2, [1, 2, 3], 0);
        let url = frame.encode_data_url(StillFormat::Png).unwrap();
        let payload = url.split_once(',').unwrap().1;
        let bytes = BASE64_STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.into_raw(), frame.data);
    }

    #[test]
    fn test_mjpeg_decode_reports_dimensions() {
        let frame = Frame::filled(16, 8, [128, 128, 128], 0);
        let mut buf = Cursor::new(Vec::new());
        frame
            .to_rgb_image()
            .unwrap()
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        let (rgb, w, h) = mjpeg_to_rgb(buf.get_ref()).unwrap();
        assert_eq!((w, h), (16, 8));
        assert_eq!(rgb.len(), 16 * 8 * 3);
    }
}
