//! Colour-space normalisation from BGR888 into the panel's native encoding.
//!
//! The 16-bit layout matches OpenCV's `COLOR_BGR2BGR565`: blue in bits 0–4,
//! green in bits 5–10, red in bits 11–15, stored little-endian.

use crate::geometry::FbError;
use thiserror::Error;

/// Native pixel encoding of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFormat {
    /// 16-bit packed 5-6-5.
    Bgr565,
    /// 32-bit B, G, R, A bytes (alpha forced to 0xFF).
    Bgra8888,
}

impl PanelFormat {
    /// Pick the encoding for a framebuffer depth.
    pub fn for_depth(bits_per_pixel: u32) -> Result<Self, FbError> {
        match bits_per_pixel {
            16 => Ok(Self::Bgr565),
            32 => Ok(Self::Bgra8888),
            other => Err(FbError::UnsupportedDepth(other)),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr565 => 2,
            Self::Bgra8888 => 4,
        }
    }

    pub fn bits_per_pixel(self) -> u32 {
        self.bytes_per_pixel() as u32 * 8
    }
}

/// A frame already encoded for the panel, rows tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PanelFormat,
}

impl PanelFrame {
    /// An all-zero (black) frame.
    pub fn blank(width: u32, height: u32, format: PanelFormat) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * format.bytes_per_pixel()],
            width,
            height,
            format,
        }
    }

    /// Number of bytes in one row of this frame.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Bytes of row `y`. Panics if `y` is out of range or `data` is short.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_bytes();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Error)]
pub enum PixelError {
    #[error("invalid BGR buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Pack one BGR pixel into a 5-6-5 word.
#[inline]
pub fn bgr_to_bgr565(b: u8, g: u8, r: u8) -> u16 {
    ((b as u16) >> 3) | (((g as u16) & 0xFC) << 3) | (((r as u16) & 0xF8) << 8)
}

/// Expand a 5-6-5 word back to BGR, low bits zero.
#[inline]
pub fn bgr565_to_bgr(word: u16) -> [u8; 3] {
    let b = ((word << 3) & 0xF8) as u8;
    let g = ((word >> 3) & 0xFC) as u8;
    let r = ((word >> 8) & 0xF8) as u8;
    [b, g, r]
}

/// Convert a packed BGR888 buffer (`width * height * 3` bytes) into `format`.
///
/// Zero-sized input yields an empty frame.
pub fn normalize(
    bgr: &[u8],
    width: u32,
    height: u32,
    format: PanelFormat,
) -> Result<PanelFrame, PixelError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 3;
    if bgr.len() < expected {
        return Err(PixelError::InvalidLength {
            expected,
            actual: bgr.len(),
        });
    }

    let mut data = Vec::with_capacity(pixels * format.bytes_per_pixel());
    match format {
        PanelFormat::Bgr565 => {
            for px in bgr[..expected].chunks_exact(3) {
                data.extend_from_slice(&bgr_to_bgr565(px[0], px[1], px[2]).to_le_bytes());
            }
        }
        PanelFormat::Bgra8888 => {
            for px in bgr[..expected].chunks_exact(3) {
                data.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
            }
        }
    }

    Ok(PanelFrame {
        data,
        width,
        height,
        format,
    })
}

/// Decode a panel frame back to packed BGR888.
pub fn to_bgr(frame: &PanelFrame) -> Vec<u8> {
    let mut bgr = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    match frame.format {
        PanelFormat::Bgr565 => {
            for word in frame.data.chunks_exact(2) {
                bgr.extend_from_slice(&bgr565_to_bgr(u16::from_le_bytes([word[0], word[1]])));
            }
        }
        PanelFormat::Bgra8888 => {
            for px in frame.data.chunks_exact(4) {
                bgr.extend_from_slice(&px[..3]);
            }
        }
    }
    bgr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr565_primaries() {
        assert_eq!(bgr_to_bgr565(255, 0, 0), 0x001F);
        assert_eq!(bgr_to_bgr565(0, 255, 0), 0x07E0);
        assert_eq!(bgr_to_bgr565(0, 0, 255), 0xF800);
        assert_eq!(bgr_to_bgr565(255, 255, 255), 0xFFFF);
        assert_eq!(bgr_to_bgr565(0, 0, 0), 0x0000);
    }

    #[test]
    fn test_normalize_little_endian_words() {
        // One red pixel → 0xF800 → [0x00, 0xF8]
        let frame = normalize(&[0, 0, 255], 1, 1, PanelFormat::Bgr565).unwrap();
        assert_eq!(frame.data, vec![0x00, 0xF8]);
        assert_eq!(frame.row_bytes(), 2);
    }

    #[test]
    fn test_normalize_empty_image() {
        let frame = normalize(&[], 0, 0, PanelFormat::Bgr565).unwrap();
        assert!(frame.is_empty());
        assert!(frame.data.is_empty());

        let frame = normalize(&[], 640, 0, PanelFormat::Bgr565).unwrap();
        assert!(frame.data.is_empty());
    }

    #[test]
    fn test_normalize_short_buffer() {
        let result = normalize(&[1, 2, 3], 2, 1, PanelFormat::Bgr565);
        assert!(matches!(
            result,
            Err(PixelError::InvalidLength { expected: 6, actual: 3 })
        ));
    }

    #[test]
    fn test_solid_colour_round_trip_within_quantisation() {
        for &(b, g, r) in &[(12u8, 200u8, 77u8), (255, 255, 255), (7, 3, 250), (128, 129, 130)] {
            let bgr: Vec<u8> = std::iter::repeat([b, g, r]).take(16).flatten().collect();
            let frame = normalize(&bgr, 4, 4, PanelFormat::Bgr565).unwrap();
            let back = to_bgr(&frame);
            assert_eq!(back.len(), bgr.len());
            for px in back.chunks_exact(3) {
                assert!(b - px[0] < 8, "blue {b} -> {}", px[0]);
                assert!(g - px[1] < 4, "green {g} -> {}", px[1]);
                assert!(r - px[2] < 8, "red {r} -> {}", px[2]);
            }
        }
    }

    #[test]
    fn test_bgra8888_keeps_channels() {
        let frame = normalize(&[1, 2, 3, 4, 5, 6], 2, 1, PanelFormat::Bgra8888).unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 0xFF, 4, 5, 6, 0xFF]);
        assert_eq!(to_bgr(&frame), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_format_for_depth() {
        assert_eq!(PanelFormat::for_depth(16).unwrap(), PanelFormat::Bgr565);
        assert_eq!(PanelFormat::for_depth(32).unwrap(), PanelFormat::Bgra8888);
        assert!(matches!(
            PanelFormat::for_depth(24),
            Err(FbError::UnsupportedDepth(24))
        ));
    }

    #[test]
    fn test_row_slices() {
        let bgr: Vec<u8> = (0..18).collect();
        let frame = normalize(&bgr, 3, 2, PanelFormat::Bgra8888).unwrap();
        assert_eq!(frame.row(1), &[9, 10, 11, 0xFF, 12, 13, 14, 0xFF, 15, 16, 17, 0xFF]);
    }
}
