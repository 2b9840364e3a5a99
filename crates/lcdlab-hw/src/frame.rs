//! Frame type and pixel conversions: YUYV/GREY/MJPG decoding, resize, codec I/O.

use image::{imageops, ImageFormat, RgbImage};
use std::path::Path;

/// A captured or decoded colour frame, packed BGR888.
#[derive(Clone)]
pub struct Frame {
    /// BGR pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Wrap a packed BGR buffer.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
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
            timestamp: std::time::Instant::now(),
            sequence: 0,
        })
    }

    /// A frame filled with one BGR colour.
    pub fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let data = std::iter::repeat(bgr)
            .take(width as usize * height as usize)
            .flatten()
            .collect();
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Decode an image file (any format the `image` crate reads).
    pub fn load(path: &Path) -> Result<Self, FrameError> {
        let rgb = image::open(path)?.to_rgb8();
        Ok(Self::from_rgb_image(&rgb))
    }

    /// Encode to `path`; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), FrameError> {
        self.to_rgb_image().save(path)?;
        Ok(())
    }

    pub fn from_rgb_image(rgb: &RgbImage) -> Self {
        let mut data = rgb.as_raw().clone();
        swap_red_blue(&mut data);
        Self {
            data,
            width: rgb.width(),
            height: rgb.height(),
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let mut data = self.data.clone();
        swap_red_blue(&mut data);
        // Length is width * height * 3 by construction.
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Resize with bilinear filtering.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if self.is_empty() || width == 0 || height == 0 {
            return Self::solid(width, height, [0, 0, 0]);
        }
        let resized = imageops::resize(
            &self.to_rgb_image(),
            width,
            height,
            imageops::FilterType::Triangle,
        );
        let mut out = Self::from_rgb_image(&resized);
        out.timestamp = self.timestamp;
        out.sequence = self.sequence;
        out
    }

    /// Scale to `target_height` rows, keeping the aspect ratio:
    /// `new_width = width * target_height / height`.
    pub fn fit_to_height(&self, target_height: u32) -> Self {
        if self.height == 0 {
            return self.clone();
        }
        let new_width = (self.width as u64 * target_height as u64 / self.height as u64) as u32;
        self.resize(new_width, target_height)
    }

    /// Cut out a rectangle, clamped to the frame bounds.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let width = width.min(self.width - x);
        let height = height.min(self.height - y);

        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        let stride = self.width as usize * 3;
        for row in y..y + height {
            let start = row as usize * stride + x as usize * 3;
            data.extend_from_slice(&self.data[start..start + width as usize * 3]);
        }
        Self {
            data,
            width,
            height,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }

    /// ITU-R BT.601 luma, one byte per pixel.
    pub fn to_gray(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
            })
            .collect()
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert packed YUYV (4:2:2) to BGR using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut bgr = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let d = quad[1] as i32 - 128;
        let e = quad[3] as i32 - 128;
        for &y in &[quad[0], quad[2]] {
            let c = 298 * (y as i32 - 16);
            bgr.push(clamp_u8((c + 516 * d + 128) >> 8));
            bgr.push(clamp_u8((c - 100 * d - 208 * e + 128) >> 8));
            bgr.push(clamp_u8((c + 409 * e + 128) >> 8));
        }
    }
    Ok(bgr)
}

/// Replicate an 8-bit grayscale buffer into BGR.
pub fn grey_to_bgr(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected].iter().flat_map(|&v| [v, v, v]).collect())
}

/// Decode a Motion-JPEG buffer into a BGR frame.
pub fn mjpg_to_frame(jpeg: &[u8]) -> Result<Frame, FrameError> {
    let rgb = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    Ok(Frame::from_rgb_image(&rgb))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("image codec: {0}")]
    Image(#[from] image::ImageError),
}
