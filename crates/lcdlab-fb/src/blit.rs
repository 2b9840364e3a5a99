//! Scanline blitter: streams a panel frame into the device row by row.
//!
//! Row `y` of the frame lands at byte
//! `(y * xres_virtual + x_offset) * bits_per_pixel / 8` of the device.
//! Bounds are checked for the whole frame before the first byte is written.

use crate::geometry::FramebufferGeometry;
use crate::pixel::PanelFrame;
use std::io::{Seek, SeekFrom, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlitError {
    #[error(
        "frame {width}x{height} at x_offset {x_offset} does not fit panel {xres_virtual}x{yres_virtual}"
    )]
    OutOfBounds {
        x_offset: i64,
        width: u32,
        height: u32,
        xres_virtual: u32,
        yres_virtual: u32,
    },
    #[error("frame is {frame_bpp} bpp but the panel is {panel_bpp} bpp")]
    FormatMismatch { frame_bpp: u32, panel_bpp: u32 },
    #[error("frame holds {actual} bytes, {expected} needed for its size")]
    TruncatedFrame { expected: usize, actual: usize },
    #[error("short write on row {row}: wrote {written} of {expected} bytes")]
    ShortWrite {
        row: u32,
        expected: usize,
        written: usize,
    },
    #[error("write failed on row {row}: {source}")]
    Write {
        row: u32,
        source: std::io::Error,
    },
}

impl BlitError {
    /// True for device-side write failures (as opposed to geometry mismatches).
    pub fn is_write_error(&self) -> bool {
        matches!(self, Self::ShortWrite { .. } | Self::Write { .. })
    }
}

/// Destination byte offset of pixel column `x_offset` on panel row `y`.
pub fn byte_offset(geometry: &FramebufferGeometry, y: u32, x_offset: u32) -> u64 {
    (y as u64 * geometry.xres_virtual as u64 + x_offset as u64) * geometry.bits_per_pixel as u64
        / 8
}

/// Number of bytes written per row for a frame `width` pixels wide.
pub fn row_byte_len(geometry: &FramebufferGeometry, width: u32) -> usize {
    width as usize * geometry.bits_per_pixel as usize / 8
}

/// Validate that a `width`×`height` frame placed at `x_offset` stays inside the panel.
///
/// Returns the offset as an unsigned column on success.
pub fn check_bounds(
    geometry: &FramebufferGeometry,
    width: u32,
    height: u32,
    x_offset: i64,
) -> Result<u32, BlitError> {
    let fits = x_offset >= 0
        && x_offset + width as i64 <= geometry.xres_virtual as i64
        && height <= geometry.yres_virtual;

    if !fits {
        return Err(BlitError::OutOfBounds {
            x_offset,
            width,
            height,
            xres_virtual: geometry.xres_virtual,
            yres_virtual: geometry.yres_virtual,
        });
    }

    Ok(x_offset as u32)
}

/// Write `frame` into `device` starting at column `x_offset` of row 0.
///
/// Returns the number of bytes written.
pub fn blit<W: Write + Seek>(
    device: &mut W,
    geometry: &FramebufferGeometry,
    frame: &PanelFrame,
    x_offset: i64,
) -> Result<usize, BlitError> {
    if frame.format.bits_per_pixel() != geometry.bits_per_pixel {
        return Err(BlitError::FormatMismatch {
            frame_bpp: frame.format.bits_per_pixel(),
            panel_bpp: geometry.bits_per_pixel,
        });
    }

    let expected = frame.row_bytes() * frame.height as usize;
    if frame.data.len() < expected {
        return Err(BlitError::TruncatedFrame {
            expected,
            actual: frame.data.len(),
        });
    }

    let x = check_bounds(geometry, frame.width, frame.height, x_offset)?;
    let row_len = row_byte_len(geometry, frame.width);
    if row_len == 0 {
        return Ok(0);
    }

    let mut total = 0usize;
    for y in 0..frame.height {
        let offset = byte_offset(geometry, y, x);
        device
            .seek(SeekFrom::Start(offset))
            .map_err(|source| BlitError::Write { row: y, source })?;

        let row = frame.row(y);
        let written = device
            .write(&row[..row_len])
            .map_err(|source| BlitError::Write { row: y, source })?;
        if written != row_len {
            return Err(BlitError::ShortWrite {
                row: y,
                expected: row_len,
                written,
            });
        }
        total += written;
    }

    tracing::trace!(rows = frame.height, bytes = total, x_offset = x, "blit complete");
    Ok(total)
}
