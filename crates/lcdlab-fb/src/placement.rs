//! Where a frame lands on the panel: centred, fixed column, or a scrolling
//! window over a horizontally repeated image.

use crate::geometry::FramebufferGeometry;
use crate::pixel::PanelFrame;

/// Horizontal placement policy for a blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `(xres_virtual - width) / 2`, may go negative for oversized frames.
    Centered,
    /// A fixed starting column.
    Fixed(i64),
}

impl Placement {
    pub fn x_offset(&self, geometry: &FramebufferGeometry, width: u32) -> i64 {
        match *self {
            Placement::Centered => centered_offset(geometry.xres_virtual, width),
            Placement::Fixed(x) => x,
        }
    }
}

/// Column that centres a `width`-pixel frame on a `xres_virtual`-pixel row.
///
/// Signed division truncates toward zero, so a frame one pixel wider than the
/// panel yields 0 and a frame 100 pixels wider yields -50.
pub fn centered_offset(xres_virtual: u32, width: u32) -> i64 {
    (xres_virtual as i64 - width as i64) / 2
}

/// `((offset + step) % width + width) % width`; always in `[0, width)`.
pub fn wrap_offset(offset: i64, step: i64, width: i64) -> i64 {
    if width <= 0 {
        return 0;
    }
    ((offset + step) % width + width) % width
}

/// Persistent horizontal cursor into a composite (self-concatenated) image.
#[derive(Debug, Clone)]
pub struct ScrollCursor {
    offset: i64,
    step: i64,
    width: i64,
}

impl ScrollCursor {
    pub fn new(composite_width: u32, step: i64) -> Self {
        Self {
            offset: 0,
            step,
            width: composite_width as i64,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Change the per-frame step (sign sets the direction).
    pub fn set_step(&mut self, step: i64) {
        self.step = step;
    }

    /// Move one step and return the new offset.
    pub fn advance(&mut self) -> i64 {
        self.offset = wrap_offset(self.offset, self.step, self.width);
        self.offset
    }
}

/// Concatenate `frame` with itself horizontally.
pub fn composite(frame: &PanelFrame) -> PanelFrame {
    let row_bytes = frame.row_bytes();
    let mut data = Vec::with_capacity(frame.data.len() * 2);
    for y in 0..frame.height {
        let row = frame.row(y);
        data.extend_from_slice(row);
        data.extend_from_slice(row);
    }
    debug_assert_eq!(data.len(), row_bytes * 2 * frame.height as usize);

    PanelFrame {
        data,
        width: frame.width * 2,
        height: frame.height,
        format: frame.format,
    }
}

/// Cut a `width`×`height` window out of `source` starting at column `offset`.
///
/// Columns wrap around the right edge, so any offset yields a seamless
/// window. `width` and `height` are clamped to the source size.
pub fn scroll_window(source: &PanelFrame, offset: i64, width: u32, height: u32) -> PanelFrame {
    let width = width.min(source.width);
    let height = height.min(source.height);
    if width == 0 || height == 0 {
        return PanelFrame::blank(width, height, source.format);
    }

    let bpp = source.format.bytes_per_pixel();
    let start = wrap_offset(offset, 0, source.width as i64) as usize;
    let src_w = source.width as usize;
    let mut data = Vec::with_capacity(width as usize * height as usize * bpp);

    for y in 0..height {
        let row = source.row(y);
        // At most two contiguous runs: [start, end) then wrap to [0, rest).
        let first = (src_w - start).min(width as usize);
        data.extend_from_slice(&row[start * bpp..(start + first) * bpp]);
        let rest = width as usize - first;
        data.extend_from_slice(&row[..rest * bpp]);
    }

    PanelFrame {
        data,
        width,
        height,
        format: source.format,
    }
}
