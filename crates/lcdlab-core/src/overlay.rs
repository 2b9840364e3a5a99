//! Box and label overlays drawn straight into packed BGR buffers.

use crate::types::BoundingBox;
use ab_glyph::{Font, FontArc, InvalidFont, PxScale, ScaleFont, point};

pub const GREEN: [u8; 3] = [0, 255, 0];
pub const RED: [u8; 3] = [0, 0, 255];
pub const CYAN: [u8; 3] = [255, 255, 0];
pub const YELLOW: [u8; 3] = [0, 255, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const BLACK: [u8; 3] = [0, 0, 0];

const LABEL_PADDING: i32 = 2;

/// Colour for a class in the mask demo: green for class 0, red otherwise.
pub fn mask_class_color(class_id: usize) -> [u8; 3] {
    if class_id == 0 {
        GREEN
    } else {
        RED
    }
}

/// Draw the outline of `bbox` with the given stroke width, clipped to the image.
pub fn draw_box(
    bgr: &mut [u8],
    width: u32,
    height: u32,
    bbox: &BoundingBox,
    color: [u8; 3],
    thickness: u32,
) {
    let (x, y, w, h) = bbox.to_rect();
    draw_rect(bgr, width, height, (x, y, w, h), color, thickness);
}

/// Draw a rectangle outline given as `(x, y, width, height)` in pixels.
pub fn draw_rect(
    bgr: &mut [u8],
    width: u32,
    height: u32,
    rect: (i32, i32, i32, i32),
    color: [u8; 3],
    thickness: u32,
) {
    let (x, y, w, h) = rect;
    if w <= 0 || h <= 0 || bgr.len() < width as usize * height as usize * 3 {
        return;
    }
    let t = thickness.max(1) as i32;
    let (x2, y2) = (x + w - 1, y + h - 1);

    // Top and bottom bands, then left and right bands.
    fill(bgr, width, height, x, y, x2, y + t - 1, color);
    fill(bgr, width, height, x, y2 - t + 1, x2, y2, color);
    fill(bgr, width, height, x, y, x + t - 1, y2, color);
    fill(bgr, width, height, x2 - t + 1, y, x2, y2, color);
}

/// Font used for box captions.
#[derive(Debug, Clone)]
pub struct LabelFont {
    font: FontArc,
    scale: PxScale,
}

impl LabelFont {
    /// The bundled DejaVu Sans Mono at 16 px.
    pub fn embedded() -> Result<Self, InvalidFont> {
        let font = FontArc::try_from_slice(include_bytes!("../assets/fonts/DejaVuSansMono.ttf"))?;
        Ok(Self {
            font,
            scale: PxScale::from(16.0),
        })
    }

    pub fn text_width(&self, text: &str) -> f32 {
        let scaled = self.font.as_scaled(self.scale);
        let mut width = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev_id) = prev {
                width += scaled.kern(prev_id, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }

    pub fn line_height(&self) -> i32 {
        self.font.as_scaled(self.scale).height().ceil() as i32
    }

    /// Height of a caption bar including padding.
    pub fn bar_height(&self) -> i32 {
        self.line_height() + LABEL_PADDING * 2
    }
}

/// Caption `text` at `anchor`, the top-left corner of the box it belongs to.
///
/// The caption sits just above the anchor, or just below it when there is no
/// room above. With a `background` the caption gets a filled bar sized to the
/// text. Glyphs are blended by coverage and clipped to the image.
#[allow(clippy::too_many_arguments)]
pub fn draw_label(
    bgr: &mut [u8],
    width: u32,
    height: u32,
    font: &LabelFont,
    anchor: (i32, i32),
    text: &str,
    color: [u8; 3],
    background: Option<[u8; 3]>,
) {
    if text.is_empty() || bgr.len() < width as usize * height as usize * 3 {
        return;
    }
    let bar_height = font.bar_height();
    let bar_width = font.text_width(text).ceil() as i32 + LABEL_PADDING * 2;
    let x = anchor.0;
    let y = if anchor.1 - bar_height >= 0 {
        anchor.1 - bar_height
    } else {
        anchor.1
    };

    if let Some(bar) = background {
        fill(bgr, width, height, x, y, x + bar_width - 1, y + bar_height - 1, bar);
    }

    let scaled = font.font.as_scaled(font.scale);
    let mut caret = point(
        (x + LABEL_PADDING) as f32,
        (y + LABEL_PADDING) as f32 + scaled.ascent(),
    );
    let mut prev = None;
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev_id) = prev {
            caret.x += scaled.kern(prev_id, id);
        }
        let glyph = id.with_scale_and_position(font.scale, caret);
        if let Some(outlined) = font.font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                    return;
                }
                let idx = (py as usize * width as usize + px as usize) * 3;
                blend(&mut bgr[idx..idx + 3], color, coverage);
            });
        }
        caret.x += scaled.h_advance(id);
        prev = Some(id);
    }
}

fn blend(px: &mut [u8], color: [u8; 3], coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0);
    for (dst, src) in px.iter_mut().zip(color) {
        *dst = (*dst as f32 * (1.0 - alpha) + src as f32 * alpha).round() as u8;
    }
}

/// Fill the inclusive rectangle `[x1, x2] × [y1, y2]`, clipped.
#[allow(clippy::too_many_arguments)]
fn fill(bgr: &mut [u8], width: u32, height: u32, x1: i32, y1: i32, x2: i32, y2: i32, color: [u8; 3]) {
    let x1 = x1.max(0);
    let y1 = y1.max(0);
    let x2 = x2.min(width as i32 - 1);
    let y2 = y2.min(height as i32 - 1);
    if x1 > x2 || y1 > y2 {
        return;
    }
    for row in y1..=y2 {
        let start = (row as usize * width as usize + x1 as usize) * 3;
        let end = (row as usize * width as usize + x2 as usize + 1) * 3;
        for px in bgr[start..end].chunks_exact_mut(3) {
            px.copy_from_slice(&color);
        }
    }
}
