//! Endless horizontal scroll of a still image.

use crate::display::{self, Controls};
use anyhow::{Context, Result};
use lcdlab_fb::placement::{self, centered_offset};
use lcdlab_fb::{pixel, ScrollCursor};
use lcdlab_hw::Frame;
use std::path::Path;
use std::time::Duration;

/// Scroll `image` across the panel. `j` scrolls forward, `l` backward.
///
/// The image is scaled to the panel height when it is taller than the panel.
pub fn run(device: &str, image: &Path, step: i64, interval: Duration) -> Result<()> {
    let mut fb = display::open_panel(device)?;
    let geometry = fb.geometry();
    let format = fb.format()?;

    let mut frame = Frame::load(image).with_context(|| format!("cannot read image {}", image.display()))?;
    if frame.height > geometry.yres_virtual {
        frame = frame.fit_to_height(geometry.yres_virtual);
    }

    let encoded = pixel::normalize(&frame.data, frame.width, frame.height, format)?;
    let source = placement::composite(&encoded);
    let window_width = geometry.xres_virtual.min(source.width);
    let x_offset = centered_offset(geometry.xres_virtual, window_width);

    // The sign of `step` sets the starting direction; keys keep the speed.
    let speed = step.abs();
    let mut cursor = ScrollCursor::new(source.width, step);
    let mut controls = Controls::start()?;

    tracing::info!(
        image = %image.display(),
        composite_width = source.width,
        window_width,
        step,
        "scrolling (j/l: direction, q: quit)"
    );

    loop {
        let requests = controls.poll();
        if requests.quit {
            break;
        }
        if let Some(direction) = requests.direction {
            cursor.set_step(steer(direction, speed));
            tracing::debug!(step = cursor.step(), "scroll direction changed");
        }

        let window = placement::scroll_window(&source, cursor.offset(), window_width, source.height);
        display::blit_or_skip(&mut fb, &window, x_offset);
        cursor.advance();

        std::thread::sleep(interval);
    }

    tracing::info!(offset = cursor.offset(), "scroll finished");
    Ok(())
}

/// Step for a key direction (`1` forward, `-1` backward) at `speed`.
fn steer(direction: i64, speed: i64) -> i64 {
    direction.signum() * speed.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_step_starts_backward() {
        let mut cursor = ScrollCursor::new(100, -20);
        assert_eq!(cursor.advance(), 80);
        cursor.set_step(steer(1, 20));
        assert_eq!(cursor.advance(), 0);
    }

    #[test]
    fn test_steer_keeps_speed() {
        assert_eq!(steer(1, -20), 20);
        assert_eq!(steer(-1, 20), -20);
        assert_eq!(steer(-1, -20), -20);
    }
}
