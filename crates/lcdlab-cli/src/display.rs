//! Panel output and operator controls shared by the demos.

use anyhow::{Context, Result};
use lcdlab_fb::{BlitError, FbError, Framebuffer, PanelFrame, Placement, PresentError};
use lcdlab_hw::{Frame, KeyEvent, KeyListener};
use tokio::sync::mpsc;

/// Keys buffered between two frames.
const KEY_QUEUE: usize = 16;

/// Open the panel and make sure its pixel depth is one we can encode.
pub fn open_panel(device: &str) -> Result<Framebuffer> {
    let fb = Framebuffer::open(device).with_context(|| format!("cannot use framebuffer {device}"))?;
    let format = fb.format().context("unsupported panel")?;
    tracing::debug!(?format, "panel format");
    Ok(fb)
}

/// Result of pushing one frame to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shown {
    Bytes(usize),
    Skipped,
}

/// Present a BGR frame. Per-frame failures are logged and the frame is
/// skipped; only device-level errors are returned.
pub fn present_or_skip(fb: &mut Framebuffer, frame: &Frame, placement: Placement) -> Result<Shown, FbError> {
    match fb.present(&frame.data, frame.width, frame.height, placement) {
        Ok(bytes) => Ok(Shown::Bytes(bytes)),
        Err(PresentError::Fb(e)) => Err(e),
        Err(PresentError::Blit(e)) => {
            log_skipped(&e);
            Ok(Shown::Skipped)
        }
        Err(PresentError::Pixel(e)) => {
            tracing::warn!(error = %e, "frame skipped");
            Ok(Shown::Skipped)
        }
    }
}

/// Blit an already-encoded frame, skipping it on failure.
pub fn blit_or_skip(fb: &mut Framebuffer, frame: &PanelFrame, x_offset: i64) -> Shown {
    match fb.blit(frame, x_offset) {
        Ok(bytes) => Shown::Bytes(bytes),
        Err(e) => {
            log_skipped(&e);
            Shown::Skipped
        }
    }
}

fn log_skipped(e: &BlitError) {
    if e.is_write_error() {
        tracing::warn!(error = %e, "framebuffer write failed; frame skipped");
    } else {
        tracing::warn!(error = %e, "frame rejected by the blitter; skipped");
    }
}

/// What the operator asked for since the last frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Requests {
    pub quit: bool,
    pub captures: usize,
    /// Last scroll direction pressed: `1` forward, `-1` backward.
    pub direction: Option<i64>,
}

impl Requests {
    pub fn apply(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::Quit => self.quit = true,
            KeyEvent::Capture => self.captures += 1,
            KeyEvent::ScrollForward => self.direction = Some(1),
            KeyEvent::ScrollBackward => self.direction = Some(-1),
            KeyEvent::Other(byte) => tracing::trace!(byte, "ignored key"),
        }
    }
}

/// Keyboard controls on stdin for the lifetime of a demo loop.
pub struct Controls {
    _listener: KeyListener,
    rx: mpsc::Receiver<KeyEvent>,
}

impl Controls {
    pub fn start() -> Result<Self> {
        let (listener, rx) = KeyListener::spawn_stdin(KEY_QUEUE).context("failed to start key listener")?;
        Ok(Self {
            _listener: listener,
            rx,
        })
    }

    /// Drain pending keys without blocking.
    pub fn poll(&mut self) -> Requests {
        let mut requests = Requests::default();
        // A closed channel only means stdin hit EOF; keep running.
        while let Ok(event) = self.rx.try_recv() {
            requests.apply(event);
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_collect_keys() {
        let mut requests = Requests::default();
        for event in [
            KeyEvent::Capture,
            KeyEvent::ScrollBackward,
            KeyEvent::Other(b'x'),
            KeyEvent::Capture,
            KeyEvent::ScrollForward,
        ] {
            requests.apply(event);
        }
        assert_eq!(
            requests,
            Requests {
                quit: false,
                captures: 2,
                direction: Some(1),
            }
        );

        requests.apply(KeyEvent::Quit);
        assert!(requests.quit);
    }

    #[test]
    fn test_open_panel_missing_device() {
        let err = open_panel("/nonexistent/fb0").err().unwrap();
        assert!(err.to_string().contains("/nonexistent/fb0"));
    }
}
