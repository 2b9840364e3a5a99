//! Scoped framebuffer device handle.
//!
//! The device is opened once, its geometry is read through the same
//! descriptor, and the descriptor is closed when the handle drops.

use crate::blit::{self, BlitError};
use crate::geometry::{self, FbError, FramebufferGeometry};
use crate::pixel::{self, PanelFormat, PanelFrame};
use crate::placement::Placement;
use std::fs::{File, OpenOptions};

/// An open framebuffer device (e.g., "/dev/fb0").
pub struct Framebuffer {
    file: File,
    path: String,
    geometry: FramebufferGeometry,
}

impl Framebuffer {
    /// Open the device read/write and query its geometry.
    pub fn open(path: &str) -> Result<Self, FbError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| FbError::DeviceUnavailable {
                path: path.to_string(),
                source,
            })?;

        // `file` is dropped (closed) if the query fails.
        let geometry = geometry::query_fd(&file, path)?;

        tracing::info!(
            device = path,
            bits_per_pixel = geometry.bits_per_pixel,
            xres_virtual = geometry.xres_virtual,
            yres_virtual = geometry.yres_virtual,
            "opened framebuffer"
        );

        Ok(Self {
            file,
            path: path.to_string(),
            geometry,
        })
    }

    pub fn geometry(&self) -> FramebufferGeometry {
        self.geometry
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Native pixel encoding of this panel.
    pub fn format(&self) -> Result<PanelFormat, FbError> {
        PanelFormat::for_depth(self.geometry.bits_per_pixel)
    }

    /// Blit an already-encoded frame at `x_offset`.
    pub fn blit(&mut self, frame: &PanelFrame, x_offset: i64) -> Result<usize, BlitError> {
        blit::blit(&mut self.file, &self.geometry, frame, x_offset)
    }

    /// Encode a packed BGR888 frame for this panel and blit it using `placement`.
    pub fn present(
        &mut self,
        bgr: &[u8],
        width: u32,
        height: u32,
        placement: Placement,
    ) -> Result<usize, PresentError> {
        let format = self.format()?;
        let frame = pixel::normalize(bgr, width, height, format)?;
        let x_offset = placement.x_offset(&self.geometry, width);
        Ok(self.blit(&frame, x_offset)?)
    }
}

/// Failure of [`Framebuffer::present`].
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    #[error(transparent)]
    Fb(#[from] FbError),
    #[error(transparent)]
    Pixel(#[from] pixel::PixelError),
    #[error(transparent)]
    Blit(#[from] BlitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let err = Framebuffer::open("/nonexistent/fb0").err().unwrap();
        assert!(matches!(err, FbError::DeviceUnavailable { .. }));
        assert!(err.to_string().contains("/nonexistent/fb0"));
    }
}
