//! lcdlab-fb — Framebuffer output for directly attached LCD panels.
//!
//! Queries the panel geometry from the kernel framebuffer driver, converts
//! BGR frames into the panel's native pixel encoding and streams them into
//! the device row by row.

pub mod blit;
pub mod device;
pub mod geometry;
pub mod pixel;
pub mod placement;

pub use blit::{blit, BlitError};
pub use device::{Framebuffer, PresentError};
pub use geometry::{FbError, FramebufferGeometry};
pub use pixel::{PanelFormat, PanelFrame, PixelError};
pub use placement::{Placement, ScrollCursor};
