//! lcdlab-hw — Hardware abstraction for camera capture and operator input.
//!
//! Provides V4L2-based camera access producing BGR frames, a terminal key
//! listener, the shared frame slot used for on-demand snapshots, and an
//! MJPEG recorder.

pub mod camera;
pub mod frame;
pub mod input;
pub mod record;
pub mod slot;

pub use camera::{Camera, CameraConfig, CameraError, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
pub use input::{InputError, KeyEvent, KeyListener};
pub use record::{MjpegRecorder, RecordError};
pub use slot::{FrameSlot, SnapshotError, SnapshotHandle, SnapshotSaver};
