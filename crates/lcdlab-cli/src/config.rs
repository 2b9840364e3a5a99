use lcdlab_hw::CameraConfig;
use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
///
/// Command-line flags override these per invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Framebuffer device path (default: /dev/fb0).
    pub fb_device: String,
    /// V4L2 camera index, opened as /dev/video{index} (default: 2).
    pub camera_index: u32,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_fps: u32,
    /// Directory receiving `<index>.bmp` snapshots.
    pub screenshot_dir: PathBuf,
    /// Directory receiving model dumps and the projection log.
    pub model_dir: PathBuf,
    /// Columns moved per scroll frame.
    pub scroll_step: i64,
    /// Motion-JPEG file receiving the live view, if set.
    pub record_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `LCDLAB_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            fb_device: std::env::var("LCDLAB_FB_DEVICE").unwrap_or_else(|_| "/dev/fb0".to_string()),
            camera_index: env_u32("LCDLAB_CAMERA_INDEX", 2),
            camera_width: env_u32("LCDLAB_CAMERA_WIDTH", 800),
            camera_height: env_u32("LCDLAB_CAMERA_HEIGHT", 600),
            camera_fps: env_u32("LCDLAB_CAMERA_FPS", 30),
            screenshot_dir: env_path("LCDLAB_SCREENSHOT_DIR", "screenshot"),
            model_dir: env_path("LCDLAB_MODEL_DIR", "model"),
            scroll_step: env_i64("LCDLAB_SCROLL_STEP", 20),
            record_path: std::env::var_os("LCDLAB_RECORD").map(PathBuf::from),
        }
    }

    pub fn camera(&self) -> CameraConfig {
        CameraConfig {
            index: self.camera_index,
            width: self.camera_width,
            height: self.camera_height,
            fps: self.camera_fps,
        }
    }

    /// Append-only log of accepted face projections.
    pub fn projection_log_path(&self) -> PathBuf {
        self.model_dir.join("faceProjection.txt")
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
