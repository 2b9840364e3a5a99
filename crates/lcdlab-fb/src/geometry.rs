//! Panel geometry as reported by `FBIOGET_VSCREENINFO`.

use std::os::unix::io::AsRawFd;
use thiserror::Error;

/// `FBIOGET_VSCREENINFO` from `<linux/fb.h>`.
const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;

/// Mirror of `struct fb_bitfield` from `<linux/fb.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

/// Mirror of `struct fb_var_screeninfo` from `<linux/fb.h>`.
///
/// Layout: 8 × u32, 4 × fb_bitfield, 16 × u32, reserved[4] = 160 bytes.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
#[allow(dead_code)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

const _SIZE_ASSERT: () = assert!(
    std::mem::size_of::<FbVarScreeninfo>() == 160,
    "FbVarScreeninfo must be 160 bytes to match the kernel ABI"
);

#[derive(Error, Debug)]
pub enum FbError {
    #[error("framebuffer device unavailable: {path}: {source}")]
    DeviceUnavailable {
        path: String,
        source: std::io::Error,
    },
    #[error("FBIOGET_VSCREENINFO failed on {path}: {source}")]
    QueryFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("unsupported framebuffer depth: {0} bits per pixel (need 16 or 32)")]
    UnsupportedDepth(u32),
}

/// Panel geometry, queried once per process and constant afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferGeometry {
    /// Depth of one pixel in the device memory (16 for BGR565 panels).
    pub bits_per_pixel: u32,
    /// Row stride of the panel in pixels.
    pub xres_virtual: u32,
    /// Number of rows in the panel.
    pub yres_virtual: u32,
}

impl FramebufferGeometry {
    pub fn new(bits_per_pixel: u32, xres_virtual: u32, yres_virtual: u32) -> Self {
        Self {
            bits_per_pixel,
            xres_virtual,
            yres_virtual,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel / 8) as usize
    }

    /// Bytes between the start of two consecutive panel rows.
    pub fn row_stride(&self) -> usize {
        self.xres_virtual as usize * self.bytes_per_pixel()
    }

    /// Total addressable size of the panel in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.row_stride() as u64 * self.yres_virtual as u64
    }
}

/// Query the panel geometry through an already-open framebuffer descriptor.
pub(crate) fn query_fd(file: &std::fs::File, path: &str) -> Result<FramebufferGeometry, FbError> {
    let mut info = FbVarScreeninfo::default();

    // SAFETY:
    // - fd is valid for the lifetime of `file`
    // - `info` is repr(C) and sized to match `struct fb_var_screeninfo`
    // - the kernel only writes into `info` for the duration of the call
    let ret = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            FBIOGET_VSCREENINFO as _,
            &mut info as *mut FbVarScreeninfo,
        )
    };

    if ret < 0 {
        return Err(FbError::QueryFailed {
            path: path.to_string(),
            source: std::io::Error::last_os_error(),
        });
    }

    tracing::debug!(
        xres = info.xres,
        yres = info.yres,
        red_offset = info.red.offset,
        green_offset = info.green.offset,
        blue_offset = info.blue.offset,
        "fb_var_screeninfo"
    );

    Ok(FramebufferGeometry {
        bits_per_pixel: info.bits_per_pixel,
        xres_virtual: info.xres_virtual,
        yres_virtual: info.yres_virtual,
    })
}

/// Open the framebuffer at `path`, read its geometry and close it again.
pub fn query(path: &str) -> Result<FramebufferGeometry, FbError> {
    let fb = crate::device::Framebuffer::open(path)?;
    Ok(fb.geometry())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_stride_16bpp() {
        let geometry = FramebufferGeometry::new(16, 800, 480);
        assert_eq!(geometry.bytes_per_pixel(), 2);
        assert_eq!(geometry.row_stride(), 1600);
        assert_eq!(geometry.size_bytes(), 1600 * 480);
    }

    #[test]
    fn test_row_stride_32bpp() {
        let geometry = FramebufferGeometry::new(32, 1024, 600);
        assert_eq!(geometry.row_stride(), 4096);
    }

    #[test]
    fn test_query_missing_device() {
        let err = query("/nonexistent/fb9").unwrap_err();
        assert!(matches!(err, FbError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_query_regular_file_fails_ioctl() {
        let path = std::env::temp_dir().join(format!("lcdlab-fb-{}", std::process::id()));
        std::fs::write(&path, [0u8; 16]).unwrap();
        let err = query(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, FbError::QueryFailed { .. }));
    }
}
