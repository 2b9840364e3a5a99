//! Motion-JPEG recording of displayed frames.
//!
//! Frames are JPEG-encoded and appended back to back, giving a raw MJPEG
//! stream that ffmpeg and VLC play as-is (`ffmpeg -f mjpeg -i out.mjpeg`).

use crate::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("recording file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

pub struct MjpegRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    frames: u64,
}

impl MjpegRecorder {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path) -> Result<Self, RecordError> {
        let file = File::create(path).map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "recording started");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            frames: 0,
        })
    }

    /// Append one frame. Empty frames are skipped.
    pub fn write(&mut self, frame: &Frame) -> Result<(), RecordError> {
        if frame.is_empty() {
            return Ok(());
        }
        let rgb = frame.to_rgb_image();
        JpegEncoder::new_with_quality(&mut self.writer, JPEG_QUALITY).encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush buffered output and close the file.
    pub fn finish(mut self) -> Result<u64, RecordError> {
        self.writer.flush().map_err(|source| RecordError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), frames = self.frames, "recording finished");
        Ok(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lcdlab-record-{name}-{}.mjpeg", std::process::id()))
    }

    fn start_markers(bytes: &[u8]) -> Vec<usize> {
        bytes
            .windows(3)
            .enumerate()
            .filter(|(_, w)| *w == [0xFF, 0xD8, 0xFF])
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_frames_appended_as_jpeg_stream() {
        let path = temp_file("two");
        let mut recorder = MjpegRecorder::create(&path).unwrap();
        recorder.write(&Frame::solid(16, 8, [0, 0, 255])).unwrap();
        recorder.write(&Frame::solid(16, 8, [255, 0, 0])).unwrap();
        assert_eq!(recorder.finish().unwrap(), 2);

        let bytes = std::fs::read(&path).unwrap();
        let starts = start_markers(&bytes);
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0], 0);
        assert_eq!(&bytes[starts[1] - 2..starts[1]], &[0xFF, 0xD9]);

        // The first frame decodes on its own, red in RGB order.
        let first = image::load_from_memory_with_format(&bytes[..starts[1]], image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert_eq!(first.dimensions(), (16, 8));
        let [r, g, b] = first.get_pixel(8, 4).0;
        assert!(r > 200 && g < 60 && b < 60, "got {r},{g},{b}");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_frame_skipped() {
        let path = temp_file("empty");
        let mut recorder = MjpegRecorder::create(&path).unwrap();
        recorder.write(&Frame::solid(0, 0, [0, 0, 0])).unwrap();
        assert_eq!(recorder.frames(), 0);
        recorder.finish().unwrap();
        assert!(std::fs::read(&path).unwrap().is_empty());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join(format!("lcdlab-record-missing-{}", std::process::id()))
            .join("out.mjpeg");
        assert!(matches!(MjpegRecorder::create(&path), Err(RecordError::Io { .. })));
    }
}
