//! Latest-frame hand-off between the display loop and the snapshot worker.
//!
//! The display loop publishes every frame into a [`FrameSlot`]; the slot
//! holds an `Arc<Frame>` behind one mutex, so publishing is a pointer swap
//! and taking a snapshot is a pointer clone. Frames are never mutated after
//! publication, so a snapshot can never observe a half-written frame.

use crate::frame::{Frame, FrameError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no frame captured yet")]
    NoFrame,
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write snapshot: {0}")]
    Encode(#[from] FrameError),
    #[error("failed to spawn snapshot worker: {0}")]
    Spawn(std::io::Error),
}

/// Shared slot holding the most recent frame.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        // Frames are immutable once published; a panic elsewhere cannot
        // leave the slot in a torn state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        let previous = self.lock().replace(frame);
        // Drop the old frame outside the lock.
        drop(previous);
    }

    /// The most recent frame, if any.
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.lock().clone()
    }
}

/// Writes snapshots as `<index>.bmp` into a fixed directory.
pub struct SnapshotSaver {
    dir: PathBuf,
    next_index: u32,
}

impl SnapshotSaver {
    /// Create the output directory if needed and continue numbering after
    /// the highest existing `<n>.bmp`.
    pub fn new(dir: &Path) -> Result<Self, SnapshotError> {
        std::fs::create_dir_all(dir).map_err(|source| SnapshotError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let next_index = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let path = e.path();
                        if path.extension()? != "bmp" {
                            return None;
                        }
                        path.file_stem()?.to_str()?.parse::<u32>().ok()
                    })
                    .max()
                    .map_or(0, |n| n + 1)
            })
            .unwrap_or(0);

        Ok(Self {
            dir: dir.to_path_buf(),
            next_index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode `frame` to the next numbered file and return its path.
    pub fn save(&mut self, frame: &Frame) -> Result<PathBuf, SnapshotError> {
        let path = self.dir.join(format!("{}.bmp", self.next_index));
        frame.save(&path)?;
        self.next_index += 1;
        Ok(path)
    }

    /// Save whatever the slot currently holds.
    pub fn save_latest(&mut self, slot: &FrameSlot) -> Result<PathBuf, SnapshotError> {
        let frame = slot.snapshot().ok_or(SnapshotError::NoFrame)?;
        self.save(&frame)
    }
}

/// Handle to the background snapshot worker.
///
/// Dropping the handle closes the request channel; the worker finishes any
/// queued requests and exits.
pub struct SnapshotHandle {
    tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl SnapshotHandle {
    /// Spawn the worker thread. It saves `slot`'s latest frame per request.
    pub fn spawn(slot: FrameSlot, mut saver: SnapshotSaver) -> Result<Self, SnapshotError> {
        let (tx, mut rx) = mpsc::channel::<()>(4);

        let thread = std::thread::Builder::new()
            .name("lcdlab-snapshot".into())
            .spawn(move || {
                tracing::info!(dir = %saver.dir().display(), "snapshot worker started");
                while rx.blocking_recv().is_some() {
                    match saver.save_latest(&slot) {
                        Ok(path) => tracing::info!(path = %path.display(), "saved frame"),
                        Err(SnapshotError::NoFrame) => {
                            tracing::debug!("snapshot requested before first frame")
                        }
                        Err(e) => tracing::warn!(error = %e, "snapshot failed"),
                    }
                }
                tracing::info!("snapshot worker exiting");
            })
            .map_err(SnapshotError::Spawn)?;

        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Queue a snapshot. Returns false if the queue is full or the worker is gone.
    pub fn request(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    /// Close the channel and wait for queued snapshots to be written.
    pub fn finish(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Replace the sender with a closed one so the worker sees end-of-stream.
        let (closed, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.tx, closed));
        if thread.join().is_err() {
            tracing::warn!("snapshot worker panicked");
        }
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lcdlab-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    /// Frame whose every byte and whose width both equal `marker`.
    fn marked_frame(marker: u8) -> Frame {
        let width = marker as u32 + 1;
        Frame::new(vec![marker; width as usize * 8 * 3], width, 8).unwrap()
    }

    #[test]
    fn test_empty_slot() {
        let slot = FrameSlot::new();
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn test_publish_replaces() {
        let slot = FrameSlot::new();
        slot.publish(marked_frame(1));
        slot.publish(marked_frame(2));
        assert_eq!(slot.snapshot().unwrap().data[0], 2);
    }

    #[test]
    fn test_no_torn_frames_under_contention() {
        let slot = FrameSlot::new();
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let slot = slot.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 0..2000u32 {
                    slot.publish(marked_frame((i % 251) as u8));
                }
                done.store(true, Ordering::Release);
            })
        };

        let consumer = {
            let slot = slot.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    if let Some(frame) = slot.snapshot() {
                        let marker = frame.data[0];
                        assert_eq!(frame.width, marker as u32 + 1, "width/marker mismatch");
                        assert_eq!(frame.data.len(), frame.width as usize * 8 * 3);
                        assert!(frame.data.iter().all(|&b| b == marker), "torn frame");
                    }
                }
            })
        };

        producer.join().unwrap();
        consumer.join().unwrap();
        assert_eq!(slot.snapshot().unwrap().data[0], (1999 % 251) as u8);
    }

    #[test]
    fn test_saver_numbers_files() {
        let dir = temp_dir("saver");
        let mut saver = SnapshotSaver::new(&dir).unwrap();
        let frame = Frame::solid(2, 2, [1, 2, 3]);
        assert_eq!(saver.save(&frame).unwrap(), dir.join("0.bmp"));
        assert_eq!(saver.save(&frame).unwrap(), dir.join("1.bmp"));

        // A new saver continues after the highest existing index.
        let mut saver = SnapshotSaver::new(&dir).unwrap();
        assert_eq!(saver.save(&frame).unwrap(), dir.join("2.bmp"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_save_latest_without_frame() {
        let dir = temp_dir("noframe");
        let mut saver = SnapshotSaver::new(&dir).unwrap();
        assert!(matches!(
            saver.save_latest(&FrameSlot::new()),
            Err(SnapshotError::NoFrame)
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_worker_saves_on_request() {
        let dir = temp_dir("worker");
        let slot = FrameSlot::new();
        slot.publish(Frame::solid(4, 3, [9, 8, 7]));

        let handle = SnapshotHandle::spawn(slot, SnapshotSaver::new(&dir).unwrap()).unwrap();
        assert!(handle.request());
        handle.finish();

        let saved = Frame::load(&dir.join("0.bmp")).unwrap();
        assert_eq!((saved.width, saved.height), (4, 3));
        assert_eq!(&saved.data[..3], &[9, 8, 7]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
