//! Operator key input.
//!
//! A listener thread polls a file descriptor (stdin by default) and delivers
//! discrete [`KeyEvent`]s over a bounded channel. Bytes are read straight
//! from the descriptor; nothing is buffered where `poll` cannot see it.
//! When the source is a terminal it is switched to non-canonical, no-echo
//! mode for the lifetime of the listener and restored on drop.

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{self, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use nix::unistd;
use std::io::IsTerminal;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc;

/// How long one poll waits before re-checking the stop flag.
const POLL_INTERVAL_MS: u16 = 100;

/// Bytes taken from the descriptor per read.
const READ_CHUNK: usize = 32;

/// ETX, what Ctrl-C produces once ISIG is off.
const CTRL_C: u8 = 0x03;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("terminal mode change failed: {0}")]
    Terminal(#[from] nix::Error),
    #[error("failed to spawn key listener: {0}")]
    Spawn(std::io::Error),
}

/// A single keypress, already mapped to its meaning in the demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// `c`: save the current frame.
    Capture,
    /// `j`: scroll content towards increasing offsets.
    ScrollForward,
    /// `l`: scroll content towards decreasing offsets.
    ScrollBackward,
    /// `q` or Ctrl-C.
    Quit,
    Other(u8),
}

impl KeyEvent {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'c' => Self::Capture,
            b'j' => Self::ScrollForward,
            b'l' => Self::ScrollBackward,
            b'q' | CTRL_C => Self::Quit,
            other => Self::Other(other),
        }
    }
}

/// Restores the saved terminal attributes of stdin on drop.
struct RawTerminal {
    original: Termios,
}

impl RawTerminal {
    /// Disable line buffering, echo and signal keys on stdin.
    fn enable() -> Result<Self, InputError> {
        let stdin = std::io::stdin();
        let original = termios::tcgetattr(stdin.as_fd())?;

        let mut raw = original.clone();
        raw.local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw)?;

        tracing::debug!("stdin switched to non-canonical mode");
        Ok(Self { original })
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        let stdin = std::io::stdin();
        if let Err(e) = termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &self.original) {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

/// Background key listener. Dropping it stops the thread and restores the terminal.
pub struct KeyListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    // Restored only after `drop` has joined the thread.
    _terminal: Option<RawTerminal>,
}

impl KeyListener {
    /// Listen on stdin. Terminal mode is only touched when stdin is a TTY.
    pub fn spawn_stdin(capacity: usize) -> Result<(Self, mpsc::Receiver<KeyEvent>), InputError> {
        let terminal = if std::io::stdin().is_terminal() {
            Some(RawTerminal::enable()?)
        } else {
            tracing::debug!("stdin is not a terminal; leaving its mode alone");
            None
        };

        let (mut listener, rx) = Self::spawn(std::io::stdin(), capacity)?;
        listener._terminal = terminal;
        Ok((listener, rx))
    }

    /// Listen on an arbitrary pollable descriptor.
    pub fn spawn<F>(source: F, capacity: usize) -> Result<(Self, mpsc::Receiver<KeyEvent>), InputError>
    where
        F: AsFd + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("lcdlab-keys".into())
            .spawn(move || listen(source, tx, thread_stop))
            .map_err(InputError::Spawn)?;

        Ok((
            Self {
                stop,
                handle: Some(handle),
                _terminal: None,
            },
            rx,
        ))
    }

    /// Stop the listener and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("key listener thread panicked");
            }
        }
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listen<F: AsFd>(source: F, tx: mpsc::Sender<KeyEvent>, stop: Arc<AtomicBool>) {
    tracing::debug!("key listener started");
    let mut buf = [0u8; READ_CHUNK];

    while !stop.load(Ordering::Relaxed) {
        let readable = {
            let mut fds = [PollFd::new(source.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
                Ok(0) => false,
                Ok(_) => fds[0]
                    .revents()
                    .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP)),
                Err(nix::Error::EINTR) => false,
                Err(e) => {
                    tracing::warn!(error = %e, "poll on key source failed");
                    break;
                }
            }
        };
        if !readable {
            continue;
        }

        let n = match unistd::read(source.as_fd(), &mut buf) {
            Ok(0) => {
                tracing::debug!("key source closed");
                break;
            }
            Ok(n) => n,
            Err(nix::Error::EINTR | nix::Error::EAGAIN) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "read from key source failed");
                break;
            }
        };

        for &byte in &buf[..n] {
            let event = KeyEvent::from_byte(byte);
            tracing::debug!(?event, "key");
            if tx.blocking_send(event).is_err() {
                tracing::debug!("key listener exiting");
                return;
            }
        }
    }
    tracing::debug!("key listener exiting");
}
