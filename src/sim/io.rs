//! Input sources for the simulated keyboard.
//!
//! The keyboard device pulls characters through the [`Inputter`] interface.
//! This module provides:
//! - [`NoInput`]: An inputter with nothing to say.
//! - [`BufferedInputter`]: Reads off a shared memory buffer.
//! - [`ChannelInputter`]: Reads from a reader thread through a channel, for
//!   hosts whose input genuinely arrives asynchronously.
//!
//! All inputters are polled from the engine thread only; if a host wants to
//! feed one from elsewhere, the buffer/channel is the synchronization point.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;

/// A source of keyboard characters.
pub trait Inputter: Send {
    /// Called once when a run starts, before any polling.
    fn begin_input(&mut self) {}
    /// Called once when a run ends.
    fn end_input(&mut self) {}
    /// Takes one character, if one is available right now.
    fn get_char(&mut self) -> Option<u8>;
    /// Whether any input is currently pending.
    fn has_remaining(&self) -> bool;
}

/// No input. [`Inputter::get_char`] never yields anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl Inputter for NoInput {
    fn get_char(&mut self) -> Option<u8> {
        None
    }

    fn has_remaining(&self) -> bool {
        false
    }
}

/// An inputter that reads off a shared buffer.
///
/// The buffer handle can be kept by the host and refilled at any time.
/// Note that while a lock guard on the buffer is held, the input is
/// temporarily invisible to the simulator, so guards should be short-lived.
#[derive(Default, Clone)]
pub struct BufferedInputter {
    buffer: Arc<RwLock<VecDeque<u8>>>,
}

impl BufferedInputter {
    /// Creates an inputter with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inputter over an existing buffer.
    pub fn with_buffer(buffer: Arc<RwLock<VecDeque<u8>>>) -> Self {
        Self { buffer }
    }

    /// A handle to the input buffer.
    pub fn get_buffer(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.buffer
    }

    fn try_input(&self) -> Option<RwLockWriteGuard<'_, VecDeque<u8>>> {
        match self.buffer.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl Inputter for BufferedInputter {
    fn get_char(&mut self) -> Option<u8> {
        self.try_input()?.pop_front()
    }

    fn has_remaining(&self) -> bool {
        self.try_input().is_some_and(|buf| !buf.is_empty())
    }
}

/// A helper for [`ChannelInputter::new`], indicating the reader is done and
/// no more characters will come from it.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stop;

/// An inputter fed by a dedicated reader thread.
///
/// The reader function is called in a loop on its own thread; it should
/// block until a character is ready, or return [`Stop`] when the input is
/// exhausted. Characters cross to the engine thread through a bounded
/// channel, so at most one character is ever buffered ahead of the device.
///
/// Because the reader thread polls independently of the simulator, care
/// should be taken not to produce input while the simulator is not running.
pub struct ChannelInputter {
    data: cbc::Receiver<u8>,
    #[allow(unused)]
    handle: JoinHandle<()>,
}

impl ChannelInputter {
    /// Spawns the reader thread and connects it to a new inputter.
    pub fn new(mut reader: impl FnMut() -> Result<u8, Stop> + Send + 'static) -> Self {
        let (tx, rx) = cbc::bounded(1);

        let handle = std::thread::spawn(move || loop {
            let Ok(byte) = reader() else { return };
            let Ok(()) = tx.send(byte) else { return };
        });

        Self { data: rx, handle }
    }
}

impl Inputter for ChannelInputter {
    fn get_char(&mut self) -> Option<u8> {
        match self.data.try_recv() {
            Ok(b) => Some(b),
            Err(cbc::TryRecvError::Empty) => None,
            // The reader thread is gone; there is simply no more input.
            Err(cbc::TryRecvError::Disconnected) => None,
        }
    }

    fn has_remaining(&self) -> bool {
        !self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_inputter_drains_in_order() {
        let mut inp = BufferedInputter::new();
        inp.get_buffer().write().unwrap().extend(*b"ab");

        assert!(inp.has_remaining());
        assert_eq!(inp.get_char(), Some(b'a'));
        assert_eq!(inp.get_char(), Some(b'b'));
        assert_eq!(inp.get_char(), None);
        assert!(!inp.has_remaining());
    }

    #[test]
    fn test_channel_inputter_stops() {
        let chars = std::sync::Mutex::new(vec![b'x']);
        let mut inp = ChannelInputter::new(move || {
            chars.lock().unwrap().pop().ok_or(Stop)
        });

        // The reader thread needs a moment to push the character through.
        let mut got = None;
        for _ in 0..100 {
            got = inp.get_char();
            if got.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(got, Some(b'x'));
        assert_eq!(inp.get_char(), None);
    }
}
