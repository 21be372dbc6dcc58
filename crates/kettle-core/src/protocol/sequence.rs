//! Sequence counter for outbound command frames.
//!
//! # What is the sequence byte? (for beginners)
//!
//! Byte 11 of every frame the controller sends is a one-byte sequence number.
//! The kettle echoes it in its replies, which lets a log reader pair a
//! command with the acknowledgement that followed it.  Because it is a
//! single byte, the counter wraps from 255 back to 0.
//!
//! # Thread safety
//!
//! Commands can be issued by a caller while the keep-alive task and the read
//! loop's initial query are also running, so the counter uses an `AtomicU8`
//! rather than a plain `u8` behind `&mut`.

use std::sync::atomic::{AtomicU8, Ordering};

/// A thread-safe, wrapping counter for frame sequence numbers.
///
/// One counter belongs to one session and is kept across reconnects, so
/// sequence numbers keep increasing on the wire after the socket is replaced.
///
/// # Examples
///
/// ```rust
/// use kettle_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::starting_at(255);
/// assert_eq!(counter.next(), 255);
/// assert_eq!(counter.next(), 0);
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU8,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(value: u8) -> Self {
        Self {
            inner: AtomicU8::new(value),
        }
    }

    /// Returns the next sequence number and atomically increments the counter.
    ///
    /// `fetch_add` on atomics wraps on overflow, so 255 is followed by 0.
    /// `Relaxed` is enough: the value only labels frames and does not guard
    /// any other memory.
    pub fn next(&self) -> u8 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to [`next`](Self::next) will yield.
    pub fn peek(&self) -> u8 {
        self.inner.load(Ordering::Relaxed)
    }
}
