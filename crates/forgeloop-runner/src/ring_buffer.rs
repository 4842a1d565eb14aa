//! Ring buffer for bounded output capture
//!
//! Keeps the most recent `max_bytes` of a stream. Harness failures are
//! usually explained at the end of the output, so the tail is what survives.

use std::collections::VecDeque;
use std::fmt;

/// A byte buffer that never grows beyond `max_bytes`
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: VecDeque<u8>,
    max_bytes: usize,
    total_bytes_written: usize,
}

impl RingBuffer {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_bytes.min(8192)),
            max_bytes,
            total_bytes_written: 0,
        }
    }

    /// Build a buffer holding the tail of `data`.
    #[must_use]
    pub fn from_tail(max_bytes: usize, data: &[u8]) -> Self {
        let mut buf = Self::new(max_bytes);
        buf.write(data);
        buf
    }

    /// Append data, dropping the oldest bytes once full.
    pub fn write(&mut self, data: &[u8]) {
        self.total_bytes_written += data.len();

        if self.max_bytes == 0 {
            return;
        }

        // Only the last max_bytes of an oversized write can survive
        let start = data.len().saturating_sub(self.max_bytes);
        for &byte in &data[start..] {
            if self.buffer.len() >= self.max_bytes {
                self.buffer.pop_front();
            }
            self.buffer.push_back(byte);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total bytes written, including those that were dropped
    #[must_use]
    pub const fn total_bytes_written(&self) -> usize {
        self.total_bytes_written
    }

    #[must_use]
    pub const fn was_truncated(&self) -> bool {
        self.total_bytes_written > self.max_bytes
    }

    /// Contents as bytes, oldest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.iter().copied().collect()
    }
}

impl fmt::Display for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_vec()))
    }
}
