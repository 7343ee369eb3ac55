//! Bounded FIFO byte buffer (component 4.F).
//!
//! Modeled as a deque of chunks rather than the original's linked list of
//! raw-pointer chunks (see SPEC_FULL.md / DESIGN.md on the linked-list
//! re-architecture). `fill_from` / `drain_to` are the async equivalents of
//! the original's `fill_from_fd` / `drain_to_fd`: they operate against any
//! `AsyncRead`/`AsyncWrite` half of a socket instead of a raw fd.

use crate::error::ProxyError;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard cap on the total bytes a `Buffer` may hold. The relay loop uses this
/// as the backpressure signal: once full, it stops expressing read interest
/// on the producing side until the consumer has drained some of it.
pub const MAX_BUFFER_SIZE: usize = 96 * 1024;

/// A single read from the OS rarely exceeds this in practice; chunking at
/// this size keeps individual allocations small and bounded.
const READ_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct Buffer {
    chunks: VecDeque<Bytes>,
    size: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            size: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size >= MAX_BUFFER_SIZE
    }

    pub fn remaining_capacity(&self) -> usize {
        MAX_BUFFER_SIZE.saturating_sub(self.size)
    }

    /// Read up to the remaining capacity from `reader` and append it as one
    /// chunk. Returns `Ok(0)` on EOF. Never reads past `MAX_BUFFER_SIZE`.
    pub async fn fill_from<R>(&mut self, reader: &mut R) -> Result<usize, ProxyError>
    where
        R: AsyncRead + Unpin,
    {
        let want = self.remaining_capacity().min(READ_CHUNK_SIZE);
        if want == 0 {
            return Ok(0);
        }
        let mut tmp = BytesMut::zeroed(want);
        let n = reader.read(&mut tmp).await?;
        if n > 0 {
            tmp.truncate(n);
            self.size += n;
            self.chunks.push_back(tmp.freeze());
        }
        Ok(n)
    }

    /// Append raw bytes directly (used to push already-read data, e.g. a
    /// request-line remainder, ahead of the relay taking over).
    pub fn push(&mut self, data: Bytes) {
        self.size += data.len();
        self.chunks.push_back(data);
    }

    /// Write the head chunk (from its current offset) to `writer`. Returns
    /// the number of bytes written; frees the chunk once fully drained.
    pub async fn drain_to<W>(&mut self, writer: &mut W) -> Result<usize, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(front) = self.chunks.front_mut() else {
            return Ok(0);
        };
        let n = writer.write(front).await?;
        if n > 0 {
            self.size -= n;
            if n >= front.len() {
                self.chunks.pop_front();
            } else {
                *front = front.slice(n..);
            }
        }
        Ok(n)
    }

    /// Drain the whole buffer to `writer`, best-effort, used during relay
    /// teardown where partial delivery is still better than none.
    pub async fn drain_all_to<W>(&mut self, writer: &mut W) -> Result<(), ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        while !self.is_empty() {
            if self.drain_to(writer).await? == 0 {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn fill_then_drain_round_trips_bytes() {
        let mut reader = Builder::new().read(b"hello world").build();
        let mut buf = Buffer::new();
        let n = buf.fill_from(&mut reader).await.unwrap();
        assert_eq!(n, 11);
        assert_eq!(buf.size(), 11);

        let mut writer = Builder::new().write(b"hello world").build();
        let written = buf.drain_to(&mut writer).await.unwrap();
        assert_eq!(written, 11);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn fill_from_returns_zero_on_eof() {
        let mut reader = Builder::new().build();
        let mut buf = Buffer::new();
        let n = buf.fill_from(&mut reader).await.unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn push_tracks_size_and_never_silently_grows_past_cap_check() {
        let mut buf = Buffer::new();
        buf.push(Bytes::from_static(b"abc"));
        assert_eq!(buf.size(), 3);
        assert!(!buf.is_full());
    }

    #[tokio::test]
    async fn partial_write_advances_offset_without_freeing_chunk() {
        let mut buf = Buffer::new();
        buf.push(Bytes::from_static(b"abcdef"));
        let mut writer = Builder::new().write(b"abc").build();
        let n = buf.drain_to(&mut writer).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf.size(), 3);
    }
}
