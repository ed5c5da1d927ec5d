//! Append-only byte store for one resource
//!
//! Handles:
//! - Contiguous chunk accumulation in arrival order
//! - Write-once expected total size
//! - Bounds-checked range reads for the fulfillment scan

use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use tracing::warn;

/// Append-only growable store of downloaded bytes plus the separately
/// tracked expected total size.
///
/// Bytes already written are never mutated or removed, so the write
/// cursor (`available`) is monotonically non-decreasing.
#[derive(Debug, Default)]
pub struct MediaBuffer {
    data: BytesMut,
    total_size: Option<u64>,
}

impl MediaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a downloaded chunk, advancing the write cursor
    pub fn append(&mut self, chunk: &[u8]) {
        if let Some(total) = self.total_size {
            let after = self.data.len() as u64 + chunk.len() as u64;
            if after > total {
                // Upstream sent more bytes than it declared. Keep them, the
                // terminal handler reconciles against the real length.
                warn!(declared = total, received = after, "buffer exceeds declared total size");
            }
        }
        self.data.extend_from_slice(chunk);
    }

    /// Read `[offset, offset + min(length, available - offset))`
    ///
    /// Callers check availability before calling; an offset at or past the
    /// write cursor is an internal invariant violation.
    pub fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        let available = self.available();
        if offset >= available {
            return Err(Error::OutOfRange { offset, available });
        }
        let end = available.min(offset + length);
        Ok(Bytes::copy_from_slice(
            &self.data[offset as usize..end as usize],
        ))
    }

    /// Record the expected total size, at most one distinct value per
    /// resource lifetime
    ///
    /// Repeating the same value is a silent no-op; a different value is a
    /// [`Error::MetadataConflict`], fatal for the resource.
    pub fn set_total_size(&mut self, reported: u64) -> Result<()> {
        match self.total_size {
            Some(expected) if expected != reported => {
                Err(Error::MetadataConflict { expected, reported })
            }
            Some(_) => Ok(()),
            None => {
                self.total_size = Some(reported);
                Ok(())
            }
        }
    }

    /// Current write cursor position
    pub fn available(&self) -> u64 {
        self.data.len() as u64
    }

    /// Expected total size, if learned
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Whether every expected byte has arrived
    pub fn is_complete(&self) -> bool {
        self.total_size == Some(self.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_grows_monotonically() {
        let mut buffer = MediaBuffer::new();
        let mut last = 0;
        for chunk in [&b"abc"[..], b"", b"defgh", b"i"] {
            buffer.append(chunk);
            assert!(buffer.available() >= last);
            last = buffer.available();
        }
        assert_eq!(buffer.available(), 9);
    }

    #[test]
    fn test_appended_bytes_read_back_in_order() {
        let mut buffer = MediaBuffer::new();
        buffer.append(b"hello ");
        buffer.append(b"world");

        let all = buffer.read(0, buffer.available()).unwrap();
        assert_eq!(&all[..], b"hello world");
    }

    #[test]
    fn test_read_clamps_length_to_available() {
        let mut buffer = MediaBuffer::new();
        buffer.append(b"0123456789");

        let tail = buffer.read(7, 100).unwrap();
        assert_eq!(&tail[..], b"789");
    }

    #[test]
    fn test_read_past_cursor_is_out_of_range() {
        let mut buffer = MediaBuffer::new();
        buffer.append(b"abc");

        match buffer.read(3, 1) {
            Err(Error::OutOfRange { offset, available }) => {
                assert_eq!(offset, 3);
                assert_eq!(available, 3);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_set_total_size_idempotent() {
        let mut buffer = MediaBuffer::new();
        buffer.set_total_size(1000).unwrap();
        buffer.set_total_size(1000).unwrap();
        assert_eq!(buffer.total_size(), Some(1000));
    }

    #[test]
    fn test_set_total_size_conflict() {
        let mut buffer = MediaBuffer::new();
        buffer.set_total_size(1000).unwrap();

        match buffer.set_total_size(500) {
            Err(Error::MetadataConflict { expected, reported }) => {
                assert_eq!(expected, 1000);
                assert_eq!(reported, 500);
            }
            other => panic!("expected MetadataConflict, got {other:?}"),
        }
        // The first value stays fixed
        assert_eq!(buffer.total_size(), Some(1000));
    }

    #[test]
    fn test_is_complete() {
        let mut buffer = MediaBuffer::new();
        assert!(!buffer.is_complete());

        buffer.set_total_size(5).unwrap();
        buffer.append(b"ab");
        assert!(!buffer.is_complete());

        buffer.append(b"cde");
        assert!(buffer.is_complete());
    }
}
