//! Full-transfer read/write primitives over a byte stream.
//!
//! Short kernel transfers and `EINTR` are retried here so the protocol layer
//! only ever sees whole fields. The only way a read comes back incomplete is
//! the peer closing the stream, which is reported as [`ReadStatus::Eof`]
//! (nothing arrived) or [`FarmError::ShortRead`] (part of the field arrived).

use std::io::{self, Read, Write};

use crate::error::{FarmError, FarmResult};

/// Outcome of [`read_full`] when no transport error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer was filled completely
    Complete,
    /// The peer closed the stream before the first byte
    Eof,
}

/// Fill `buf` completely from `reader`.
///
/// Returns `Eof` if the stream ends before any byte was read and
/// `Err(ShortRead)` if it ends part way through.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> FarmResult<ReadStatus> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadStatus::Eof),
            Ok(0) => {
                return Err(FarmError::ShortRead {
                    expected: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FarmError::transport("read", e)),
        }
    }
    Ok(ReadStatus::Complete)
}

/// Like [`read_full`] but an end of stream anywhere is a `ShortRead`.
///
/// Used for every field after the first one of a message.
pub fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> FarmResult<()> {
    match read_full(reader, buf)? {
        ReadStatus::Complete => Ok(()),
        ReadStatus::Eof => Err(FarmError::ShortRead {
            expected: buf.len(),
            got: 0,
        }),
    }
}

/// Write all of `bytes`, retrying partial writes and interrupted calls.
pub fn write_all<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> FarmResult<()> {
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]) {
            Ok(0) => {
                return Err(FarmError::transport(
                    "write",
                    io::Error::from(io::ErrorKind::WriteZero),
                ))
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FarmError::transport("write", e)),
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Read, Write};

    /// Reader that hands out at most `chunk` bytes per call and injects an
    /// `Interrupted` error before every successful read.
    pub struct Trickle<'a> {
        pub data: &'a [u8],
        pub chunk: usize,
        pub interrupt_next: bool,
    }

    impl<'a> Trickle<'a> {
        pub fn new(data: &'a [u8], chunk: usize) -> Self {
            Self { data, chunk, interrupt_next: true }
        }
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next && !self.data.is_empty() {
                self.interrupt_next = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Writer that accepts at most `chunk` bytes per call
    pub struct Choke {
        pub out: Vec<u8>,
        pub chunk: usize,
        pub interrupt_next: bool,
    }

    impl Write for Choke {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            let n = self.chunk.min(buf.len());
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Choke, Trickle};
    use super::*;

    #[test]
    fn test_read_full_across_short_reads() {
        let data: Vec<u8> = (0u8..20).collect();
        let mut r = Trickle::new(&data, 3);
        let mut buf = [0u8; 20];
        assert_eq!(read_full(&mut r, &mut buf).unwrap(), ReadStatus::Complete);
        assert_eq!(&buf[..], &data[..]);
    }

    #[test]
    fn test_read_full_eof_before_first_byte() {
        let mut r: &[u8] = &[];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut r, &mut buf).unwrap(), ReadStatus::Eof);
    }

    #[test]
    fn test_read_full_eof_mid_field() {
        let mut r: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];
        match read_full(&mut r, &mut buf) {
            Err(FarmError::ShortRead { expected: 8, got: 3 }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_exact_eof_is_short() {
        let mut r: &[u8] = &[];
        let mut buf = [0u8; 4];
        assert!(matches!(
            read_exact(&mut r, &mut buf),
            Err(FarmError::ShortRead { expected: 4, got: 0 })
        ));
    }

    #[test]
    fn test_write_all_retries_partial_and_interrupted() {
        let mut w = Choke { out: Vec::new(), chunk: 5, interrupt_next: true };
        let payload: Vec<u8> = (0u8..33).collect();
        write_all(&mut w, &payload).unwrap();
        assert_eq!(w.out, payload);
    }

    #[test]
    fn test_write_zero_is_transport_error() {
        let mut full: &mut [u8] = &mut [];
        let err = write_all(&mut full, b"abc").unwrap_err();
        assert!(matches!(err, FarmError::Transport { op: "write", .. }));
    }
}
