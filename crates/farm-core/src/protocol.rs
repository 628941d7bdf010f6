//! Reporting protocol between workers, master and collector.
//!
//! On-wire layout, every integer is a host-native `i64`:
//!
//! ```text
//! submit    : [0][result][name_len][name bytes ...]
//! print     : [1]
//! terminate : [2]
//! ```
//!
//! `name_len` counts the bytes that follow. Peers may append a trailing NUL
//! and include it in the length; the decoder strips it.

use std::io::{Read, Write};

use crate::error::{FarmError, FarmResult};
use crate::io::{read_exact, read_full, write_all, ReadStatus};

/// Width of every integer field on the wire
pub const FIELD_BYTES: usize = std::mem::size_of::<i64>();

/// Longest source identifier a collector will accept (Linux `PATH_MAX`)
pub const MAX_NAME_LEN: usize = 4096;

/// Message opcodes
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Submit = 0,
    Print = 1,
    Terminate = 2,
}

impl Opcode {
    pub const fn to_i64(self) -> i64 {
        self as i64
    }

    /// `None` for values this protocol never generates
    pub const fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Opcode::Submit),
            1 => Some(Opcode::Print),
            2 => Some(Opcode::Terminate),
            _ => None,
        }
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// One computed result and the input it came from
    Submit { result: i64, name: String },
    /// Snapshot-print the collector's store
    Print,
    /// No more work will be produced
    Terminate,
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Submit { .. } => Opcode::Submit,
            Message::Print => Opcode::Print,
            Message::Terminate => Opcode::Terminate,
        }
    }

    /// Encode into a single buffer so a message goes out in one write
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Submit { result, name } => encode_submit(*result, name),
            other => other.opcode().to_i64().to_ne_bytes().to_vec(),
        }
    }

    /// Encode and write the whole message
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> FarmResult<()> {
        write_all(writer, &self.encode())
    }

    /// Read exactly one message.
    ///
    /// `Ok(None)` means the peer closed the stream where an opcode was
    /// expected. A stream that ends inside a message is `Err(ShortRead)`;
    /// nothing of a truncated message is returned.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> FarmResult<Option<Message>> {
        let mut field = [0u8; FIELD_BYTES];
        if read_full(reader, &mut field)? == ReadStatus::Eof {
            return Ok(None);
        }
        let raw = i64::from_ne_bytes(field);
        let opcode = Opcode::from_i64(raw)
            .ok_or_else(|| FarmError::ProtocolViolation(format!("unknown opcode {}", raw)))?;

        match opcode {
            Opcode::Print => Ok(Some(Message::Print)),
            Opcode::Terminate => Ok(Some(Message::Terminate)),
            Opcode::Submit => {
                let result = read_i64(reader)?;
                let len = read_i64(reader)?;
                if len < 0 || len as usize > MAX_NAME_LEN + 1 {
                    return Err(FarmError::ProtocolViolation(format!(
                        "name length {} out of range",
                        len
                    )));
                }
                let mut name = vec![0u8; len as usize];
                read_exact(reader, &mut name)?;
                if name.last() == Some(&0) {
                    name.pop();
                }
                let name = String::from_utf8(name).map_err(|e| {
                    FarmError::ProtocolViolation(format!("source id is not utf-8: {}", e))
                })?;
                Ok(Some(Message::Submit { result, name }))
            }
        }
    }
}

/// Encode a submit message without building a [`Message`]
pub fn encode_submit(result: i64, name: &str) -> Vec<u8> {
    let bytes = name.as_bytes();
    let mut buf = Vec::with_capacity(3 * FIELD_BYTES + bytes.len());
    buf.extend_from_slice(&Opcode::Submit.to_i64().to_ne_bytes());
    buf.extend_from_slice(&result.to_ne_bytes());
    buf.extend_from_slice(&(bytes.len() as i64).to_ne_bytes());
    buf.extend_from_slice(bytes);
    buf
}

fn read_i64<R: Read + ?Sized>(reader: &mut R) -> FarmResult<i64> {
    let mut field = [0u8; FIELD_BYTES];
    read_exact(reader, &mut field)?;
    Ok(i64::from_ne_bytes(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testing::Trickle;

    fn submit(result: i64, name: &str) -> Message {
        Message::Submit { result, name: name.to_string() }
    }

    #[test]
    fn test_submit_round_trip() {
        let msg = submit(42, "foo/bar.bin");
        let wire = msg.encode();
        assert_eq!(wire.len(), 3 * FIELD_BYTES + "foo/bar.bin".len());

        let mut r = Trickle::new(&wire, 5);
        assert_eq!(Message::read_from(&mut r).unwrap(), Some(msg));
        assert_eq!(Message::read_from(&mut r).unwrap(), None);
    }

    #[test]
    fn test_control_messages_are_one_field() {
        assert_eq!(Message::Print.encode(), 1i64.to_ne_bytes().to_vec());
        assert_eq!(Message::Terminate.encode(), 2i64.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_back_to_back_messages() {
        let mut wire = Vec::new();
        Message::Print.write_to(&mut wire).unwrap();
        submit(-7, "a").write_to(&mut wire).unwrap();
        Message::Terminate.write_to(&mut wire).unwrap();

        let mut r: &[u8] = &wire;
        assert_eq!(Message::read_from(&mut r).unwrap(), Some(Message::Print));
        assert_eq!(Message::read_from(&mut r).unwrap(), Some(submit(-7, "a")));
        assert_eq!(Message::read_from(&mut r).unwrap(), Some(Message::Terminate));
        assert_eq!(Message::read_from(&mut r).unwrap(), None);
    }

    #[test]
    fn test_truncated_payload_is_short_read() {
        let wire = submit(42, "foo/bar.bin").encode();
        for cut in [FIELD_BYTES + 1, 2 * FIELD_BYTES, 3 * FIELD_BYTES + 4] {
            let mut r: &[u8] = &wire[..cut];
            assert!(
                matches!(Message::read_from(&mut r), Err(FarmError::ShortRead { .. })),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_trailing_nul_is_stripped() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&0i64.to_ne_bytes());
        wire.extend_from_slice(&9i64.to_ne_bytes());
        wire.extend_from_slice(&4i64.to_ne_bytes());
        wire.extend_from_slice(b"abc\0");
        let mut r: &[u8] = &wire;
        assert_eq!(Message::read_from(&mut r).unwrap(), Some(submit(9, "abc")));
    }

    #[test]
    fn test_unknown_opcode_is_violation() {
        let wire = 7i64.to_ne_bytes();
        let mut r: &[u8] = &wire;
        assert!(matches!(
            Message::read_from(&mut r),
            Err(FarmError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_negative_length_is_violation() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&0i64.to_ne_bytes());
        wire.extend_from_slice(&1i64.to_ne_bytes());
        wire.extend_from_slice(&(-3i64).to_ne_bytes());
        let mut r: &[u8] = &wire;
        assert!(matches!(
            Message::read_from(&mut r),
            Err(FarmError::ProtocolViolation(_))
        ));
    }
}
