//! Versioned, checksummed config records.
//!
//! Each persisted subsystem (mapping table, serial config, CAN config) is
//! stored as one independent record:
//!
//! ```text
//! 'H' 'C' <kind> <version> <len lo> <len hi> <payload ...> <crc lo> <crc hi>
//! ```
//!
//! The CRC-16 covers the header and the payload.
//!
//! # Example
//!
//! ```
//! use hidcan_proto::record::{open_record, RecordKind, RecordWriter};
//!
//! let mut buf = [0u8; 32];
//! let mut writer = RecordWriter::new(&mut buf, RecordKind::SerialConfig, 1).unwrap();
//! writer.u32_le(115_200).unwrap();
//! let len = writer.finish();
//!
//! let mut reader = open_record(&buf[..len], RecordKind::SerialConfig, 1).unwrap();
//! assert_eq!(reader.u32_le().unwrap(), 115_200);
//! ```

use crate::crc::{calculate_crc16, Crc16Digest};

/// Record magic bytes.
pub const MAGIC: [u8; 2] = *b"HC";

/// Bytes before the payload: magic, kind, version, payload length.
pub const HEADER_LEN: usize = 6;

/// Bytes after the payload: CRC-16.
pub const TRAILER_LEN: usize = 2;

/// Which subsystem a record belongs to. Doubles as the storage key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RecordKind {
    Mappings = 1,
    SerialConfig = 2,
    CanConfig = 3,
}

impl RecordKind {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Mappings),
            2 => Some(Self::SerialConfig),
            3 => Some(Self::CanConfig),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Error type for record operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// The output buffer cannot hold the record.
    BufferTooSmall,
    /// The record ends before its declared length.
    Truncated,
    /// Magic bytes do not match.
    BadMagic,
    /// Record belongs to another subsystem.
    WrongKind,
    /// Record was written by an unknown layout version.
    UnsupportedVersion(u8),
    /// CRC mismatch.
    Checksum,
    /// A payload field holds a value the decoder does not accept.
    InvalidField,
}

impl core::fmt::Display for RecordError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::Truncated => write!(f, "record truncated"),
            Self::BadMagic => write!(f, "bad record magic"),
            Self::WrongKind => write!(f, "wrong record kind"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported record version {}", v),
            Self::Checksum => write!(f, "record checksum mismatch"),
            Self::InvalidField => write!(f, "invalid record field"),
        }
    }
}

/// Writes a record payload in place, then seals it with header and CRC.
pub struct RecordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    kind: RecordKind,
    version: u8,
}

impl<'a> RecordWriter<'a> {
    /// Start a record in `buf`, reserving room for header and trailer.
    pub fn new(buf: &'a mut [u8], kind: RecordKind, version: u8) -> Result<Self, RecordError> {
        if buf.len() < HEADER_LEN + TRAILER_LEN {
            return Err(RecordError::BufferTooSmall);
        }
        Ok(Self {
            buf,
            pos: HEADER_LEN,
            kind,
            version,
        })
    }

    /// Append raw payload bytes.
    pub fn bytes(&mut self, data: &[u8]) -> Result<(), RecordError> {
        let end = self.pos + data.len();
        if end + TRAILER_LEN > self.buf.len() || end - HEADER_LEN > u16::MAX as usize {
            return Err(RecordError::BufferTooSmall);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    #[inline]
    pub fn u8(&mut self, value: u8) -> Result<(), RecordError> {
        self.bytes(&[value])
    }

    #[inline]
    pub fn i16_le(&mut self, value: i16) -> Result<(), RecordError> {
        self.bytes(&value.to_le_bytes())
    }

    #[inline]
    pub fn u32_le(&mut self, value: u32) -> Result<(), RecordError> {
        self.bytes(&value.to_le_bytes())
    }

    /// Write header and CRC; returns the total record length.
    #[must_use]
    pub fn finish(self) -> usize {
        let payload_len = (self.pos - HEADER_LEN) as u16;
        self.buf[0..2].copy_from_slice(&MAGIC);
        self.buf[2] = self.kind.as_u8();
        self.buf[3] = self.version;
        self.buf[4..6].copy_from_slice(&payload_len.to_le_bytes());

        let mut digest = Crc16Digest::new();
        digest.update(&self.buf[..self.pos]);
        let crc = digest.finalize();
        self.buf[self.pos..self.pos + TRAILER_LEN].copy_from_slice(&crc.to_le_bytes());
        self.pos + TRAILER_LEN
    }
}

/// Cursor over a verified record payload.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    /// Read the next `n` payload bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos.checked_add(n).ok_or(RecordError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(RecordError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8, RecordError> {
        Ok(self.bytes(1)?[0])
    }

    #[inline]
    pub fn i16_le(&mut self) -> Result<i16, RecordError> {
        let b = self.bytes(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    #[inline]
    pub fn u32_le(&mut self) -> Result<u32, RecordError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Payload bytes not consumed yet.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Verify a record and return a reader over its payload.
pub fn open_record(bytes: &[u8], kind: RecordKind, version: u8) -> Result<RecordReader<'_>, RecordError> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(RecordError::Truncated);
    }
    if bytes[0..2] != MAGIC {
        return Err(RecordError::BadMagic);
    }

    let payload_len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    let end = HEADER_LEN + payload_len;
    if bytes.len() < end + TRAILER_LEN {
        return Err(RecordError::Truncated);
    }

    let stored = u16::from_le_bytes([bytes[end], bytes[end + 1]]);
    if calculate_crc16(&bytes[..end]) != stored {
        return Err(RecordError::Checksum);
    }
    if bytes[2] != kind.as_u8() {
        return Err(RecordError::WrongKind);
    }
    if bytes[3] != version {
        return Err(RecordError::UnsupportedVersion(bytes[3]));
    }

    Ok(RecordReader {
        data: &bytes[HEADER_LEN..end],
        pos: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(buf: &mut [u8]) -> usize {
        let mut writer = RecordWriter::new(buf, RecordKind::CanConfig, 1).unwrap();
        writer.u8(1).unwrap();
        writer.i16_le(-127).unwrap();
        writer.u32_le(500_000).unwrap();
        writer.finish()
    }

    #[test]
    fn test_record_fields_survive() {
        let mut buf = [0u8; 32];
        let len = sample(&mut buf);
        assert_eq!(len, HEADER_LEN + 7 + TRAILER_LEN);

        let mut reader = open_record(&buf[..len], RecordKind::CanConfig, 1).unwrap();
        assert_eq!(reader.u8().unwrap(), 1);
        assert_eq!(reader.i16_le().unwrap(), -127);
        assert_eq!(reader.u32_le().unwrap(), 500_000);
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.u8(), Err(RecordError::Truncated));
    }

    #[test]
    fn test_record_detects_corruption() {
        let mut buf = [0u8; 32];
        let len = sample(&mut buf);
        buf[HEADER_LEN + 1] ^= 0x40;
        assert_eq!(
            open_record(&buf[..len], RecordKind::CanConfig, 1).err(),
            Some(RecordError::Checksum)
        );
    }

    #[test]
    fn test_record_kind_and_version_checked() {
        let mut buf = [0u8; 32];
        let len = sample(&mut buf);
        assert_eq!(
            open_record(&buf[..len], RecordKind::SerialConfig, 1).err(),
            Some(RecordError::WrongKind)
        );
        assert_eq!(
            open_record(&buf[..len], RecordKind::CanConfig, 2).err(),
            Some(RecordError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn test_record_truncated_and_magic() {
        let mut buf = [0u8; 32];
        let len = sample(&mut buf);
        assert_eq!(
            open_record(&buf[..len - 1], RecordKind::CanConfig, 1).err(),
            Some(RecordError::Truncated)
        );
        buf[0] = b'X';
        assert_eq!(
            open_record(&buf[..len], RecordKind::CanConfig, 1).err(),
            Some(RecordError::BadMagic)
        );
    }

    #[test]
    fn test_writer_rejects_overflow() {
        let mut buf = [0u8; HEADER_LEN + TRAILER_LEN + 2];
        let mut writer = RecordWriter::new(&mut buf, RecordKind::Mappings, 1).unwrap();
        writer.i16_le(1).unwrap();
        assert_eq!(writer.u8(0), Err(RecordError::BufferTooSmall));
    }
}
