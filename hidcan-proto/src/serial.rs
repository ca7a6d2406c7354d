//! Serial encodings.
//!
//! Two layers are involved when a mapped value reaches the serial port:
//!
//! 1. [`encode_value`] turns an event value into a fixed-length payload
//!    according to the rule's [`ValueFormat`].
//! 2. [`format_line`] applies the sink-wide [`LineFormat`] to that payload
//!    right before it is queued for transmission.
//!
//! # Example
//!
//! ```
//! use hidcan_proto::serial::{encode_value, format_line, LineFormat, ValueFormat};
//!
//! let payload = encode_value(0x1234, ValueFormat::BinaryBe, 2).unwrap();
//! assert_eq!(payload.as_slice(), &[0x12, 0x34]);
//!
//! let mut line = [0u8; 16];
//! let len = format_line(payload.as_slice(), LineFormat::AsciiHex, &mut line).unwrap();
//! assert_eq!(&line[..len], b"12 34");
//! ```

/// Longest payload a mapping rule can produce.
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Longest line [`format_line`] can produce from a [`MAX_PAYLOAD_LEN`] payload.
///
/// Breakdown for `AsciiHex`: 8 * 2 hex digits + 7 separators = 23.
pub const MAX_LINE_LEN: usize = 24;

/// Hex digits lookup table.
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// How a mapping rule encodes the event value.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ValueFormat {
    /// Low byte of the value.
    #[default]
    Raw = 0,
    /// `'0' + value`, only meaningful for values 0-9.
    AsciiDigit = 1,
    /// 16-bit little-endian.
    BinaryLe = 2,
    /// 16-bit big-endian.
    BinaryBe = 3,
}

impl ValueFormat {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Raw),
            1 => Some(Self::AsciiDigit),
            2 => Some(Self::BinaryLe),
            3 => Some(Self::BinaryBe),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// How the serial sink renders every payload on the wire.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LineFormat {
    /// Bytes as they are.
    #[default]
    Raw = 0,
    /// Two uppercase hex digits per byte, space separated.
    AsciiHex = 1,
    /// Bytes as they are (payloads are already little-endian).
    BinaryLsb = 2,
    /// Byte order reversed for 2- and 4-byte payloads.
    BinaryMsb = 3,
    /// `0x` prefix, hex digits, CRLF terminator.
    Hex = 4,
}

impl LineFormat {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Raw),
            1 => Some(Self::AsciiHex),
            2 => Some(Self::BinaryLsb),
            3 => Some(Self::BinaryMsb),
            4 => Some(Self::Hex),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Number of bytes a `len`-byte payload occupies once formatted.
    #[must_use]
    pub const fn formatted_len(self, len: usize) -> usize {
        match self {
            Self::Raw | Self::BinaryLsb | Self::BinaryMsb => len,
            Self::AsciiHex => {
                if len == 0 {
                    0
                } else {
                    len * 3 - 1
                }
            }
            Self::Hex => 2 + len * 2 + 2,
        }
    }
}

/// Error type for encoding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Requested payload length is 0 or above [`MAX_PAYLOAD_LEN`].
    InvalidLength,
    /// The output buffer is too small to hold the formatted bytes.
    BufferTooSmall,
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "invalid payload length"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
        }
    }
}

/// A fixed-capacity serial payload produced by a mapping rule.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialPayload {
    bytes: [u8; MAX_PAYLOAD_LEN],
    len: u8,
}

impl SerialPayload {
    /// Copy up to [`MAX_PAYLOAD_LEN`] bytes into a payload.
    pub fn from_slice(data: &[u8]) -> Result<Self, EncodeError> {
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(EncodeError::InvalidLength);
        }
        let mut bytes = [0u8; MAX_PAYLOAD_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len() as u8,
        })
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encode `value` into a payload of exactly `length` bytes.
///
/// The encoded bytes start at offset 0; the remainder is zero padded, and
/// encodings longer than `length` are truncated.
///
/// `AsciiDigit` adds `'0'` to the low byte without any range check. Values
/// outside 0-9 produce whatever byte the wrapping addition yields; downstream
/// tools depend on that exact byte.
pub fn encode_value(value: i16, format: ValueFormat, length: u8) -> Result<SerialPayload, EncodeError> {
    if length == 0 || length as usize > MAX_PAYLOAD_LEN {
        return Err(EncodeError::InvalidLength);
    }

    let mut bytes = [0u8; MAX_PAYLOAD_LEN];
    match format {
        ValueFormat::Raw => bytes[0] = value as u8,
        ValueFormat::AsciiDigit => bytes[0] = b'0'.wrapping_add(value as u8),
        ValueFormat::BinaryLe => bytes[..2].copy_from_slice(&value.to_le_bytes()),
        ValueFormat::BinaryBe => bytes[..2].copy_from_slice(&value.to_be_bytes()),
    }

    Ok(SerialPayload { bytes, len: length })
}

/// Render `data` with the given line format into `out`.
///
/// Returns the number of bytes written. Nothing is written when `out` is too
/// small.
pub fn format_line(data: &[u8], format: LineFormat, out: &mut [u8]) -> Result<usize, EncodeError> {
    let needed = format.formatted_len(data.len());
    if out.len() < needed {
        return Err(EncodeError::BufferTooSmall);
    }

    match format {
        LineFormat::Raw | LineFormat::BinaryLsb => out[..data.len()].copy_from_slice(data),
        LineFormat::BinaryMsb => {
            out[..data.len()].copy_from_slice(data);
            if data.len() == 2 || data.len() == 4 {
                out[..data.len()].reverse();
            }
        }
        LineFormat::AsciiHex => {
            let mut pos = 0;
            for (i, &byte) in data.iter().enumerate() {
                if i > 0 {
                    out[pos] = b' ';
                    pos += 1;
                }
                pos += write_hex_u8(&mut out[pos..], byte);
            }
        }
        LineFormat::Hex => {
            out[0] = b'0';
            out[1] = b'x';
            let mut pos = 2;
            for &byte in data {
                pos += write_hex_u8(&mut out[pos..], byte);
            }
            out[pos] = b'\r';
            out[pos + 1] = b'\n';
        }
    }

    Ok(needed)
}

/// Write a u8 as 2 uppercase hex digits.
#[inline]
fn write_hex_u8(buf: &mut [u8], value: u8) -> usize {
    buf[0] = HEX_DIGITS[(value >> 4) as usize];
    buf[1] = HEX_DIGITS[(value & 0xF) as usize];
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_raw_truncates_to_low_byte() {
        let payload = encode_value(0x0104, ValueFormat::Raw, 1).unwrap();
        assert_eq!(payload.as_slice(), &[0x04]);
    }

    #[test]
    fn test_encode_pads_to_length() {
        let payload = encode_value(7, ValueFormat::Raw, 4).unwrap();
        assert_eq!(payload.as_slice(), &[7, 0, 0, 0]);
    }

    #[test]
    fn test_encode_ascii_digit_quirk() {
        let payload = encode_value(5, ValueFormat::AsciiDigit, 1).unwrap();
        assert_eq!(payload.as_slice(), b"5");

        // Not a digit, but the byte is kept as produced.
        let payload = encode_value(12, ValueFormat::AsciiDigit, 1).unwrap();
        assert_eq!(payload.as_slice(), &[b'0' + 12]);
    }

    #[test]
    fn test_encode_binary_byte_orders() {
        let le = encode_value(-2, ValueFormat::BinaryLe, 2).unwrap();
        assert_eq!(le.as_slice(), &[0xFE, 0xFF]);

        let be = encode_value(0x0102, ValueFormat::BinaryBe, 2).unwrap();
        assert_eq!(be.as_slice(), &[0x01, 0x02]);

        // Length 1 keeps only the first encoded byte.
        let be = encode_value(0x0102, ValueFormat::BinaryBe, 1).unwrap();
        assert_eq!(be.as_slice(), &[0x01]);
    }

    #[test]
    fn test_encode_rejects_bad_length() {
        assert_eq!(encode_value(1, ValueFormat::Raw, 0), Err(EncodeError::InvalidLength));
        assert_eq!(encode_value(1, ValueFormat::Raw, 9), Err(EncodeError::InvalidLength));
    }

    #[test]
    fn test_format_line_variants() {
        let mut out = [0u8; MAX_LINE_LEN];

        let len = format_line(&[0x04, 0x1F], LineFormat::Raw, &mut out).unwrap();
        assert_eq!(&out[..len], &[0x04, 0x1F]);

        let len = format_line(&[0x04, 0x1F], LineFormat::BinaryMsb, &mut out).unwrap();
        assert_eq!(&out[..len], &[0x1F, 0x04]);

        let len = format_line(&[1, 2, 3], LineFormat::BinaryMsb, &mut out).unwrap();
        assert_eq!(&out[..len], &[1, 2, 3]);

        let len = format_line(&[0x04, 0x1F], LineFormat::AsciiHex, &mut out).unwrap();
        assert_eq!(&out[..len], b"04 1F");

        let len = format_line(&[0xAB], LineFormat::Hex, &mut out).unwrap();
        assert_eq!(&out[..len], b"0xAB\r\n");
    }

    #[test]
    fn test_format_line_max_payload_fits() {
        let mut out = [0u8; MAX_LINE_LEN];
        let data = [0xFFu8; MAX_PAYLOAD_LEN];
        for format in [LineFormat::AsciiHex, LineFormat::Hex] {
            assert!(format_line(&data, format, &mut out).is_ok());
        }
    }

    #[test]
    fn test_format_line_buffer_too_small() {
        let mut out = [0u8; 3];
        assert_eq!(
            format_line(&[1, 2], LineFormat::AsciiHex, &mut out[..2]),
            Err(EncodeError::BufferTooSmall)
        );
        assert_eq!(out, [0, 0, 0]);
    }
}
