//! Input event types, output encodings and config records for the HID to
//! Serial/CAN bridge.
//!
//! This crate holds everything that has a fixed byte-level shape:
//!
//! - **Types**: [`DeviceType`], [`EventKind`], [`InputEvent`]
//! - **Serial**: value encodings ([`ValueFormat`], [`encode_value`]) and
//!   sink line formats ([`LineFormat`], [`format_line`])
//! - **CAN**: identifier classification ([`CanId`]), frames ([`CanFrame`]) and
//!   value placement ([`place_value`])
//! - **Records**: versioned, CRC-16 protected config records
//!   ([`RecordWriter`], [`open_record`])
//!
//! # Example
//!
//! ```
//! use hidcan_proto::{value_frame, CanId};
//!
//! // A mouse X delta of -3 placed at byte 0 of an 8-byte frame
//! let frame = value_frame(0x100, 8, 0, -3).unwrap();
//! assert_eq!(frame.id(), CanId::Standard(0x100));
//! assert_eq!(&frame.data()[..2], &[0xFD, 0xFF]);
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod can;
pub mod crc;
pub mod record;
pub mod serial;
pub mod types;

pub use can::{place_value, value_frame, CanFrame, CanId, FrameError, MAX_DLC, MAX_EXTENDED_ID, MAX_STANDARD_ID};
pub use crc::{calculate_crc16, Crc16Digest};
pub use record::{open_record, RecordError, RecordKind, RecordReader, RecordWriter};
pub use serial::{
    encode_value, format_line, EncodeError, LineFormat, SerialPayload, ValueFormat, MAX_LINE_LEN,
    MAX_PAYLOAD_LEN,
};
pub use types::{DeviceType, EventKind, InputEvent};
