//! CRC-16 checksum for persisted config records.
//!
//! Uses CRC-16/IBM-3740 (CCITT-FALSE) with a 256-entry lookup table.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC-16/IBM-3740 calculator with lookup table.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Calculate the CRC-16 checksum of a byte slice.
#[inline]
#[must_use]
pub fn calculate_crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// CRC-16 digest for incremental calculation.
///
/// Used while a record is written field by field.
pub struct Crc16Digest {
    digest: crc::Digest<'static, u16>,
}

impl Crc16Digest {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            digest: CRC16.digest(),
        }
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    #[inline]
    #[must_use]
    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

impl Default for Crc16Digest {
    fn default() -> Self {
        Self::new()
    }
}
