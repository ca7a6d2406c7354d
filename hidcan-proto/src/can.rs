//! CAN identifiers, frames and value placement.

/// Largest identifier carried in a standard (11-bit) frame.
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest identifier carried in an extended (29-bit) frame.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum classic CAN payload length.
pub const MAX_DLC: u8 = 8;

/// Error type for frame construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Identifier does not fit in 29 bits.
    InvalidId,
    /// DLC above [`MAX_DLC`].
    InvalidDlc,
    /// Value placement starts at or past the DLC.
    IndexOutOfRange,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidId => write!(f, "CAN id out of range"),
            Self::InvalidDlc => write!(f, "DLC out of range"),
            Self::IndexOutOfRange => write!(f, "data index outside DLC"),
        }
    }
}

/// A CAN identifier with its frame format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    Standard(u16),
    Extended(u32),
}

impl CanId {
    /// Classify a raw identifier: anything up to `0x7FF` is sent as a
    /// standard frame, larger values as extended frames.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw <= MAX_STANDARD_ID {
            Some(Self::Standard(raw as u16))
        } else if raw <= MAX_EXTENDED_ID {
            Some(Self::Extended(raw))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Standard(id) => id as u32,
            Self::Extended(id) => id,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_extended(self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

/// A classic CAN data frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    id: CanId,
    dlc: u8,
    data: [u8; MAX_DLC as usize],
}

impl CanFrame {
    /// Build a frame from a raw identifier and up to 8 payload bytes.
    pub fn new(raw_id: u32, data: &[u8]) -> Result<Self, FrameError> {
        let id = CanId::from_raw(raw_id).ok_or(FrameError::InvalidId)?;
        if data.len() > MAX_DLC as usize {
            return Err(FrameError::InvalidDlc);
        }
        let mut bytes = [0u8; MAX_DLC as usize];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            id,
            dlc: data.len() as u8,
            data: bytes,
        })
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> CanId {
        self.id
    }

    #[inline]
    #[must_use]
    pub const fn dlc(&self) -> u8 {
        self.dlc
    }

    /// The first `dlc` payload bytes.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

/// Place `value` into a zeroed 8-byte buffer at `index`.
///
/// Writes a little-endian 16-bit value when both bytes fit inside `dlc`,
/// otherwise only the low byte at `index`. `index >= dlc` is rejected.
pub fn place_value(value: i16, dlc: u8, index: u8) -> Result<[u8; MAX_DLC as usize], FrameError> {
    if dlc > MAX_DLC {
        return Err(FrameError::InvalidDlc);
    }
    if index >= dlc {
        return Err(FrameError::IndexOutOfRange);
    }

    let mut data = [0u8; MAX_DLC as usize];
    let i = index as usize;
    if index + 1 < dlc {
        data[i..i + 2].copy_from_slice(&value.to_le_bytes());
    } else {
        data[i] = value as u8;
    }
    Ok(data)
}

/// Build the frame a CAN mapping rule emits for `value`.
pub fn value_frame(raw_id: u32, dlc: u8, index: u8, value: i16) -> Result<CanFrame, FrameError> {
    let data = place_value(value, dlc, index)?;
    CanFrame::new(raw_id, &data[..dlc as usize])
}
