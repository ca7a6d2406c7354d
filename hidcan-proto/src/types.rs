//! Core input types: DeviceType, EventKind, InputEvent.

/// Kind of HID device attached to a registry slot.
///
/// The USB host layer classifies devices from their report descriptor; the
/// bridge only relies on the tag to pick a report layout.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceType {
    #[default]
    Unknown = 0,
    Keyboard = 1,
    Mouse = 2,
    Gamepad = 3,
    Joystick = 4,
    Custom = 5,
}

impl DeviceType {
    /// Decode a device type from its wire value.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Unknown),
            1 => Some(Self::Keyboard),
            2 => Some(Self::Mouse),
            3 => Some(Self::Gamepad),
            4 => Some(Self::Joystick),
            5 => Some(Self::Custom),
            _ => None,
        }
    }

    /// Wire value of this device type.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Smallest report the normalizer accepts for this device type.
    ///
    /// - Keyboard: boot report (modifiers, reserved, 6 key slots)
    /// - Mouse: buttons + X + Y (wheel optional)
    /// - Everything else: at least the leading byte
    #[must_use]
    pub const fn min_report_len(self) -> usize {
        match self {
            Self::Keyboard => 8,
            Self::Mouse => 3,
            Self::Gamepad | Self::Joystick | Self::Custom | Self::Unknown => 1,
        }
    }

    /// Human readable label used for default device names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Keyboard => "Keyboard",
            Self::Mouse => "Mouse",
            Self::Gamepad => "Gamepad",
            Self::Joystick => "Joystick",
            Self::Custom | Self::Unknown => "HID Device",
        }
    }
}

/// What happened to an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventKind {
    ButtonPress = 1,
    ButtonRelease = 2,
    AxisChange = 3,
    KeyPress = 4,
    KeyRelease = 5,
}

impl EventKind {
    /// Decode an event kind from its wire value.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::ButtonPress),
            2 => Some(Self::ButtonRelease),
            3 => Some(Self::AxisChange),
            4 => Some(Self::KeyPress),
            5 => Some(Self::KeyRelease),
            _ => None,
        }
    }

    /// Wire value of this event kind.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A single normalized input change.
///
/// `input_id` shares one namespace per device: key code (or modifier bit
/// index) for keyboards, button index for button events, axis index for axis
/// events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputEvent {
    pub kind: EventKind,
    pub device: u8,
    pub input_id: u8,
    /// 1 for presses, 0 for releases, delta or absolute value for axes.
    pub value: i16,
    /// Monotonic milliseconds at which the report was normalized.
    pub timestamp_ms: u32,
}

impl InputEvent {
    #[must_use]
    pub const fn new(kind: EventKind, device: u8, input_id: u8, value: i16, timestamp_ms: u32) -> Self {
        Self {
            kind,
            device,
            input_id,
            value,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_wire_values() {
        for raw in 0..=5u8 {
            let ty = DeviceType::from_u8(raw).unwrap();
            assert_eq!(ty.as_u8(), raw);
        }
        assert_eq!(DeviceType::from_u8(6), None);
    }

    #[test]
    fn test_event_kind_rejects_none() {
        assert_eq!(EventKind::from_u8(0), None);
        assert_eq!(EventKind::from_u8(4), Some(EventKind::KeyPress));
    }

    #[test]
    fn test_min_report_len() {
        assert_eq!(DeviceType::Keyboard.min_report_len(), 8);
        assert_eq!(DeviceType::Mouse.min_report_len(), 3);
        assert_eq!(DeviceType::Joystick.min_report_len(), 1);
    }
}
