//! Device registry: which HID device sits in which slot.

use core::fmt::Write;

use heapless::String;
use hidcan_proto::DeviceType;

/// Number of device slots.
pub const MAX_DEVICES: usize = 8;

/// Largest report kept per device; longer reports are truncated.
pub const REPORT_BUFFER_SIZE: usize = 64;

/// Device name capacity in bytes.
pub const DEVICE_NAME_LEN: usize = 32;

/// Error type for registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// Index outside `0..MAX_DEVICES`.
    InvalidIndex,
    /// The slot already holds a connected device.
    SlotInUse,
    /// No device is connected at this index.
    NotFound,
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidIndex => write!(f, "device index out of range"),
            Self::SlotInUse => write!(f, "device slot already in use"),
            Self::NotFound => write!(f, "no device at index"),
        }
    }
}

/// What the USB host layer knows about a newly attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor<'a> {
    pub device_type: DeviceType,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Product string; a default name is generated when absent.
    pub name: Option<&'a str>,
}

impl DeviceDescriptor<'_> {
    #[must_use]
    pub const fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            vendor_id: 0,
            product_id: 0,
            name: None,
        }
    }
}

/// One registry slot.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    index: u8,
    device_type: DeviceType,
    vendor_id: u16,
    product_id: u16,
    name: String<DEVICE_NAME_LEN>,
    connected: bool,
    report: [u8; REPORT_BUFFER_SIZE],
    report_len: u8,
}

impl DeviceInfo {
    fn empty(index: u8) -> Self {
        Self {
            index,
            device_type: DeviceType::Unknown,
            vendor_id: 0,
            product_id: 0,
            name: String::new(),
            connected: false,
            report: [0; REPORT_BUFFER_SIZE],
            report_len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> u8 {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    #[inline]
    #[must_use]
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    #[inline]
    #[must_use]
    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Most recent report, as stored (possibly truncated).
    #[inline]
    #[must_use]
    pub fn last_report(&self) -> &[u8] {
        &self.report[..self.report_len as usize]
    }

    fn set_name(&mut self, name: Option<&str>) {
        self.name.clear();
        match name {
            Some(name) => {
                for c in name.chars() {
                    if self.name.push(c).is_err() {
                        break;
                    }
                }
            }
            None => {
                // Longest default ("HID Device 7") fits the buffer.
                let _ = write!(self.name, "{} {}", self.device_type.label(), self.index);
            }
        }
    }
}

/// Fixed table of device slots, indexed by the USB host's device index.
///
/// A connected slot is never reassigned; it must be disconnected first.
pub struct DeviceRegistry {
    slots: [DeviceInfo; MAX_DEVICES],
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| DeviceInfo::empty(i as u8)),
        }
    }

    /// Register a device of the given type at `index`.
    pub fn connect(&mut self, index: u8, device_type: DeviceType) -> Result<&DeviceInfo, RegistryError> {
        self.connect_with(index, DeviceDescriptor::new(device_type))
    }

    /// Register a device with full descriptor information at `index`.
    pub fn connect_with(&mut self, index: u8, descriptor: DeviceDescriptor<'_>) -> Result<&DeviceInfo, RegistryError> {
        let slot = self.slots.get_mut(index as usize).ok_or(RegistryError::InvalidIndex)?;
        if slot.connected {
            return Err(RegistryError::SlotInUse);
        }

        *slot = DeviceInfo::empty(index);
        slot.device_type = descriptor.device_type;
        slot.vendor_id = descriptor.vendor_id;
        slot.product_id = descriptor.product_id;
        slot.connected = true;
        slot.set_name(descriptor.name);
        Ok(slot)
    }

    /// Clear the slot at `index`, returning the type the device had.
    pub fn disconnect(&mut self, index: u8) -> Result<DeviceType, RegistryError> {
        let slot = self.slots.get_mut(index as usize).ok_or(RegistryError::InvalidIndex)?;
        if !slot.connected {
            return Err(RegistryError::NotFound);
        }
        let device_type = slot.device_type;
        *slot = DeviceInfo::empty(index);
        Ok(device_type)
    }

    /// Keep `report` as the latest report of the device at `index`.
    ///
    /// Reports longer than [`REPORT_BUFFER_SIZE`] are truncated.
    pub fn store_report(&mut self, index: u8, report: &[u8]) -> Result<&DeviceInfo, RegistryError> {
        let slot = self.slots.get_mut(index as usize).ok_or(RegistryError::InvalidIndex)?;
        if !slot.connected {
            return Err(RegistryError::NotFound);
        }
        let len = report.len().min(REPORT_BUFFER_SIZE);
        slot.report[..len].copy_from_slice(&report[..len]);
        slot.report_len = len as u8;
        Ok(slot)
    }

    /// Look up a connected device.
    pub fn info(&self, index: u8) -> Result<&DeviceInfo, RegistryError> {
        let slot = self.slots.get(index as usize).ok_or(RegistryError::InvalidIndex)?;
        if slot.connected {
            Ok(slot)
        } else {
            Err(RegistryError::NotFound)
        }
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|s| s.connected).count()
    }

    /// Connected devices in index order.
    pub fn iter_connected(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.slots.iter().filter(|s| s.connected)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_assigns_default_name() {
        let mut registry = DeviceRegistry::new();
        let info = registry.connect(2, DeviceType::Gamepad).unwrap();
        assert_eq!(info.name(), "Gamepad 2");
        assert_eq!(info.index(), 2);
        assert!(info.is_connected());
        assert_eq!(registry.connected_count(), 1);
    }

    #[test]
    fn test_connected_slot_not_reassigned() {
        let mut registry = DeviceRegistry::new();
        registry.connect(0, DeviceType::Keyboard).unwrap();
        assert_eq!(
            registry.connect(0, DeviceType::Mouse).err(),
            Some(RegistryError::SlotInUse)
        );
        assert_eq!(registry.info(0).unwrap().device_type(), DeviceType::Keyboard);
    }

    #[test]
    fn test_invalid_index_and_not_found() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.connect(MAX_DEVICES as u8, DeviceType::Mouse).err(),
            Some(RegistryError::InvalidIndex)
        );
        assert_eq!(registry.info(3).err(), Some(RegistryError::NotFound));
        assert_eq!(registry.disconnect(3), Err(RegistryError::NotFound));
        assert_eq!(
            registry.store_report(3, &[1]).err(),
            Some(RegistryError::NotFound)
        );
    }

    #[test]
    fn test_disconnect_clears_slot() {
        let mut registry = DeviceRegistry::new();
        registry.connect(1, DeviceType::Mouse).unwrap();
        registry.store_report(1, &[1, 2, 3]).unwrap();
        assert_eq!(registry.disconnect(1), Ok(DeviceType::Mouse));
        assert_eq!(registry.info(1).err(), Some(RegistryError::NotFound));

        let info = registry.connect(1, DeviceType::Joystick).unwrap();
        assert!(info.last_report().is_empty());
    }

    #[test]
    fn test_long_report_truncated() {
        let mut registry = DeviceRegistry::new();
        registry.connect(0, DeviceType::Custom).unwrap();
        let report = [0xAAu8; REPORT_BUFFER_SIZE + 10];
        let info = registry.store_report(0, &report).unwrap();
        assert_eq!(info.last_report().len(), REPORT_BUFFER_SIZE);
    }

    #[test]
    fn test_long_name_truncated() {
        let mut registry = DeviceRegistry::new();
        let name = "An Extremely Long Product Name From The Descriptor";
        let info = registry
            .connect_with(
                4,
                DeviceDescriptor {
                    device_type: DeviceType::Keyboard,
                    vendor_id: 0x046D,
                    product_id: 0xC31C,
                    name: Some(name),
                },
            )
            .unwrap();
        assert_eq!(info.name().len(), DEVICE_NAME_LEN);
        assert!(name.starts_with(info.name()));
        assert_eq!(info.vendor_id(), 0x046D);
    }

    #[test]
    fn test_iter_connected_in_index_order() {
        let mut registry = DeviceRegistry::new();
        registry.connect(5, DeviceType::Mouse).unwrap();
        registry.connect(1, DeviceType::Keyboard).unwrap();
        let mut iter = registry.iter_connected();
        assert_eq!(iter.next().map(|d| d.index()), Some(1));
        assert_eq!(iter.next().map(|d| d.index()), Some(5));
        assert!(iter.next().is_none());
    }
}
