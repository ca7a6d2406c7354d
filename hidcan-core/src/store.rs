//! Persistence of the mapping table and sink configs.
//!
//! Each subsystem is one independent record (see [`hidcan_proto::record`]).
//! The physical medium is behind [`ConfigStore`]; a missing record means
//! "never saved" and yields the factory defaults.

use hidcan_proto::record::{open_record, RecordKind, RecordReader, RecordWriter};
use hidcan_proto::{EventKind, LineFormat, RecordError, ValueFormat};

use crate::mapping::{MappingRule, MappingTable, OutputTarget};
use crate::output::{CanConfig, CanMode, DataBits, Parity, SerialConfig, StopBits};

/// Layout version written by this crate.
pub const RECORD_VERSION: u8 = 1;

/// Largest record this crate writes (a full 64-rule mapping table is 969
/// bytes).
pub const MAX_RECORD_LEN: usize = 1024;

const TAG_SERIAL: u8 = 0;
const TAG_CAN: u8 = 1;

/// Error type for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The storage medium failed.
    Io,
    /// The stored bytes are not a valid record.
    Record(RecordError),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "storage I/O error"),
            Self::Record(e) => write!(f, "{}", e),
        }
    }
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

/// Key-value storage for config records, keyed by record kind.
pub trait ConfigStore {
    /// Copy the record stored under `kind` into `buf`.
    ///
    /// Returns `Ok(None)` when nothing was ever saved under `kind`.
    fn load(&mut self, kind: RecordKind, buf: &mut [u8]) -> Result<Option<usize>, StoreError>;

    /// Replace the record stored under `kind`.
    fn save(&mut self, kind: RecordKind, bytes: &[u8]) -> Result<(), StoreError>;
}

/// A store that holds nothing. Every load yields defaults and saves are
/// discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl ConfigStore for NullStore {
    fn load(&mut self, _kind: RecordKind, _buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        Ok(None)
    }

    fn save(&mut self, _kind: RecordKind, _bytes: &[u8]) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A value persisted as one record.
pub trait Persist: Sized {
    const KIND: RecordKind;

    fn write_payload(&self, w: &mut RecordWriter<'_>) -> Result<(), RecordError>;

    fn read_payload(r: &mut RecordReader<'_>) -> Result<Self, RecordError>;

    /// Value used when no record exists.
    fn factory_default() -> Self;
}

/// Encode `value` as a complete record into `buf`.
pub fn encode<T: Persist>(value: &T, buf: &mut [u8]) -> Result<usize, RecordError> {
    let mut writer = RecordWriter::new(buf, T::KIND, RECORD_VERSION)?;
    value.write_payload(&mut writer)?;
    Ok(writer.finish())
}

/// Verify and decode a record produced by [`encode`].
pub fn decode<T: Persist>(bytes: &[u8]) -> Result<T, RecordError> {
    let mut reader = open_record(bytes, T::KIND, RECORD_VERSION)?;
    let value = T::read_payload(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(RecordError::InvalidField);
    }
    Ok(value)
}

/// Load a value from `store`, or its factory default if it was never saved.
pub fn load<T: Persist, St: ConfigStore>(store: &mut St) -> Result<T, StoreError> {
    let mut buf = [0u8; MAX_RECORD_LEN];
    match store.load(T::KIND, &mut buf)? {
        Some(len) => {
            let bytes = buf.get(..len).ok_or(StoreError::Record(RecordError::Truncated))?;
            Ok(decode(bytes)?)
        }
        None => Ok(T::factory_default()),
    }
}

/// Save `value` to `store`.
pub fn save<T: Persist, St: ConfigStore>(store: &mut St, value: &T) -> Result<(), StoreError> {
    let mut buf = [0u8; MAX_RECORD_LEN];
    let len = encode(value, &mut buf)?;
    store.save(T::KIND, &buf[..len])
}

fn read_bool(r: &mut RecordReader<'_>) -> Result<bool, RecordError> {
    match r.u8()? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(RecordError::InvalidField),
    }
}

fn field<T>(value: Option<T>) -> Result<T, RecordError> {
    value.ok_or(RecordError::InvalidField)
}

impl<const M: usize> Persist for MappingTable<M> {
    const KIND: RecordKind = RecordKind::Mappings;

    fn write_payload(&self, w: &mut RecordWriter<'_>) -> Result<(), RecordError> {
        w.u8(self.count() as u8)?;
        for (slot, rule) in self.iter() {
            w.u8(slot as u8)?;
            w.u8(rule.device)?;
            w.u8(rule.kind.as_u8())?;
            w.u8(rule.input_id)?;
            w.i16_le(rule.min)?;
            w.i16_le(rule.max)?;
            match rule.output {
                OutputTarget::Serial { format, length } => {
                    w.u8(TAG_SERIAL)?;
                    w.u8(format.as_u8())?;
                    w.u8(length)?;
                }
                OutputTarget::Can { id, dlc, index } => {
                    w.u8(TAG_CAN)?;
                    w.u32_le(id)?;
                    w.u8(dlc)?;
                    w.u8(index)?;
                }
            }
        }
        Ok(())
    }

    fn read_payload(r: &mut RecordReader<'_>) -> Result<Self, RecordError> {
        let count = r.u8()? as usize;
        if count > M {
            return Err(RecordError::InvalidField);
        }

        let mut table = MappingTable::new();
        for _ in 0..count {
            let slot = r.u8()? as usize;
            let device = r.u8()?;
            let kind = field(EventKind::from_u8(r.u8()?))?;
            let input_id = r.u8()?;
            let min = r.i16_le()?;
            let max = r.i16_le()?;
            let output = match r.u8()? {
                TAG_SERIAL => OutputTarget::Serial {
                    format: field(ValueFormat::from_u8(r.u8()?))?,
                    length: r.u8()?,
                },
                TAG_CAN => OutputTarget::Can {
                    id: r.u32_le()?,
                    dlc: r.u8()?,
                    index: r.u8()?,
                },
                _ => return Err(RecordError::InvalidField),
            };

            let rule = MappingRule {
                device,
                kind,
                input_id,
                min,
                max,
                output,
            };
            table.set(slot, rule).map_err(|_| RecordError::InvalidField)?;
        }
        Ok(table)
    }

    fn factory_default() -> Self {
        MappingTable::with_defaults()
    }
}

impl Persist for SerialConfig {
    const KIND: RecordKind = RecordKind::SerialConfig;

    fn write_payload(&self, w: &mut RecordWriter<'_>) -> Result<(), RecordError> {
        w.u8(self.enabled as u8)?;
        w.u32_le(self.baud_rate)?;
        w.u8(self.data_bits.as_u8())?;
        w.u8(self.stop_bits.as_u8())?;
        w.u8(self.parity.as_u8())?;
        w.u8(self.line_format.as_u8())
    }

    fn read_payload(r: &mut RecordReader<'_>) -> Result<Self, RecordError> {
        Ok(Self {
            enabled: read_bool(r)?,
            baud_rate: r.u32_le()?,
            data_bits: field(DataBits::from_u8(r.u8()?))?,
            stop_bits: field(StopBits::from_u8(r.u8()?))?,
            parity: field(Parity::from_u8(r.u8()?))?,
            line_format: field(LineFormat::from_u8(r.u8()?))?,
        })
    }

    fn factory_default() -> Self {
        Self::default()
    }
}

impl Persist for CanConfig {
    const KIND: RecordKind = RecordKind::CanConfig;

    fn write_payload(&self, w: &mut RecordWriter<'_>) -> Result<(), RecordError> {
        w.u8(self.enabled as u8)?;
        w.u32_le(self.bitrate)?;
        w.u8(self.mode.as_u8())?;
        w.u8(self.sjw)?;
        w.u8(self.bs1)?;
        w.u8(self.bs2)
    }

    fn read_payload(r: &mut RecordReader<'_>) -> Result<Self, RecordError> {
        Ok(Self {
            enabled: read_bool(r)?,
            bitrate: r.u32_le()?,
            mode: field(CanMode::from_u8(r.u8()?))?,
            sjw: r.u8()?,
            bs1: r.u8()?,
            bs2: r.u8()?,
        })
    }

    fn factory_default() -> Self {
        Self::default()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MemoryStore;
    use super::*;
    use crate::mapping::MAX_MAPPINGS;

    #[test]
    fn test_absent_records_yield_defaults() {
        let mut store = NullStore;
        let table: MappingTable = load(&mut store).unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(load::<SerialConfig, _>(&mut store).unwrap(), SerialConfig::default());
        assert_eq!(load::<CanConfig, _>(&mut store).unwrap(), CanConfig::default());
    }

    #[test]
    fn test_mapping_table_survives_store() {
        let mut table: MappingTable = MappingTable::new();
        table
            .set(5, MappingRule::serial(2, EventKind::ButtonPress, 3, 1, 1, ValueFormat::BinaryBe, 4))
            .unwrap();
        table
            .set(40, MappingRule::can(1, EventKind::AxisChange, 2, -500, 500, 0x1ABCDEF, 6, 5))
            .unwrap();

        let mut store = MemoryStore::default();
        save(&mut store, &table).unwrap();
        let loaded: MappingTable = load(&mut store).unwrap();

        assert_eq!(loaded.count(), 2);
        assert_eq!(loaded.get(5), table.get(5));
        assert_eq!(loaded.get(40), table.get(40));
        assert!(loaded.get(0).is_none());
    }

    #[test]
    fn test_full_table_fits_record() {
        let mut table: MappingTable = MappingTable::new();
        for _ in 0..MAX_MAPPINGS {
            table
                .add(MappingRule::can(0, EventKind::AxisChange, 0, 0, 1, 0x100, 8, 0))
                .unwrap();
        }
        let mut buf = [0u8; MAX_RECORD_LEN];
        assert_eq!(encode(&table, &mut buf), Ok(969));
    }

    #[test]
    fn test_configs_survive_store() {
        let serial = SerialConfig {
            enabled: false,
            baud_rate: 9_600,
            data_bits: DataBits::Nine,
            stop_bits: StopBits::Two,
            parity: Parity::Even,
            line_format: LineFormat::AsciiHex,
        };
        let can = CanConfig {
            bitrate: 250_000,
            mode: CanMode::Loopback,
            ..CanConfig::default()
        };

        let mut store = MemoryStore::default();
        save(&mut store, &serial).unwrap();
        save(&mut store, &can).unwrap();
        assert_eq!(load::<SerialConfig, _>(&mut store).unwrap(), serial);
        assert_eq!(load::<CanConfig, _>(&mut store).unwrap(), can);
    }

    #[test]
    fn test_corrupt_record_reported() {
        let mut store = MemoryStore::default();
        save(&mut store, &CanConfig::default()).unwrap();
        if let Some(bytes) = store.records.get_mut(&RecordKind::CanConfig.as_u8()) {
            bytes[7] ^= 0xFF;
        }
        assert_eq!(
            load::<CanConfig, _>(&mut store),
            Err(StoreError::Record(RecordError::Checksum))
        );
    }

    #[test]
    fn test_invalid_enum_field_rejected() {
        let mut buf = [0u8; 32];
        let mut writer = RecordWriter::new(&mut buf, RecordKind::SerialConfig, RECORD_VERSION).unwrap();
        for b in [1, 0x00, 0xC2, 0x01, 0x00, 8, 1, 7, 0] {
            writer.u8(b).unwrap();
        }
        let len = writer.finish();
        assert_eq!(decode::<SerialConfig>(&buf[..len]), Err(RecordError::InvalidField));
    }

    #[test]
    fn test_store_failure_propagates() {
        let mut store = MemoryStore {
            fail: true,
            ..MemoryStore::default()
        };
        assert_eq!(load::<SerialConfig, _>(&mut store), Err(StoreError::Io));
    }
}
