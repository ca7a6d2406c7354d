//! Mapping engine: rules that turn input events into output actions.
//!
//! Rules live in fixed slots. Adding takes the first free slot and removing
//! frees a slot without moving the others, so a slot index identifies a rule
//! for as long as it exists. Evaluation walks the slots in ascending order and
//! every matching rule fires.

use hidcan_proto::{encode_value, value_frame, CanFrame, EventKind, InputEvent, SerialPayload, ValueFormat};
use hidcan_proto::{MAX_DLC, MAX_EXTENDED_ID, MAX_PAYLOAD_LEN};

/// Default mapping table capacity.
pub const MAX_MAPPINGS: usize = 64;

/// Error type for mapping table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MappingError {
    /// Every slot holds a rule.
    TableFull,
    /// The rule's output descriptor is out of range.
    InvalidRule,
    /// Slot index outside the table.
    InvalidSlot,
    /// The slot holds no rule.
    EmptySlot,
}

impl core::fmt::Display for MappingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TableFull => write!(f, "mapping table full"),
            Self::InvalidRule => write!(f, "invalid mapping rule"),
            Self::InvalidSlot => write!(f, "mapping slot out of range"),
            Self::EmptySlot => write!(f, "mapping slot empty"),
        }
    }
}

/// Where a matching rule sends the event value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputTarget {
    /// `length` bytes on the serial sink.
    Serial { format: ValueFormat, length: u8 },
    /// One frame of `dlc` bytes with the value at `index`.
    Can { id: u32, dlc: u8, index: u8 },
}

/// One routing rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MappingRule {
    pub device: u8,
    pub kind: EventKind,
    pub input_id: u8,
    /// Inclusive lower bound on the event value.
    pub min: i16,
    /// Inclusive upper bound on the event value.
    pub max: i16,
    pub output: OutputTarget,
}

impl MappingRule {
    #[must_use]
    pub const fn serial(
        device: u8,
        kind: EventKind,
        input_id: u8,
        min: i16,
        max: i16,
        format: ValueFormat,
        length: u8,
    ) -> Self {
        Self {
            device,
            kind,
            input_id,
            min,
            max,
            output: OutputTarget::Serial { format, length },
        }
    }

    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub const fn can(device: u8, kind: EventKind, input_id: u8, min: i16, max: i16, id: u32, dlc: u8, index: u8) -> Self {
        Self {
            device,
            kind,
            input_id,
            min,
            max,
            output: OutputTarget::Can { id, dlc, index },
        }
    }

    /// Whether this rule fires for `event`.
    #[must_use]
    pub fn matches(&self, event: &InputEvent) -> bool {
        self.device == event.device
            && self.kind == event.kind
            && self.input_id == event.input_id
            && (self.min..=self.max).contains(&event.value)
    }

    /// Check the output descriptor.
    ///
    /// A CAN `index` past `dlc` is accepted here; such a rule never produces a
    /// frame.
    pub fn validate(&self) -> Result<(), MappingError> {
        let ok = match self.output {
            OutputTarget::Serial { length, .. } => (1..=MAX_PAYLOAD_LEN as u8).contains(&length),
            OutputTarget::Can { id, dlc, .. } => id <= MAX_EXTENDED_ID && dlc <= MAX_DLC,
        };
        if ok {
            Ok(())
        } else {
            Err(MappingError::InvalidRule)
        }
    }
}

/// Rules installed by [`MappingTable::reset_defaults`].
pub const DEFAULT_RULES: [MappingRule; 2] = [
    // Keyboard 'A' press to a single raw serial byte
    MappingRule::serial(0, EventKind::KeyPress, 0x04, 0, 1, ValueFormat::Raw, 1),
    // Mouse X to CAN 0x100, bytes 0-1
    MappingRule::can(1, EventKind::AxisChange, 0, -127, 127, 0x100, 8, 0),
];

/// What a fired rule produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActionKind {
    Serial(SerialPayload),
    Can(CanFrame),
}

/// Output of one fired rule, ready for the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputAction {
    pub slot: u8,
    pub value: i16,
    pub kind: ActionKind,
}

/// Counters for rule evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispatchStats {
    /// Rules whose criteria matched.
    pub matched: u32,
    /// Actions handed on.
    pub fired: u32,
    /// Matching rules that could not build an action.
    pub rejected: u32,
}

impl DispatchStats {
    pub fn accumulate(&mut self, other: DispatchStats) {
        self.matched = self.matched.wrapping_add(other.matched);
        self.fired = self.fired.wrapping_add(other.fired);
        self.rejected = self.rejected.wrapping_add(other.rejected);
    }
}

/// Fixed-slot rule table.
pub struct MappingTable<const M: usize = MAX_MAPPINGS> {
    slots: [Option<MappingRule>; M],
}

impl<const M: usize> MappingTable<M> {
    /// An empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: [None; M] }
    }

    /// A table holding [`DEFAULT_RULES`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.reset_defaults();
        table
    }

    /// Store `rule` in the first free slot and return that slot.
    pub fn add(&mut self, rule: MappingRule) -> Result<usize, MappingError> {
        rule.validate()?;
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(MappingError::TableFull)?;
        self.slots[slot] = Some(rule);
        Ok(slot)
    }

    /// Store `rule` at `slot`, replacing whatever was there.
    pub fn set(&mut self, slot: usize, rule: MappingRule) -> Result<(), MappingError> {
        rule.validate()?;
        let entry = self.slots.get_mut(slot).ok_or(MappingError::InvalidSlot)?;
        *entry = Some(rule);
        Ok(())
    }

    /// Free `slot` and return the rule it held.
    pub fn remove(&mut self, slot: usize) -> Result<MappingRule, MappingError> {
        self.slots
            .get_mut(slot)
            .ok_or(MappingError::InvalidSlot)?
            .take()
            .ok_or(MappingError::EmptySlot)
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&MappingRule> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        M
    }

    /// Occupied slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MappingRule)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, rule)| rule.as_ref().map(|r| (slot, r)))
    }

    pub fn clear(&mut self) {
        self.slots = [None; M];
    }

    /// Replace the table contents with [`DEFAULT_RULES`].
    pub fn reset_defaults(&mut self) {
        self.clear();
        for (slot, rule) in DEFAULT_RULES.iter().enumerate().take(M) {
            self.slots[slot] = Some(*rule);
        }
    }

    /// Run `event` through every rule, handing each produced action to
    /// `dispatch` in slot order.
    pub fn evaluate<F>(&self, event: &InputEvent, mut dispatch: F) -> DispatchStats
    where
        F: FnMut(OutputAction),
    {
        let mut stats = DispatchStats::default();

        for (slot, rule) in self.iter() {
            if !rule.matches(event) {
                continue;
            }
            stats.matched += 1;

            let kind = match rule.output {
                OutputTarget::Serial { format, length } => {
                    encode_value(event.value, format, length).map(ActionKind::Serial).ok()
                }
                OutputTarget::Can { id, dlc, index } => match value_frame(id, dlc, index, event.value) {
                    Ok(frame) => Some(ActionKind::Can(frame)),
                    Err(e) => {
                        debug!("mapping slot {}: no frame ({:?})", slot, e);
                        None
                    }
                },
            };

            match kind {
                Some(kind) => {
                    stats.fired += 1;
                    dispatch(OutputAction {
                        slot: slot as u8,
                        value: event.value,
                        kind,
                    });
                }
                None => stats.rejected += 1,
            }
        }

        stats
    }
}

impl<const M: usize> Default for MappingTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;
    use hidcan_proto::CanId;

    fn key(device: u8, id: u8, value: i16) -> InputEvent {
        InputEvent::new(EventKind::KeyPress, device, id, value, 0)
    }

    fn collect<const M: usize>(table: &MappingTable<M>, event: &InputEvent) -> (Vec<OutputAction>, DispatchStats) {
        let mut actions = Vec::new();
        let stats = table.evaluate(event, |a| actions.push(a));
        (actions, stats)
    }

    #[test]
    fn test_add_takes_first_free_slot() {
        let mut table: MappingTable = MappingTable::new();
        let rule = MappingRule::serial(0, EventKind::KeyPress, 4, 0, 1, ValueFormat::Raw, 1);
        assert_eq!(table.add(rule), Ok(0));
        assert_eq!(table.add(rule), Ok(1));
        assert_eq!(table.add(rule), Ok(2));
        assert_eq!(table.remove(1), Ok(rule));
        assert_eq!(table.count(), 2);
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
        assert_eq!(table.add(rule), Ok(1));
    }

    #[test]
    fn test_table_full() {
        let mut table: MappingTable<2> = MappingTable::new();
        let rule = MappingRule::serial(0, EventKind::KeyPress, 4, 0, 1, ValueFormat::Raw, 1);
        table.add(rule).unwrap();
        table.add(rule).unwrap();
        assert_eq!(table.add(rule), Err(MappingError::TableFull));
    }

    #[test]
    fn test_remove_errors() {
        let mut table: MappingTable<4> = MappingTable::new();
        assert_eq!(table.remove(0), Err(MappingError::EmptySlot));
        assert_eq!(table.remove(4), Err(MappingError::InvalidSlot));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let mut table: MappingTable = MappingTable::new();
        let bad_len = MappingRule::serial(0, EventKind::KeyPress, 4, 0, 1, ValueFormat::Raw, 9);
        let bad_dlc = MappingRule::can(0, EventKind::AxisChange, 0, 0, 1, 0x100, 9, 0);
        let bad_id = MappingRule::can(0, EventKind::AxisChange, 0, 0, 1, 0x2000_0000, 8, 0);
        for rule in [bad_len, bad_dlc, bad_id] {
            assert_eq!(table.add(rule), Err(MappingError::InvalidRule));
        }
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_fan_out_in_slot_order() {
        let mut table: MappingTable = MappingTable::new();
        table
            .add(MappingRule::serial(0, EventKind::KeyPress, 4, 0, 1, ValueFormat::Raw, 1))
            .unwrap();
        table
            .add(MappingRule::can(0, EventKind::KeyPress, 4, 0, 1, 0x123, 2, 0))
            .unwrap();

        let (actions, stats) = collect(&table, &key(0, 4, 1));
        assert_eq!(stats.fired, 2);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].slot, 0);
        match actions[0].kind {
            ActionKind::Serial(p) => assert_eq!(p.as_slice(), &[1]),
            ActionKind::Can(_) => panic!("expected serial action first"),
        }
        match actions[1].kind {
            ActionKind::Can(frame) => {
                assert_eq!(frame.id(), CanId::Standard(0x123));
                assert_eq!(frame.data(), &[1, 0]);
            }
            ActionKind::Serial(_) => panic!("expected CAN action second"),
        }
    }

    #[test]
    fn test_range_is_inclusive_and_exclusive_outside() {
        let mut table: MappingTable = MappingTable::new();
        table
            .add(MappingRule::serial(0, EventKind::AxisChange, 0, -10, 10, ValueFormat::Raw, 1))
            .unwrap();
        let axis = |v| InputEvent::new(EventKind::AxisChange, 0, 0, v, 0);

        assert_eq!(collect(&table, &axis(-10)).0.len(), 1);
        assert_eq!(collect(&table, &axis(10)).0.len(), 1);
        assert!(collect(&table, &axis(11)).0.is_empty());
        assert!(collect(&table, &axis(-11)).0.is_empty());
    }

    #[test]
    fn test_criteria_must_all_match() {
        let table: MappingTable = MappingTable::with_defaults();
        assert!(collect(&table, &key(1, 4, 1)).0.is_empty());
        assert!(collect(&table, &key(0, 5, 1)).0.is_empty());
        let release = InputEvent::new(EventKind::KeyRelease, 0, 4, 0, 0);
        assert!(collect(&table, &release).0.is_empty());
    }

    #[test]
    fn test_can_index_past_dlc_rejected_at_dispatch() {
        let mut table: MappingTable = MappingTable::new();
        table
            .add(MappingRule::can(0, EventKind::KeyPress, 4, 0, 1, 0x200, 4, 4))
            .unwrap();
        let (actions, stats) = collect(&table, &key(0, 4, 1));
        assert!(actions.is_empty());
        assert_eq!(stats, DispatchStats { matched: 1, fired: 0, rejected: 1 });
    }

    #[test]
    fn test_defaults() {
        let mut table: MappingTable = MappingTable::new();
        table.add(MappingRule::serial(3, EventKind::KeyPress, 9, 0, 1, ValueFormat::Raw, 1)).unwrap();
        table.reset_defaults();
        assert_eq!(table.count(), 2);
        assert_eq!(table.get(0), Some(&DEFAULT_RULES[0]));

        let mouse_x = InputEvent::new(EventKind::AxisChange, 1, 0, -3, 0);
        let (actions, _) = collect(&table, &mouse_x);
        match actions[0].kind {
            ActionKind::Can(frame) => {
                assert_eq!(frame.dlc(), 8);
                assert_eq!(&frame.data()[..2], &[0xFD, 0xFF]);
            }
            ActionKind::Serial(_) => panic!("expected CAN action"),
        }
    }
}
