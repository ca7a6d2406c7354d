//! Report normalization.
//!
//! HID reports are snapshots; the rest of the pipeline wants edges. The
//! [`Normalizer`] keeps the previous snapshot per device and emits an
//! [`InputEvent`] for every difference:
//!
//! | Device | Report layout | Events |
//! |--------|---------------|--------|
//! | Keyboard | modifiers, reserved, 6 key slots | `KeyPress`/`KeyRelease` |
//! | Mouse | buttons, dx, dy, \[wheel\] | `ButtonPress`/`ButtonRelease`, `AxisChange` 0-2 |
//! | Gamepad, Joystick | buttons, axes... | `ButtonPress`/`ButtonRelease`, `AxisChange` per axis |
//! | Custom, Unknown | opaque bytes | `AxisChange` per changed offset |

use hidcan_proto::{DeviceType, EventKind, InputEvent};

use crate::queue::EventQueue;
use crate::registry::{MAX_DEVICES, REPORT_BUFFER_SIZE};

/// Key slots in a boot-protocol keyboard report.
pub const KEY_SLOTS: usize = 6;

/// Axes tracked per gamepad or joystick.
pub const MAX_AXES: usize = 16;

/// Mouse button bits considered by the diff.
const MOUSE_BUTTON_MASK: u8 = 0x07;

/// Error type for report normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportError {
    /// Device index outside the registry.
    InvalidDevice,
    /// Report shorter than the device type requires.
    TooShort { expected: usize, actual: usize },
}

impl core::fmt::Display for ReportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidDevice => write!(f, "invalid device index"),
            Self::TooShort { expected, actual } => {
                write!(f, "report too short: expected {}, got {}", expected, actual)
            }
        }
    }
}

/// Receiver of normalized events.
pub trait EventSink {
    fn emit(&mut self, event: InputEvent);
}

impl<const N: usize> EventSink for EventQueue<N> {
    fn emit(&mut self, event: InputEvent) {
        self.push(event);
    }
}

#[derive(Clone, Copy)]
struct History {
    modifiers: u8,
    keys: [u8; KEY_SLOTS],
    mouse_buttons: u8,
    mouse_x: i32,
    mouse_y: i32,
    wheel: i32,
    buttons: u8,
    axes: [u8; MAX_AXES],
    raw: [u8; REPORT_BUFFER_SIZE],
}

impl History {
    const EMPTY: Self = Self {
        modifiers: 0,
        keys: [0; KEY_SLOTS],
        mouse_buttons: 0,
        mouse_x: 0,
        mouse_y: 0,
        wheel: 0,
        buttons: 0,
        axes: [0; MAX_AXES],
        raw: [0; REPORT_BUFFER_SIZE],
    };
}

/// Emits events on a single device's behalf, counting them.
struct Emitter<'a, S: EventSink> {
    sink: &'a mut S,
    device: u8,
    now_ms: u32,
    count: usize,
}

impl<S: EventSink> Emitter<'_, S> {
    fn emit(&mut self, kind: EventKind, input_id: u8, value: i16) {
        self.sink
            .emit(InputEvent::new(kind, self.device, input_id, value, self.now_ms));
        self.count += 1;
    }

    /// One press or release per bit that differs between `prev` and `cur`.
    fn bits(&mut self, prev: u8, cur: u8, press: EventKind, release: EventKind) {
        let changed = prev ^ cur;
        for bit in 0..8u8 {
            let mask = 1 << bit;
            if changed & mask == 0 {
                continue;
            }
            if cur & mask != 0 {
                self.emit(press, bit, 1);
            } else {
                self.emit(release, bit, 0);
            }
        }
    }
}

/// `slots[i]` is a key that did not already appear earlier in `slots`.
fn is_first_key(slots: &[u8], i: usize) -> bool {
    slots[i] != 0 && !slots[..i].contains(&slots[i])
}

/// Per-device report differ.
pub struct Normalizer {
    history: [History; MAX_DEVICES],
}

impl Normalizer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            history: [History::EMPTY; MAX_DEVICES],
        }
    }

    /// Forget everything known about `device`.
    pub fn reset(&mut self, device: u8) {
        if let Some(history) = self.history.get_mut(device as usize) {
            *history = History::EMPTY;
        }
    }

    /// Diff `report` against the device's previous report and emit events.
    ///
    /// Returns the number of events emitted. Reports shorter than
    /// [`DeviceType::min_report_len`] are rejected without touching state.
    pub fn normalize<S: EventSink>(
        &mut self,
        device: u8,
        device_type: DeviceType,
        report: &[u8],
        now_ms: u32,
        sink: &mut S,
    ) -> Result<usize, ReportError> {
        let history = self
            .history
            .get_mut(device as usize)
            .ok_or(ReportError::InvalidDevice)?;

        let expected = device_type.min_report_len();
        if report.len() < expected {
            return Err(ReportError::TooShort {
                expected,
                actual: report.len(),
            });
        }

        let mut out = Emitter {
            sink,
            device,
            now_ms,
            count: 0,
        };

        match device_type {
            DeviceType::Keyboard => keyboard(history, report, &mut out),
            DeviceType::Mouse => mouse(history, report, &mut out),
            DeviceType::Gamepad | DeviceType::Joystick => gamepad(history, report, &mut out),
            DeviceType::Custom | DeviceType::Unknown => custom(history, report, &mut out),
        }

        Ok(out.count)
    }

    /// Whether `key` is held on a keyboard, per its last report.
    #[must_use]
    pub fn is_key_pressed(&self, device: u8, key: u8) -> bool {
        key != 0
            && self
                .history
                .get(device as usize)
                .is_some_and(|h| h.keys.contains(&key))
    }

    /// Keyboard modifier byte from the last report.
    #[must_use]
    pub fn modifiers(&self, device: u8) -> u8 {
        self.history.get(device as usize).map_or(0, |h| h.modifiers)
    }

    /// Mouse button mask (bits 0-2).
    #[must_use]
    pub fn mouse_buttons(&self, device: u8) -> u8 {
        self.history.get(device as usize).map_or(0, |h| h.mouse_buttons)
    }

    /// Sum of all mouse X/Y deltas since connect.
    #[must_use]
    pub fn mouse_position(&self, device: u8) -> (i32, i32) {
        self.history
            .get(device as usize)
            .map_or((0, 0), |h| (h.mouse_x, h.mouse_y))
    }

    /// Sum of all wheel deltas since connect.
    #[must_use]
    pub fn mouse_wheel(&self, device: u8) -> i32 {
        self.history.get(device as usize).map_or(0, |h| h.wheel)
    }

    /// Last raw value of a gamepad or joystick axis.
    #[must_use]
    pub fn axis(&self, device: u8, axis: u8) -> u8 {
        self.history
            .get(device as usize)
            .and_then(|h| h.axes.get(axis as usize).copied())
            .unwrap_or(0)
    }

    /// Whether gamepad or joystick `button` (0-7) is held.
    #[must_use]
    pub fn is_button_pressed(&self, device: u8, button: u8) -> bool {
        button < 8
            && self
                .history
                .get(device as usize)
                .is_some_and(|h| h.buttons & (1 << button) != 0)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn keyboard<S: EventSink>(history: &mut History, report: &[u8], out: &mut Emitter<'_, S>) {
    let modifiers = report[0];
    out.bits(history.modifiers, modifiers, EventKind::KeyPress, EventKind::KeyRelease);

    let mut keys = [0u8; KEY_SLOTS];
    keys.copy_from_slice(&report[2..2 + KEY_SLOTS]);

    // Releases first so a swapped key reads release-then-press.
    for i in 0..KEY_SLOTS {
        let key = history.keys[i];
        if is_first_key(&history.keys, i) && !keys.contains(&key) {
            out.emit(EventKind::KeyRelease, key, 0);
        }
    }
    for i in 0..KEY_SLOTS {
        let key = keys[i];
        if is_first_key(&keys, i) && !history.keys.contains(&key) {
            out.emit(EventKind::KeyPress, key, 1);
        }
    }

    history.modifiers = modifiers;
    history.keys = keys;
}

fn mouse<S: EventSink>(history: &mut History, report: &[u8], out: &mut Emitter<'_, S>) {
    let buttons = report[0] & MOUSE_BUTTON_MASK;
    out.bits(
        history.mouse_buttons,
        buttons,
        EventKind::ButtonPress,
        EventKind::ButtonRelease,
    );
    history.mouse_buttons = buttons;

    let dx = report[1] as i8;
    let dy = report[2] as i8;
    let wheel = report.get(3).map_or(0, |&b| b as i8);

    for (axis, delta) in [dx, dy, wheel].into_iter().enumerate() {
        if delta != 0 {
            out.emit(EventKind::AxisChange, axis as u8, delta as i16);
        }
    }

    history.mouse_x = history.mouse_x.wrapping_add(dx as i32);
    history.mouse_y = history.mouse_y.wrapping_add(dy as i32);
    history.wheel = history.wheel.wrapping_add(wheel as i32);
}

fn gamepad<S: EventSink>(history: &mut History, report: &[u8], out: &mut Emitter<'_, S>) {
    let buttons = report[0];
    out.bits(history.buttons, buttons, EventKind::ButtonPress, EventKind::ButtonRelease);
    history.buttons = buttons;

    let end = report.len().min(1 + MAX_AXES);
    for (axis, &value) in report[1..end].iter().enumerate() {
        if history.axes[axis] != value {
            history.axes[axis] = value;
            out.emit(EventKind::AxisChange, axis as u8, value as i16);
        }
    }
}

fn custom<S: EventSink>(history: &mut History, report: &[u8], out: &mut Emitter<'_, S>) {
    let end = report.len().min(REPORT_BUFFER_SIZE);
    for (offset, &value) in report[..end].iter().enumerate() {
        if history.raw[offset] != value {
            history.raw[offset] = value;
            out.emit(EventKind::AxisChange, offset as u8, value as i16);
        }
    }
}
