//! Output sinks: serial and CAN configuration, transport traits and the
//! buffering scheduler that feeds them.
//!
//! Mapped actions are buffered in two rings (serial bytes and CAN frames) and
//! drained by [`OutputScheduler::tick`], one byte and one frame per call. A
//! byte or frame leaves its ring only once the transport accepted it, so a
//! busy or failing transport never loses data.

use heapless::Deque;
use hidcan_proto::{format_line, CanFrame, LineFormat, MAX_LINE_LEN};

use crate::mapping::{ActionKind, OutputAction};

/// Serial ring capacity in bytes.
pub const SERIAL_BUFFER_SIZE: usize = 256;

/// CAN ring capacity in frames.
pub const CAN_BUFFER_SIZE: usize = 64;

/// Error type reported by transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Hardware or bus error.
    Io,
    /// Peripheral not ready to transmit.
    NotReady,
    /// All transmit slots occupied.
    Busy,
    /// The peripheral cannot realize the requested configuration.
    Config,
}

impl TransportError {
    /// Not-ready and busy conditions clear by themselves; they are waited out
    /// rather than counted.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NotReady | Self::Busy)
    }
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "transport I/O error"),
            Self::NotReady => write!(f, "transport not ready"),
            Self::Busy => write!(f, "transport busy"),
            Self::Config => write!(f, "transport rejected configuration"),
        }
    }
}

/// Error type for output operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputError {
    /// Not enough room in the ring; nothing was queued.
    Full,
    /// The sink is disabled in its configuration.
    Disabled,
    /// Nothing to send.
    Empty,
    /// Payload longer than a formatted line can hold.
    TooLong,
    /// Configuration values out of range.
    InvalidConfig,
    /// The transport refused the operation.
    Transport(TransportError),
}

impl core::fmt::Display for OutputError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "output buffer full"),
            Self::Disabled => write!(f, "output disabled"),
            Self::Empty => write!(f, "empty payload"),
            Self::TooLong => write!(f, "payload too long"),
            Self::InvalidConfig => write!(f, "invalid output configuration"),
            Self::Transport(e) => write!(f, "{}", e),
        }
    }
}

impl From<TransportError> for OutputError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Serial data bits.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataBits {
    #[default]
    Eight = 8,
    Nine = 9,
}

impl DataBits {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            8 => Some(Self::Eight),
            9 => Some(Self::Nine),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Serial stop bits.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StopBits {
    #[default]
    One = 1,
    Two = 2,
}

impl StopBits {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Serial parity.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
}

impl Parity {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Odd),
            2 => Some(Self::Even),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Serial sink configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialConfig {
    pub enabled: bool,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub line_format: LineFormat,
}

impl SerialConfig {
    /// Lowest accepted baud rate.
    pub const MIN_BAUD: u32 = 1_200;
    /// Highest accepted baud rate.
    pub const MAX_BAUD: u32 = 4_000_000;

    pub fn validate(&self) -> Result<(), OutputError> {
        if (Self::MIN_BAUD..=Self::MAX_BAUD).contains(&self.baud_rate) {
            Ok(())
        } else {
            Err(OutputError::InvalidConfig)
        }
    }
}

impl Default for SerialConfig {
    /// 115200 8N1, raw bytes.
    fn default() -> Self {
        Self {
            enabled: true,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            line_format: LineFormat::Raw,
        }
    }
}

/// CAN controller operating mode.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CanMode {
    #[default]
    Normal = 0,
    Loopback = 1,
    Silent = 2,
}

impl CanMode {
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Normal),
            1 => Some(Self::Loopback),
            2 => Some(Self::Silent),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// CAN sink configuration, with bit timing in time quanta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanConfig {
    pub enabled: bool,
    pub bitrate: u32,
    pub mode: CanMode,
    /// Resynchronization jump width, 1-4.
    pub sjw: u8,
    /// Time segment 1, 1-16.
    pub bs1: u8,
    /// Time segment 2, 1-8.
    pub bs2: u8,
}

impl CanConfig {
    /// Quanta per bit: sync segment plus both time segments.
    #[inline]
    #[must_use]
    pub const fn quanta_per_bit(&self) -> u32 {
        1 + self.bs1 as u32 + self.bs2 as u32
    }

    /// Baud rate prescaler for a peripheral clock of `pclk_hz`.
    ///
    /// `None` when the bitrate cannot be derived from that clock (prescaler
    /// outside 1-1024).
    #[must_use]
    pub const fn prescaler(&self, pclk_hz: u32) -> Option<u16> {
        let divisor = match self.bitrate.checked_mul(self.quanta_per_bit()) {
            Some(d) if d > 0 => d,
            _ => return None,
        };
        let prescaler = pclk_hz / divisor;
        if prescaler >= 1 && prescaler <= 1024 {
            Some(prescaler as u16)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), OutputError> {
        let ok = (10_000..=1_000_000).contains(&self.bitrate)
            && (1..=4).contains(&self.sjw)
            && (1..=16).contains(&self.bs1)
            && (1..=8).contains(&self.bs2)
            && self.sjw <= self.bs2;
        if ok {
            Ok(())
        } else {
            Err(OutputError::InvalidConfig)
        }
    }
}

impl Default for CanConfig {
    /// 500 kbit/s, normal mode, 14 quanta per bit.
    fn default() -> Self {
        Self {
            enabled: true,
            bitrate: 500_000,
            mode: CanMode::Normal,
            sjw: 1,
            bs1: 6,
            bs2: 7,
        }
    }
}

/// Byte-at-a-time serial transmitter.
pub trait SerialTransport {
    /// Apply line settings. Called whenever the serial config changes.
    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError>;

    /// Whether a byte can be written now.
    fn transmit_ready(&self) -> bool;

    fn transmit_byte(&mut self, byte: u8) -> Result<(), TransportError>;
}

/// CAN controller transmit side.
pub trait CanTransport {
    /// Apply bit timing and mode. Called whenever the CAN config changes.
    fn configure(&mut self, config: &CanConfig) -> Result<(), TransportError>;

    /// Whether a transmit mailbox is free.
    fn transmit_slot_free(&self) -> bool;

    /// Hand one frame to the controller. The frame counts as sent on `Ok`.
    fn transmit_frame(&mut self, frame: &CanFrame) -> Result<(), TransportError>;
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputStats {
    pub serial_bytes_sent: u32,
    pub can_frames_sent: u32,
    /// Enqueues refused for lack of room.
    pub serial_overflows: u32,
    pub can_overflows: u32,
    /// Non-transient transport errors while draining.
    pub serial_errors: u32,
    pub can_errors: u32,
}

/// Buffers output for both sinks and paces it onto the transports.
pub struct OutputScheduler<S, C> {
    serial: S,
    can: C,
    serial_config: SerialConfig,
    can_config: CanConfig,
    serial_buf: Deque<u8, SERIAL_BUFFER_SIZE>,
    can_buf: Deque<CanFrame, CAN_BUFFER_SIZE>,
    stats: OutputStats,
}

impl<S, C> OutputScheduler<S, C>
where
    S: SerialTransport,
    C: CanTransport,
{
    /// Wrap the transports with default configs. Transports are not touched
    /// until `configure_serial` / `configure_can` is called.
    pub fn new(serial: S, can: C) -> Self {
        Self {
            serial,
            can,
            serial_config: SerialConfig::default(),
            can_config: CanConfig::default(),
            serial_buf: Deque::new(),
            can_buf: Deque::new(),
            stats: OutputStats::default(),
        }
    }

    /// Validate `config`, push it to the transport and keep it.
    pub fn configure_serial(&mut self, config: SerialConfig) -> Result<(), OutputError> {
        config.validate()?;
        self.serial.configure(&config)?;
        self.serial_config = config;
        info!("serial: {} baud, enabled={}", config.baud_rate, config.enabled);
        Ok(())
    }

    /// Validate `config`, push it to the transport and keep it.
    pub fn configure_can(&mut self, config: CanConfig) -> Result<(), OutputError> {
        config.validate()?;
        self.can.configure(&config)?;
        self.can_config = config;
        info!("can: {} bit/s, enabled={}", config.bitrate, config.enabled);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn serial_config(&self) -> &SerialConfig {
        &self.serial_config
    }

    #[inline]
    #[must_use]
    pub fn can_config(&self) -> &CanConfig {
        &self.can_config
    }

    /// Queue `data` for the serial sink after applying the line format.
    ///
    /// Either the whole formatted line is queued or nothing is. Returns the
    /// number of bytes queued.
    pub fn enqueue_serial(&mut self, data: &[u8]) -> Result<usize, OutputError> {
        if !self.serial_config.enabled {
            return Err(OutputError::Disabled);
        }
        if data.is_empty() {
            return Err(OutputError::Empty);
        }

        let mut line = [0u8; MAX_LINE_LEN];
        let len = format_line(data, self.serial_config.line_format, &mut line)
            .map_err(|_| OutputError::TooLong)?;

        let free = SERIAL_BUFFER_SIZE - self.serial_buf.len();
        if free < len {
            self.stats.serial_overflows = self.stats.serial_overflows.wrapping_add(1);
            return Err(OutputError::Full);
        }
        for &byte in &line[..len] {
            // Room was checked above.
            let _ = self.serial_buf.push_back(byte);
        }
        Ok(len)
    }

    /// Queue one frame for the CAN sink.
    pub fn enqueue_can(&mut self, frame: CanFrame) -> Result<(), OutputError> {
        if !self.can_config.enabled {
            return Err(OutputError::Disabled);
        }
        self.can_buf.push_back(frame).map_err(|_| {
            self.stats.can_overflows = self.stats.can_overflows.wrapping_add(1);
            OutputError::Full
        })
    }

    /// Queue a mapped action on the sink it targets.
    pub fn submit(&mut self, action: &OutputAction) -> Result<(), OutputError> {
        match action.kind {
            ActionKind::Serial(payload) => self.enqueue_serial(payload.as_slice()).map(|_| ()),
            ActionKind::Can(frame) => self.enqueue_can(frame),
        }
    }

    /// Move at most one byte and one frame onto the transports.
    ///
    /// Disabled sinks keep their buffered data until re-enabled.
    pub fn tick(&mut self) {
        if self.serial_config.enabled {
            self.drain_serial();
        }
        if self.can_config.enabled {
            self.drain_can();
        }
    }

    fn drain_serial(&mut self) {
        let Some(&byte) = self.serial_buf.front() else {
            return;
        };
        if !self.serial.transmit_ready() {
            return;
        }
        match self.serial.transmit_byte(byte) {
            Ok(()) => {
                self.serial_buf.pop_front();
                self.stats.serial_bytes_sent = self.stats.serial_bytes_sent.wrapping_add(1);
            }
            Err(e) if e.is_transient() => {}
            Err(e) => {
                self.stats.serial_errors = self.stats.serial_errors.wrapping_add(1);
                warn!("serial transmit failed: {:?}", e);
            }
        }
    }

    fn drain_can(&mut self) {
        let Some(frame) = self.can_buf.front().copied() else {
            return;
        };
        if !self.can.transmit_slot_free() {
            return;
        }
        match self.can.transmit_frame(&frame) {
            Ok(()) => {
                self.can_buf.pop_front();
                self.stats.can_frames_sent = self.stats.can_frames_sent.wrapping_add(1);
            }
            Err(e) if e.is_transient() => {}
            Err(e) => {
                self.stats.can_errors = self.stats.can_errors.wrapping_add(1);
                warn!("CAN transmit failed: {:?}", e);
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn pending_serial(&self) -> usize {
        self.serial_buf.len()
    }

    #[inline]
    #[must_use]
    pub fn pending_can(&self) -> usize {
        self.can_buf.len()
    }

    /// Drop everything still buffered.
    pub fn clear(&mut self) {
        self.serial_buf.clear();
        self.can_buf.clear();
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &OutputStats {
        &self.stats
    }

    #[inline]
    pub fn serial_transport(&self) -> &S {
        &self.serial
    }

    #[inline]
    pub fn can_transport(&self) -> &C {
        &self.can
    }
}

#[cfg(test)]
pub(crate) mod mock {
    extern crate std;
    use std::vec::Vec;

    use super::*;

    /// Serial transport recording every byte written.
    #[derive(Default)]
    pub struct MockSerial {
        pub ready: bool,
        pub fail_with: Option<TransportError>,
        pub written: Vec<u8>,
        pub configured: Option<SerialConfig>,
    }

    impl MockSerial {
        pub fn ready() -> Self {
            Self {
                ready: true,
                ..Self::default()
            }
        }
    }

    impl SerialTransport for MockSerial {
        fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
            self.configured = Some(*config);
            Ok(())
        }

        fn transmit_ready(&self) -> bool {
            self.ready
        }

        fn transmit_byte(&mut self, byte: u8) -> Result<(), TransportError> {
            if let Some(e) = self.fail_with {
                return Err(e);
            }
            self.written.push(byte);
            Ok(())
        }
    }

    /// CAN transport recording every frame accepted.
    #[derive(Default)]
    pub struct MockCan {
        pub slot_free: bool,
        pub fail_with: Option<TransportError>,
        pub sent: Vec<CanFrame>,
        pub configured: Option<CanConfig>,
    }

    impl MockCan {
        pub fn ready() -> Self {
            Self {
                slot_free: true,
                ..Self::default()
            }
        }
    }

    impl CanTransport for MockCan {
        fn configure(&mut self, config: &CanConfig) -> Result<(), TransportError> {
            self.configured = Some(*config);
            Ok(())
        }

        fn transmit_slot_free(&self) -> bool {
            self.slot_free
        }

        fn transmit_frame(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
            if let Some(e) = self.fail_with {
                return Err(e);
            }
            self.sent.push(*frame);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockCan, MockSerial};
    use super::*;
    use hidcan_proto::CanId;

    fn scheduler() -> OutputScheduler<MockSerial, MockCan> {
        OutputScheduler::new(MockSerial::ready(), MockCan::ready())
    }

    #[test]
    fn test_serial_drains_one_byte_per_tick() {
        let mut out = scheduler();
        assert_eq!(out.enqueue_serial(&[1, 2, 3]), Ok(3));
        out.tick();
        assert_eq!(out.serial_transport().written, [1]);
        out.tick();
        out.tick();
        out.tick();
        assert_eq!(out.serial_transport().written, [1, 2, 3]);
        assert_eq!(out.pending_serial(), 0);
        assert_eq!(out.stats().serial_bytes_sent, 3);
    }

    #[test]
    fn test_serial_overflow_is_atomic() {
        let mut out = scheduler();
        for _ in 0..(SERIAL_BUFFER_SIZE / 8) - 1 {
            out.enqueue_serial(&[0xAA; 8]).unwrap();
        }
        out.enqueue_serial(&[0xAA; 6]).unwrap();
        assert_eq!(out.pending_serial(), SERIAL_BUFFER_SIZE - 2);

        assert_eq!(out.enqueue_serial(&[1, 2, 3]), Err(OutputError::Full));
        assert_eq!(out.pending_serial(), SERIAL_BUFFER_SIZE - 2);
        assert_eq!(out.stats().serial_overflows, 1);

        assert_eq!(out.enqueue_serial(&[1, 2]), Ok(2));
        assert_eq!(out.pending_serial(), SERIAL_BUFFER_SIZE);
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut out = scheduler();
        assert_eq!(out.enqueue_serial(&[]), Err(OutputError::Empty));

        out.configure_serial(SerialConfig {
            line_format: LineFormat::Hex,
            ..SerialConfig::default()
        })
        .unwrap();
        assert_eq!(out.enqueue_serial(&[]), Err(OutputError::Empty));
        assert_eq!(out.pending_serial(), 0);
        assert_eq!(out.stats().serial_overflows, 0);
    }

    #[test]
    fn test_line_format_applied_on_enqueue() {
        let mut out = scheduler();
        let config = SerialConfig {
            line_format: LineFormat::Hex,
            ..SerialConfig::default()
        };
        out.configure_serial(config).unwrap();
        assert_eq!(out.serial_transport().configured, Some(config));

        assert_eq!(out.enqueue_serial(&[0x04, 0x1F]), Ok(8));
        for _ in 0..8 {
            out.tick();
        }
        assert_eq!(out.serial_transport().written, b"0x041F\r\n");
    }

    #[test]
    fn test_drain_waits_while_not_ready() {
        let mut out = OutputScheduler::new(MockSerial::default(), MockCan::default());
        out.enqueue_serial(&[7]).unwrap();
        out.enqueue_can(CanFrame::new(0x10, &[1]).unwrap()).unwrap();
        for _ in 0..10 {
            out.tick();
        }
        assert_eq!(out.pending_serial(), 1);
        assert_eq!(out.pending_can(), 1);
        assert_eq!(out.stats().serial_errors, 0);
    }

    #[test]
    fn test_frame_kept_until_accepted() {
        let mut out = scheduler();
        out.can.fail_with = Some(TransportError::Io);
        out.enqueue_can(CanFrame::new(0x12345, &[9]).unwrap()).unwrap();

        out.tick();
        assert_eq!(out.pending_can(), 1);
        assert_eq!(out.stats().can_errors, 1);

        out.can.fail_with = Some(TransportError::Busy);
        out.tick();
        assert_eq!(out.stats().can_errors, 1);

        out.can.fail_with = None;
        out.tick();
        assert_eq!(out.pending_can(), 0);
        assert_eq!(out.can_transport().sent[0].id(), CanId::Extended(0x12345));
    }

    #[test]
    fn test_can_ring_full() {
        let mut out = scheduler();
        let frame = CanFrame::new(0x100, &[0; 8]).unwrap();
        for _ in 0..CAN_BUFFER_SIZE {
            out.enqueue_can(frame).unwrap();
        }
        assert_eq!(out.enqueue_can(frame), Err(OutputError::Full));
        assert_eq!(out.stats().can_overflows, 1);
    }

    #[test]
    fn test_disabled_sink_rejects() {
        let mut out = scheduler();
        out.configure_can(CanConfig {
            enabled: false,
            ..CanConfig::default()
        })
        .unwrap();
        let frame = CanFrame::new(0x100, &[1]).unwrap();
        assert_eq!(out.enqueue_can(frame), Err(OutputError::Disabled));
        assert_eq!(out.enqueue_serial(&[1]), Ok(1));
    }

    #[test]
    fn test_invalid_config_keeps_previous() {
        let mut out = scheduler();
        let bad = SerialConfig {
            baud_rate: 0,
            ..SerialConfig::default()
        };
        assert_eq!(out.configure_serial(bad), Err(OutputError::InvalidConfig));
        assert_eq!(out.serial_config().baud_rate, 115_200);
        assert!(out.serial_transport().configured.is_none());

        let bad = CanConfig {
            bs2: 0,
            ..CanConfig::default()
        };
        assert_eq!(out.configure_can(bad), Err(OutputError::InvalidConfig));
    }

    #[test]
    fn test_can_prescaler() {
        let config = CanConfig::default();
        assert_eq!(config.quanta_per_bit(), 14);
        // 42 MHz APB1 on the F407
        assert_eq!(config.prescaler(42_000_000), Some(6));
        assert_eq!(config.prescaler(1_000), None);
    }

    #[test]
    fn test_can_prescaler_follows_segments() {
        let config = CanConfig {
            bitrate: 250_000,
            bs1: 13,
            bs2: 2,
            ..CanConfig::default()
        };
        assert_eq!(config.quanta_per_bit(), 16);
        assert_eq!(config.prescaler(42_000_000), Some(10));

        // The scheduler hands the full timing to the transport.
        let mut out = scheduler();
        out.configure_can(config).unwrap();
        let applied = out.can_transport().configured.unwrap();
        assert_eq!((applied.sjw, applied.bs1, applied.bs2), (1, 13, 2));
    }
}
