//! STM32 peripherals behind the pipeline's transport traits.

use core::num::{NonZeroU16, NonZeroU8};

use embassy_stm32::can::util::NominalBitTiming;
use embassy_stm32::can::{Can, Frame};
use embassy_stm32::mode::Blocking;
use embassy_stm32::usart::{self, UartTx};
use hidcan_core::{CanConfig, CanId, CanMode, CanTransport, DataBits, Parity, SerialConfig, SerialTransport, StopBits};
use hidcan_core::{CanFrame, TransportError};

/// Translate a serial config into USART line settings.
fn usart_config(config: &SerialConfig) -> usart::Config {
    let mut usart = usart::Config::default();
    usart.baudrate = config.baud_rate;
    usart.data_bits = match config.data_bits {
        DataBits::Eight => usart::DataBits::DataBits8,
        DataBits::Nine => usart::DataBits::DataBits9,
    };
    usart.stop_bits = match config.stop_bits {
        StopBits::One => usart::StopBits::STOP1,
        StopBits::Two => usart::StopBits::STOP2,
    };
    usart.parity = match config.parity {
        Parity::None => usart::Parity::ParityNone,
        Parity::Odd => usart::Parity::ParityOdd,
        Parity::Even => usart::Parity::ParityEven,
    };
    usart
}

/// Serial sink on a blocking USART transmitter.
///
/// One byte takes at most a single character time, so writes are done
/// in place instead of through DMA.
pub struct UartSerial {
    tx: UartTx<'static, Blocking>,
}

impl UartSerial {
    pub fn new(tx: UartTx<'static, Blocking>) -> Self {
        Self { tx }
    }
}

impl SerialTransport for UartSerial {
    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        self.tx
            .set_config(&usart_config(config))
            .map_err(|_| TransportError::Config)
    }

    fn transmit_ready(&self) -> bool {
        true
    }

    fn transmit_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.tx.blocking_write(&[byte]).map_err(|_| TransportError::Io)
    }
}

/// bxCAN segment timing for `config` on a peripheral clock of `pclk_hz`.
///
/// Fails when no prescaler in 1-1024 gives the configured bitrate.
pub fn bit_timing(config: &CanConfig, pclk_hz: u32) -> Result<NominalBitTiming, TransportError> {
    let prescaler = config.prescaler(pclk_hz).and_then(NonZeroU16::new);
    match (
        prescaler,
        NonZeroU8::new(config.bs1),
        NonZeroU8::new(config.bs2),
        NonZeroU8::new(config.sjw),
    ) {
        (Some(prescaler), Some(seg1), Some(seg2), Some(sync_jump_width)) => Ok(NominalBitTiming {
            prescaler,
            seg1,
            seg2,
            sync_jump_width,
        }),
        _ => Err(TransportError::Config),
    }
}

/// CAN sink on the bxCAN controller.
pub struct BxCan {
    can: Can<'static>,
    pclk_hz: u32,
}

impl BxCan {
    /// Wrap an already enabled controller clocked from `pclk_hz`.
    pub fn new(can: Can<'static>, pclk_hz: u32) -> Self {
        Self { can, pclk_hz }
    }
}

impl CanTransport for BxCan {
    fn configure(&mut self, config: &CanConfig) -> Result<(), TransportError> {
        let timing = bit_timing(config, self.pclk_hz)?;
        // The controller leaves init mode when the proxy is dropped.
        self.can
            .modify_config()
            .set_bit_timing(timing)
            .set_loopback(config.mode == CanMode::Loopback)
            .set_silent(config.mode == CanMode::Silent);
        Ok(())
    }

    fn transmit_slot_free(&self) -> bool {
        // Mailbox state is only visible through `try_write`.
        true
    }

    fn transmit_frame(&mut self, frame: &CanFrame) -> Result<(), TransportError> {
        let hw_frame = match frame.id() {
            CanId::Standard(id) => Frame::new_standard(id, frame.data()),
            CanId::Extended(id) => Frame::new_extended(id, frame.data()),
        }
        .map_err(|_| TransportError::Io)?;

        self.can
            .try_write(&hw_frame)
            .map(|_| ())
            .map_err(|_| TransportError::Busy)
    }
}
