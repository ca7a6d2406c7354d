//! USB HID to Serial/CAN bridge for STM32F407.
//!
//! This crate provides the embedded side of the bridge: USART and bxCAN
//! transports for the [`hidcan_core`] pipeline, and the channel the USB host
//! driver uses to report devices.

#![no_std]

pub use hidcan_core::{
    CanConfig, ConfigStore, DeviceListener, NullStore, Pipeline, PipelineError, PipelineStatus, SerialConfig,
};

pub mod host;
pub mod transport;

pub use host::{dispatch, HostChannel, HostEvent, HostNotifier, HostReceiver};
pub use transport::{BxCan, UartSerial};

/// The pipeline as wired on this board.
pub type BridgePipeline = Pipeline<UartSerial, BxCan>;
