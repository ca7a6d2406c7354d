//! Platform-agnostic event pipeline for the HID to Serial/CAN bridge.
//!
//! This crate turns raw HID reports into serial bytes and CAN frames without
//! touching any hardware. Peripherals are reached through the transport
//! traits, so the same code runs in firmware and in host tests.
//!
//! # Overview
//!
//! - [`registry`]: Connected devices and their last report ([`DeviceRegistry`])
//! - [`normalizer`]: Report diffing into input events ([`Normalizer`])
//! - [`queue`]: Bounded, evict-oldest event FIFO ([`EventQueue`])
//! - [`mapping`]: Rule table and evaluation ([`MappingTable`])
//! - [`output`]: Sink configs, transport traits and buffering ([`OutputScheduler`])
//! - [`store`]: Persisted config records ([`ConfigStore`])
//! - [`pipeline`]: Owns all of the above and runs the tick ([`Pipeline`])
//!
//! # Data flow
//!
//! ```text
//! on_report -> Registry -> Normalizer -> EventQueue
//! tick      -> EventQueue -> MappingTable -> OutputScheduler -> transports
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Log and format through defmt (for embedded logging)
//! - **`log`**: Log through the `log` facade
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations. Every
//! buffer has a fixed capacity.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod mapping;
pub mod normalizer;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod store;

pub use mapping::{
    ActionKind, DispatchStats, MappingError, MappingRule, MappingTable, OutputAction, OutputTarget, DEFAULT_RULES,
    MAX_MAPPINGS,
};
pub use normalizer::{EventSink, Normalizer, ReportError};
pub use output::{
    CanConfig, CanMode, CanTransport, DataBits, OutputError, OutputScheduler, OutputStats, Parity, SerialConfig,
    SerialTransport, StopBits, TransportError, CAN_BUFFER_SIZE, SERIAL_BUFFER_SIZE,
};
pub use pipeline::{DeviceListener, Pipeline, PipelineError, PipelineStats, PipelineStatus};
pub use queue::{EventQueue, EVENT_QUEUE_SIZE};
pub use registry::{DeviceDescriptor, DeviceInfo, DeviceRegistry, RegistryError, MAX_DEVICES};
pub use store::{ConfigStore, NullStore, Persist, StoreError};

pub use hidcan_proto::{CanFrame, CanId, DeviceType, EventKind, InputEvent, LineFormat, ValueFormat};
