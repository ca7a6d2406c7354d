//! Device notifications from the USB host driver.
//!
//! The host driver runs in its own task and must not touch the pipeline
//! directly. It publishes [`HostEvent`]s through a [`HostNotifier`]; the
//! pipeline task drains the channel at the start of every tick.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::Instant;
use heapless::Vec;
use hidcan_core::registry::REPORT_BUFFER_SIZE;
use hidcan_core::{DeviceDescriptor, DeviceListener, DeviceType, PipelineError};

/// Notifications buffered between the host driver and the pipeline.
pub const HOST_EVENT_DEPTH: usize = 16;

pub type HostChannel = Channel<CriticalSectionRawMutex, HostEvent, HOST_EVENT_DEPTH>;
pub type HostReceiver = Receiver<'static, CriticalSectionRawMutex, HostEvent, HOST_EVENT_DEPTH>;

/// One thing the USB host driver observed.
#[derive(Clone, Debug)]
pub enum HostEvent {
    Connected {
        index: u8,
        device_type: DeviceType,
        vendor_id: u16,
        product_id: u16,
    },
    Disconnected {
        index: u8,
    },
    Report {
        index: u8,
        data: Vec<u8, REPORT_BUFFER_SIZE>,
        at_ms: u32,
    },
}

/// Feed one host event to the pipeline.
pub fn dispatch<L: DeviceListener>(listener: &mut L, event: HostEvent) -> Result<(), PipelineError> {
    match event {
        HostEvent::Connected {
            index,
            device_type,
            vendor_id,
            product_id,
        } => listener.on_connect(
            index,
            DeviceDescriptor {
                device_type,
                vendor_id,
                product_id,
                name: None,
            },
        ),
        HostEvent::Disconnected { index } => listener.on_disconnect(index),
        HostEvent::Report { index, data, at_ms } => listener.on_report(index, &data, at_ms).map(|_| ()),
    }
}

/// Publishing half, handed to the USB host driver.
#[derive(Clone, Copy)]
pub struct HostNotifier {
    sender: Sender<'static, CriticalSectionRawMutex, HostEvent, HOST_EVENT_DEPTH>,
}

impl HostNotifier {
    pub fn new(channel: &'static HostChannel) -> Self {
        Self {
            sender: channel.sender(),
        }
    }

    /// Connect and disconnect notifications wait for room; losing one would
    /// desynchronize the registry.
    pub async fn connected(&self, index: u8, device_type: DeviceType, vendor_id: u16, product_id: u16) {
        self.sender
            .send(HostEvent::Connected {
                index,
                device_type,
                vendor_id,
                product_id,
            })
            .await;
    }

    pub async fn disconnected(&self, index: u8) {
        self.sender.send(HostEvent::Disconnected { index }).await;
    }

    /// Queue a report, timestamped now. Reports are dropped when the channel
    /// is full; the next report carries the complete state anyway.
    pub fn report(&self, index: u8, report: &[u8]) -> bool {
        let len = report.len().min(REPORT_BUFFER_SIZE);
        let mut data = Vec::new();
        if data.extend_from_slice(&report[..len]).is_err() {
            return false;
        }
        let at_ms = Instant::now().as_millis() as u32;
        self.sender
            .try_send(HostEvent::Report { index, data, at_ms })
            .is_ok()
    }
}
