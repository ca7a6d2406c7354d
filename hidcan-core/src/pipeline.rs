//! Pipeline: owns every stage and runs the tick.

use hidcan_proto::DeviceType;

use crate::mapping::{DispatchStats, MappingTable};
use crate::normalizer::{Normalizer, ReportError};
use crate::output::{
    CanConfig, CanTransport, OutputError, OutputScheduler, OutputStats, SerialConfig, SerialTransport,
};
use crate::queue::EventQueue;
use crate::registry::{DeviceDescriptor, DeviceRegistry, RegistryError};
use crate::store::{self, ConfigStore, Persist, StoreError};

/// Notifications from the USB host layer.
///
/// Implemented by [`Pipeline`]; the host driver (or whatever drains its
/// notification channel) calls these directly.
pub trait DeviceListener {
    /// A device was enumerated at `index`.
    fn on_connect(&mut self, index: u8, descriptor: DeviceDescriptor<'_>) -> Result<(), PipelineError>;

    /// The device at `index` went away.
    fn on_disconnect(&mut self, index: u8) -> Result<(), PipelineError>;

    /// The device at `index` delivered a report. Returns the number of
    /// events it produced.
    fn on_report(&mut self, index: u8, report: &[u8], now_ms: u32) -> Result<usize, PipelineError>;
}

/// Error type for pipeline operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipelineError {
    Registry(RegistryError),
    Report(ReportError),
    Output(OutputError),
    Store(StoreError),
}

impl core::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "registry: {}", e),
            Self::Report(e) => write!(f, "report: {}", e),
            Self::Output(e) => write!(f, "output: {}", e),
            Self::Store(e) => write!(f, "store: {}", e),
        }
    }
}

impl From<RegistryError> for PipelineError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<ReportError> for PipelineError {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

impl From<OutputError> for PipelineError {
    fn from(e: OutputError) -> Self {
        Self::Output(e)
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipelineStats {
    /// Reports accepted and normalized.
    pub reports: u32,
    /// Reports dropped as malformed.
    pub malformed_reports: u32,
    /// Events taken off the queue and evaluated.
    pub events_routed: u32,
    /// Actions the output scheduler refused.
    pub actions_dropped: u32,
    pub dispatch: DispatchStats,
}

/// Point-in-time view for status displays and tuning tools.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PipelineStatus {
    pub connected_devices: u8,
    pub queued_events: u8,
    pub events_evicted: u32,
    pub rules: u8,
    pub pending_serial: u16,
    pub pending_can: u8,
    pub pipeline: PipelineStats,
    pub output: OutputStats,
}

/// The whole event path from device reports to transports.
///
/// One value owns every stage; nothing is shared, so each instance is
/// independent. Call [`Pipeline::tick`] periodically and feed it through
/// [`DeviceListener`].
pub struct Pipeline<S, C> {
    registry: DeviceRegistry,
    normalizer: Normalizer,
    queue: EventQueue,
    mappings: MappingTable,
    output: OutputScheduler<S, C>,
    stats: PipelineStats,
}

impl<S, C> Pipeline<S, C>
where
    S: SerialTransport,
    C: CanTransport,
{
    /// Build a pipeline with default mappings and sink configs.
    pub fn new(serial: S, can: C) -> Result<Self, PipelineError> {
        let mut pipeline = Self::bare(serial, can, MappingTable::with_defaults());
        pipeline.output.configure_serial(SerialConfig::default())?;
        pipeline.output.configure_can(CanConfig::default())?;
        Ok(pipeline)
    }

    /// Build a pipeline from persisted config.
    ///
    /// Records that are missing, corrupt or hold out-of-range values are
    /// replaced by defaults. Only a transport that rejects the default
    /// config is an error.
    pub fn from_store<St: ConfigStore>(serial: S, can: C, store: &mut St) -> Result<Self, PipelineError> {
        let mappings = load_or_default::<MappingTable, St>(store);
        let mut pipeline = Self::bare(serial, can, mappings);

        let serial_config = load_or_default::<SerialConfig, St>(store);
        if let Err(e) = pipeline.output.configure_serial(serial_config) {
            warn!("stored serial config rejected: {:?}", e);
            pipeline.output.configure_serial(SerialConfig::default())?;
        }

        let can_config = load_or_default::<CanConfig, St>(store);
        if let Err(e) = pipeline.output.configure_can(can_config) {
            warn!("stored CAN config rejected: {:?}", e);
            pipeline.output.configure_can(CanConfig::default())?;
        }

        info!("pipeline ready, {} mapping rules", pipeline.mappings.count());
        Ok(pipeline)
    }

    fn bare(serial: S, can: C, mappings: MappingTable) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            normalizer: Normalizer::new(),
            queue: EventQueue::new(),
            mappings,
            output: OutputScheduler::new(serial, can),
            stats: PipelineStats::default(),
        }
    }

    /// Persist the mapping table and both sink configs.
    pub fn save_config<St: ConfigStore>(&self, store: &mut St) -> Result<(), PipelineError> {
        store::save(store, &self.mappings)?;
        store::save(store, self.output.serial_config())?;
        store::save(store, self.output.can_config())?;
        Ok(())
    }

    /// Route every queued event, then move one byte and one frame out.
    ///
    /// Returns the number of events routed.
    pub fn tick(&mut self) -> usize {
        let routed = self.route_events();
        self.output.tick();
        routed
    }

    fn route_events(&mut self) -> usize {
        let mut routed = 0;
        let output = &mut self.output;
        let dropped = &mut self.stats.actions_dropped;

        while let Some(event) = self.queue.pop() {
            let stats = self.mappings.evaluate(&event, |action| {
                if let Err(e) = output.submit(&action) {
                    *dropped = dropped.wrapping_add(1);
                    debug!("slot {} action dropped: {:?}", action.slot, e);
                }
            });
            self.stats.dispatch.accumulate(stats);
            routed += 1;
        }

        self.stats.events_routed = self.stats.events_routed.wrapping_add(routed as u32);
        routed
    }

    #[inline]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Current per-device input state.
    #[inline]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    #[inline]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    #[inline]
    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    #[inline]
    pub fn mappings_mut(&mut self) -> &mut MappingTable {
        &mut self.mappings
    }

    #[inline]
    pub fn output(&self) -> &OutputScheduler<S, C> {
        &self.output
    }

    /// Output scheduler, e.g. to reconfigure a sink.
    #[inline]
    pub fn output_mut(&mut self) -> &mut OutputScheduler<S, C> {
        &mut self.output
    }

    #[inline]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            connected_devices: self.registry.connected_count() as u8,
            queued_events: self.queue.len() as u8,
            events_evicted: self.queue.evicted(),
            rules: self.mappings.count() as u8,
            pending_serial: self.output.pending_serial() as u16,
            pending_can: self.output.pending_can() as u8,
            pipeline: self.stats,
            output: *self.output.stats(),
        }
    }
}

impl<S, C> DeviceListener for Pipeline<S, C>
where
    S: SerialTransport,
    C: CanTransport,
{
    fn on_connect(&mut self, index: u8, descriptor: DeviceDescriptor<'_>) -> Result<(), PipelineError> {
        let info = self.registry.connect_with(index, descriptor)?;
        info!("device {} connected: {:?}", index, info.device_type());
        self.normalizer.reset(index);
        Ok(())
    }

    fn on_disconnect(&mut self, index: u8) -> Result<(), PipelineError> {
        let device_type = self.registry.disconnect(index)?;
        // Reconnects must not diff against the old device's last report.
        self.normalizer.reset(index);
        info!("device {} disconnected: {:?}", index, device_type);
        Ok(())
    }

    fn on_report(&mut self, index: u8, report: &[u8], now_ms: u32) -> Result<usize, PipelineError> {
        let device_type: DeviceType = self.registry.info(index)?.device_type();

        let evicted_before = self.queue.evicted();
        let result = self
            .normalizer
            .normalize(index, device_type, report, now_ms, &mut self.queue);

        match result {
            Ok(count) => {
                // Only reports that made it through the normalizer are kept.
                self.registry.store_report(index, report)?;
                self.stats.reports = self.stats.reports.wrapping_add(1);
                let evicted = self.queue.evicted().wrapping_sub(evicted_before);
                if evicted > 0 {
                    warn!("event queue full, {} oldest events dropped", evicted);
                }
                Ok(count)
            }
            Err(e) => {
                self.stats.malformed_reports = self.stats.malformed_reports.wrapping_add(1);
                debug!("device {} report dropped: {:?}", index, e);
                Err(e.into())
            }
        }
    }
}

/// Load `T`, falling back to its factory default on any store error.
fn load_or_default<T: Persist, St: ConfigStore>(store: &mut St) -> T {
    store::load(store).unwrap_or_else(|e| {
        warn!("config record {:?} unusable: {:?}", T::KIND, e);
        T::factory_default()
    })
}
