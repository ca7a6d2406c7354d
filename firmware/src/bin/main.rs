#![no_std]
#![no_main]

use defmt::{error, info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32::bind_interrupts;
use embassy_stm32::can::{self, Can};
use embassy_stm32::peripherals::CAN1;
use embassy_stm32::usart::{self, UartTx};
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Ticker};
use hidcan_core::CanConfig;
use hidcan_firmware::transport::bit_timing;
use hidcan_firmware::{
    dispatch, BridgePipeline, BxCan, HostChannel, HostReceiver, NullStore, Pipeline, UartSerial,
};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    CAN1_RX0 => can::Rx0InterruptHandler<CAN1>;
    CAN1_RX1 => can::Rx1InterruptHandler<CAN1>;
    CAN1_SCE => can::SceInterruptHandler<CAN1>;
    CAN1_TX => can::TxInterruptHandler<CAN1>;
});

/// Device notifications from the USB host driver to the pipeline task.
static HOST_EVENTS: StaticCell<HostChannel> = StaticCell::new();

/// Pipeline tick period.
const TICK: Duration = Duration::from_millis(1);

/// How often the status snapshot is logged.
const STATUS_PERIOD: Duration = Duration::from_secs(5);

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("HID-to-Serial/CAN bridge starting...");

    let p = embassy_stm32::init(embassy_stm32::Config::default());

    // The USB host driver publishes through a `HostNotifier` on this channel.
    let events: &'static HostChannel = HOST_EVENTS.init(Channel::new());

    // --- Serial sink: USART2 TX on PA2 ---
    let tx = match UartTx::new_blocking(p.USART2, p.PA2, usart::Config::default()) {
        Ok(tx) => tx,
        Err(e) => {
            error!("USART2 init failed: {:?}", e);
            return;
        }
    };

    // --- CAN sink: CAN1 on PD0 (RX) / PD1 (TX); PA11/PA12 belong to USB OTG FS ---
    let pclk1 = embassy_stm32::rcc::frequency::<CAN1>().0;
    let timing = match bit_timing(&CanConfig::default(), pclk1) {
        Ok(timing) => timing,
        Err(e) => {
            error!("no CAN bit timing for {} Hz: {:?}", pclk1, e);
            return;
        }
    };
    let mut can = Can::new(p.CAN1, p.PD0, p.PD1, Irqs);
    can.modify_config().set_bit_timing(timing);
    can.enable().await;

    // No persistent medium on this board yet; every boot starts from defaults.
    let pipeline = match Pipeline::from_store(UartSerial::new(tx), BxCan::new(can, pclk1), &mut NullStore) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("pipeline init failed: {:?}", e);
            return;
        }
    };

    spawner.spawn(pipeline_task(pipeline, events.receiver()).unwrap());

    info!("bridge initialized, waiting for devices...");
}

/// Pipeline task - applies host notifications and runs the tick.
#[embassy_executor::task]
async fn pipeline_task(mut pipeline: BridgePipeline, events: HostReceiver) {
    let mut ticker = Ticker::every(TICK);
    let mut next_status = Instant::now() + STATUS_PERIOD;

    loop {
        while let Ok(event) = events.try_receive() {
            if let Err(e) = dispatch(&mut pipeline, event) {
                warn!("host event rejected: {:?}", e);
            }
        }

        pipeline.tick();

        if Instant::now() >= next_status {
            next_status += STATUS_PERIOD;
            info!("status: {:?}", pipeline.status());
        }

        ticker.next().await;
    }
}
