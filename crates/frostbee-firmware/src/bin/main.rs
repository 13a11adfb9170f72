#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use log::{info, warn};
use static_cell::StaticCell;

use frostbee_core::app_state::AppState;
use frostbee_core::attributes::AttributeStore;
use frostbee_core::battery::BatteryReading;
use frostbee_core::zcl;
use frostbee_firmware::stack::StackBridge;
use frostbee_firmware::tasks::{self, App};
use frostbee_firmware::{config, hardware};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static ATTRIBUTES: StaticCell<AttributeStore> = StaticCell::new();
static APP: StaticCell<App> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = config::load();
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    info!(
        "{} {} starting, reporting every {} s",
        zcl::MANUFACTURER_NAME,
        zcl::MODEL_IDENTIFIER,
        config.report.interval.as_secs()
    );

    let sensor =
        hardware::init_sensor(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO22).await;
    let battery = hardware::init_battery(
        peripherals.ADC1,
        peripherals.GPIO2,
        peripherals.GPIO11,
        config.battery,
    );
    let button = hardware::init_button(peripherals.GPIO9);
    let led = hardware::init_status_led(peripherals.GPIO10);

    let attributes = ATTRIBUTES.init(AttributeStore::new(BatteryReading::nominal(
        &config.battery,
    )));
    let app: &'static App = APP.init(AppState::new(
        &config,
        sensor,
        battery,
        attributes,
        StackBridge,
    ));

    spawner.spawn(tasks::button_task(button, config.button).expect("button task"));
    spawner.spawn(tasks::button_action_task(app).expect("button action task"));
    spawner.spawn(tasks::report_alarm_task(app).expect("report alarm task"));
    spawner.spawn(tasks::signal_task(app).expect("signal task"));
    spawner.spawn(tasks::heartbeat_task(led).expect("heartbeat task"));

    info!("Tasks running, waiting for the network");
    warn!("No Zigbee stack linked: stack commands queue up and no join will arrive");

    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
