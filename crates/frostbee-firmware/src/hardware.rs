//! Hardware initialization for the frostbee board
//!
//! Pin assignment (ESP32-H2):
//! - GPIO12 / GPIO22: I2C0 SDA / SCL to the SHT40
//! - GPIO2: ADC1 input from the battery divider midpoint
//! - GPIO11: divider enable, open-drain, active low
//! - GPIO9: user button to ground, internal pull-up
//! - GPIO10: status LED

use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::gpio::{DriveMode, Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals::{ADC1, GPIO2, GPIO9, GPIO10, GPIO11, GPIO12, GPIO22, I2C0};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use log::{error, info, warn};

use frostbee_core::battery::{BatteryAdc, BatteryGauge, VoltageDivider};
use frostbee_core::config::BatteryConfig;
use frostbee_core::sensors::Sht40;

pub type SensorBus = I2c<'static, Async>;
pub type Sensor = Sht40<SensorBus, embassy_time::Delay>;
pub type Gauge = BatteryGauge<EspBatteryAdc, Output<'static>, embassy_time::Delay>;

/// One-shot reads on the divider ADC channel.
pub struct EspBatteryAdc {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    pin: AdcPin<GPIO2<'static>, ADC1<'static>>,
}

impl EspBatteryAdc {
    pub fn new(adc1: ADC1<'static>, input: GPIO2<'static>) -> Self {
        let mut adc_config = AdcConfig::new();
        let pin = adc_config.enable_pin(input, Attenuation::_11dB);
        Self {
            adc: Adc::new(adc1, adc_config),
            pin,
        }
    }
}

impl BatteryAdc for EspBatteryAdc {
    type Error = ();

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        nb::block!(self.adc.read_oneshot(&mut self.pin))
    }
}

/// Bring up I2C0 and probe the SHT40.
///
/// Returns `None` when the bus cannot be configured or the sensor does not
/// answer; the device then keeps running with unknown measurements.
pub async fn init_sensor(
    i2c0: I2C0<'static>,
    sda: GPIO12<'static>,
    scl: GPIO22<'static>,
) -> Option<Sensor> {
    let bus = match I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(100))) {
        Ok(bus) => bus.with_sda(sda).with_scl(scl).into_async(),
        Err(e) => {
            error!("I2C configuration failed, sensor disabled: {:?}", e);
            return None;
        }
    };

    let mut sensor = Sht40::new(bus, embassy_time::Delay);

    // A sensor left mid-measurement by a warm reset NACKs the reset itself.
    if let Err(e) = sensor.soft_reset().await {
        warn!("SHT40 soft reset failed: {}", e);
    }

    match sensor.serial_number().await {
        Ok(serial) => {
            info!("SHT40 ready, serial {:08X}", serial);
            Some(sensor)
        }
        Err(e) => {
            error!("SHT40 not responding, sensor disabled: {}", e);
            None
        }
    }
}

/// Configure the ADC channel and the divider enable line.
pub fn init_battery(
    adc1: ADC1<'static>,
    input: GPIO2<'static>,
    enable: GPIO11<'static>,
    config: BatteryConfig,
) -> Option<Gauge> {
    // Open-drain: high releases the line and the divider's pull-up keeps it off.
    let enable = Output::new(
        enable,
        Level::High,
        OutputConfig::default().with_drive_mode(DriveMode::OpenDrain),
    );

    match VoltageDivider::new(enable) {
        Ok(divider) => {
            info!("Battery gauge ready ({} samples per read)", config.samples);
            Some(BatteryGauge::new(
                EspBatteryAdc::new(adc1, input),
                divider,
                embassy_time::Delay,
                config,
            ))
        }
        Err(e) => {
            error!("Battery divider setup failed, battery disabled: {}", e);
            None
        }
    }
}

/// The user button, pulled up and shorted to ground when pressed.
pub fn init_button(pin: GPIO9<'static>) -> Input<'static> {
    Input::new(pin, InputConfig::default().with_pull(Pull::Up))
}

pub fn init_status_led(pin: GPIO10<'static>) -> Output<'static> {
    Output::new(pin, Level::Low, OutputConfig::default())
}
