//! Build-time configuration overrides.
//!
//! `build.rs` forwards `FROSTBEE_*` entries from `.env` as compile-time
//! environment variables. Anything missing or unparsable falls back to the
//! defaults from `frostbee_core::config`.

use embassy_time::Duration;
use frostbee_core::config::{BatteryConfig, FrostbeeConfig, Ratio};
use log::warn;

/// ADC reference of the ESP32-H2 SAR ADC in millivolts.
const ADC_REFERENCE_MV: u32 = 1_100;

/// Input scaling at 11 dB attenuation.
const ADC_GAIN: Ratio = Ratio::new(1, 3);

/// Resolve the configuration baked into this build.
pub fn load() -> FrostbeeConfig {
    let mut config = FrostbeeConfig {
        battery: BatteryConfig {
            reference_mv: ADC_REFERENCE_MV,
            gain: ADC_GAIN,
            ..BatteryConfig::DEFAULT
        },
        ..FrostbeeConfig::DEFAULT
    };

    if let Some(secs) = parse(
        "FROSTBEE_REPORT_INTERVAL_SECS",
        option_env!("FROSTBEE_REPORT_INTERVAL_SECS"),
    ) {
        if secs == 0 {
            warn!("FROSTBEE_REPORT_INTERVAL_SECS must be non-zero, keeping default");
        } else {
            config.report.interval = Duration::from_secs(u64::from(secs));
        }
    }

    let empty_mv = parse(
        "FROSTBEE_BATTERY_EMPTY_MV",
        option_env!("FROSTBEE_BATTERY_EMPTY_MV"),
    )
    .unwrap_or(config.battery.empty_mv);
    let full_mv = parse(
        "FROSTBEE_BATTERY_FULL_MV",
        option_env!("FROSTBEE_BATTERY_FULL_MV"),
    )
    .unwrap_or(config.battery.full_mv);

    if empty_mv < full_mv {
        config.battery.empty_mv = empty_mv;
        config.battery.full_mv = full_mv;
    } else {
        warn!(
            "Battery range {}..{} mV is empty, keeping {}..{} mV",
            empty_mv, full_mv, config.battery.empty_mv, config.battery.full_mv
        );
    }

    config
}

fn parse(name: &str, value: Option<&str>) -> Option<u32> {
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", name, value);
            None
        }
    }
}
