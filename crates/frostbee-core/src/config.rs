//! Tunable constants for the device
//!
//! Everything here is plain `Copy` data with a `const DEFAULT`, so the firmware
//! can build its configuration in a `const` context and override individual
//! fields from build-time environment values.

use embassy_time::Duration;

/// Timing of the periodic report cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportConfig {
    /// Delay between two periodic cycles.
    pub interval: Duration,
    /// Delay between the "joined network" signal and the first cycle.
    pub first_report_delay: Duration,
}

impl ReportConfig {
    pub const DEFAULT: Self = Self {
        interval: Duration::from_secs(60),
        first_report_delay: Duration::from_secs(5),
    };
}

/// Timing thresholds of the button state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConfig {
    /// Settle delay after the last edge before the pin level is trusted.
    pub debounce: Duration,
    /// Releases held for less than this trigger an on-demand read.
    pub short_press: Duration,
    /// Holding for this long triggers a factory reset.
    pub long_press: Duration,
}

impl ButtonConfig {
    pub const DEFAULT: Self = Self {
        debounce: Duration::from_millis(50),
        short_press: Duration::from_millis(1000),
        long_press: Duration::from_millis(5000),
    };
}

/// A ratio expressed as `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

/// ADC front-end and battery pack description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryConfig {
    /// Number of raw samples taken per reading. Must be at least 3.
    pub samples: usize,
    /// Time the divider filter capacitor needs to charge after enabling.
    pub settle_delay_us: u32,
    /// Pause between two consecutive ADC samples.
    pub inter_sample_delay_us: u32,
    /// ADC resolution in bits.
    pub resolution_bits: u8,
    /// ADC reference voltage in millivolts.
    pub reference_mv: u32,
    /// Programmed ADC input gain. Full scale is `reference_mv / gain`.
    pub gain: Ratio,
    /// Battery voltage over pin voltage.
    pub divider: Ratio,
    /// Battery voltage considered empty (0 %).
    pub empty_mv: u32,
    /// Battery voltage considered full (100 %).
    pub full_mv: u32,
}

impl BatteryConfig {
    /// Single Li-ion cell behind a 1:2 divider, 600 mV reference with 1/6 gain.
    pub const DEFAULT: Self = Self {
        samples: 5,
        settle_delay_us: 2_000,
        inter_sample_delay_us: 100,
        resolution_bits: 12,
        reference_mv: 600,
        gain: Ratio::new(1, 6),
        divider: Ratio::new(2, 1),
        empty_mv: 3_000,
        full_mv: 4_200,
    };

    /// Largest code the ADC can return.
    pub const fn max_code(&self) -> u32 {
        (1u32 << self.resolution_bits) - 1
    }

    /// Voltage at the ADC pin that maps to `max_code`.
    pub const fn full_scale_mv(&self) -> u32 {
        self.reference_mv * self.gain.denominator / self.gain.numerator
    }
}

/// Complete device configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrostbeeConfig {
    pub report: ReportConfig,
    pub button: ButtonConfig,
    pub battery: BatteryConfig,
}

impl FrostbeeConfig {
    pub const DEFAULT: Self = Self {
        report: ReportConfig::DEFAULT,
        button: ButtonConfig::DEFAULT,
        battery: BatteryConfig::DEFAULT,
    };
}

impl Default for FrostbeeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
