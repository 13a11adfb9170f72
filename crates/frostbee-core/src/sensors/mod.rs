//! Sample acquisition
//!
//! A [`SampleSource`] is the transport boundary: it hands back raw sensor
//! ticks or a transport failure. The [`SampleAcquirer`] turns those ticks
//! into a validated [`SensorSample`] in ZCL units. It never retries; a failed
//! fetch simply means this cycle has nothing to report.

mod sht40;

pub use sht40::{Sht40, Sht40Error};

use thiserror_no_std::Error;

/// Lowest temperature the sensor is specified for, in 0.01 °C.
pub const TEMPERATURE_MIN: i32 = -4_000;
/// Highest temperature the sensor is specified for, in 0.01 °C.
pub const TEMPERATURE_MAX: i32 = 12_500;
/// Humidity bounds, in 0.01 %RH.
pub const HUMIDITY_MIN: i32 = 0;
pub const HUMIDITY_MAX: i32 = 10_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    #[error("{sensor} is not ready")]
    NotReady { sensor: &'static str },
    #[error("{sensor} failed to {operation}: {details}")]
    Transport {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} reported {value} outside of its physical range")]
    OutOfRange { sensor: &'static str, value: i32 },
}

/// Unconverted sensor output: 16-bit ticks spanning the full conversion range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub temperature: u16,
    pub humidity: u16,
}

/// Trait for transports able to fetch one raw temperature/humidity sample.
pub trait SampleSource {
    /// Run one measurement and return the raw ticks.
    fn fetch_sample(&mut self) -> impl Future<Output = Result<RawSample, FetchError>>;
}

/// Most recent temperature/humidity measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSample {
    /// Hundredths of a degree Celsius.
    pub temperature: i16,
    /// Hundredths of a percent relative humidity.
    pub humidity: u16,
    pub valid: bool,
}

impl SensorSample {
    /// Convert raw ticks: T = -45 + 175 * raw / 65535, RH = -6 + 125 * raw / 65535.
    ///
    /// Humidity is clamped to 0..100 %RH; a temperature outside the specified
    /// range is rejected.
    pub fn from_raw(raw: RawSample) -> Result<Self, FetchError> {
        let temperature = -4_500 + scale(raw.temperature, 17_500);
        if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temperature) {
            return Err(FetchError::OutOfRange {
                sensor: "SHT40",
                value: temperature,
            });
        }

        let humidity = (-600 + scale(raw.humidity, 12_500)).clamp(HUMIDITY_MIN, HUMIDITY_MAX);

        Ok(Self {
            temperature: temperature as i16,
            humidity: humidity as u16,
            valid: true,
        })
    }
}

/// `raw / 65535 * span`, rounded to nearest.
fn scale(raw: u16, span: i32) -> i32 {
    (span * i32::from(raw) + 32_767) / 65_535
}

/// Wraps a [`SampleSource`] and validates everything it produces.
pub struct SampleAcquirer<S> {
    source: S,
}

impl<S: SampleSource> SampleAcquirer<S> {
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Fetch and convert one sample.
    pub async fn fetch(&mut self) -> Result<SensorSample, FetchError> {
        let raw = self.source.fetch_sample().await?;
        let sample = SensorSample::from_raw(raw)?;

        log::debug!(
            "Sample: {}.{:02} C, {}.{:02} %RH",
            sample.temperature / 100,
            (sample.temperature % 100).unsigned_abs(),
            sample.humidity / 100,
            sample.humidity % 100
        );

        Ok(sample)
    }
}
