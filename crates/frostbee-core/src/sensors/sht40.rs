use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{Error as _, ErrorKind, I2c};
use log::error;
use sht4x::{Precision, Sht4xAsync};
use thiserror_no_std::Error;

use super::{FetchError, RawSample, SampleSource};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sht40Error {
    #[error("I2C transfer failed: {0:?}")]
    I2c(ErrorKind),
    #[error("CRC mismatch in sensor response")]
    Crc,
}

impl<E: embedded_hal_async::i2c::Error> From<sht4x::Error<E>> for Sht40Error {
    fn from(e: sht4x::Error<E>) -> Self {
        match e {
            sht4x::Error::I2c(e) => Self::I2c(e.kind()),
            // Non-exhaustive upstream; only the CRC check is left.
            _ => Self::Crc,
        }
    }
}

/// SHT40 temperature/humidity sensor on an async I2C bus, at the default
/// 0x44 address.
pub struct Sht40<I, D> {
    sensor: Sht4xAsync<I, D>,
    delay: D,
}

impl<I: I2c, D: DelayNs> Sht40<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            sensor: Sht4xAsync::new(i2c),
            delay,
        }
    }

    /// Return the sensor to its power-up state. Also clears a half-finished
    /// transfer left over from a brown-out.
    pub async fn soft_reset(&mut self) -> Result<(), Sht40Error> {
        Ok(self.sensor.soft_reset(&mut self.delay).await?)
    }

    /// Read the 32-bit factory serial number. Used as a presence check at boot.
    pub async fn serial_number(&mut self) -> Result<u32, Sht40Error> {
        Ok(self.sensor.serial_number(&mut self.delay).await?)
    }

    /// Run one high precision measurement.
    pub async fn measure(&mut self) -> Result<RawSample, Sht40Error> {
        let data = self
            .sensor
            .measure_raw(Precision::High, &mut self.delay)
            .await?;
        Ok(RawSample {
            temperature: data.temperature,
            humidity: data.humidity,
        })
    }
}

impl<I: I2c, D: DelayNs> SampleSource for Sht40<I, D> {
    async fn fetch_sample(&mut self) -> Result<RawSample, FetchError> {
        self.measure().await.map_err(|e| {
            error!("SHT40 measurement failed: {}", e);
            match e {
                Sht40Error::I2c(ErrorKind::NoAcknowledge(_)) => FetchError::NotReady { sensor: "SHT40" },
                Sht40Error::I2c(_) => FetchError::Transport {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "I2C communication error",
                },
                Sht40Error::Crc => FetchError::Transport {
                    sensor: "SHT40",
                    operation: "measure temperature/humidity",
                    details: "CRC mismatch",
                },
            }
        })
    }
}
