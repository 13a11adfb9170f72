//! Report cycle controller
//!
//! A cycle fetches one sensor sample and one battery reading, then writes
//! whatever succeeded into the [`AttributeStore`] and hands it to the stack's
//! reporting engine. Failed parts are skipped; the stored value stays at the
//! last good one.
//!
//! The sensor and the battery gauge are single-owner resources, so they live
//! inside an async mutex. Periodic and button-triggered cycles both go through
//! it and therefore run one after the other, never interleaved.
//!
//! Only the periodic path re-arms the periodic alarm, and it does so from a
//! drop guard so no exit path can forget it.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::Duration;
use log::{info, warn};

use crate::attributes::AttributeStore;
use crate::battery::{BatteryMonitor, BatteryReading, GaugeError};
use crate::config::ReportConfig;
use crate::network::{Alarm, NetworkStack};
use crate::sensors::{FetchError, SampleAcquirer, SampleSource, SensorSample};
use crate::zcl::{Attribute, AttributeValue, ENDPOINT};

/// Outcome of one report cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub sample: Result<SensorSample, FetchError>,
    pub battery: Result<BatteryReading, GaugeError>,
}

/// Resources only touched while holding the acquisition lock.
struct Acquisition<S, B> {
    sensor: Option<SampleAcquirer<S>>,
    battery: Option<B>,
}

impl<S: SampleSource, B: BatteryMonitor> Acquisition<S, B> {
    async fn fetch_sample(&mut self) -> Result<SensorSample, FetchError> {
        match self.sensor.as_mut() {
            Some(sensor) => sensor.fetch().await,
            None => Err(FetchError::NotReady { sensor: "SHT40" }),
        }
    }

    fn read_battery(&mut self) -> Result<BatteryReading, GaugeError> {
        match self.battery.as_mut() {
            Some(battery) => battery.read(),
            None => Err(GaugeError::Unavailable),
        }
    }
}

pub struct ReportController<'a, S, B> {
    acquisition: AsyncMutex<CriticalSectionRawMutex, Acquisition<S, B>>,
    attributes: &'a AttributeStore,
    interval: Duration,
}

impl<'a, S: SampleSource, B: BatteryMonitor> ReportController<'a, S, B> {
    /// A `None` sensor or battery is a subsystem disabled at boot; cycles skip it.
    pub fn new(
        sensor: Option<S>,
        battery: Option<B>,
        attributes: &'a AttributeStore,
        config: &ReportConfig,
    ) -> Self {
        if sensor.is_none() {
            warn!("Sensor disabled, temperature and humidity will not be reported");
        }
        if battery.is_none() {
            warn!("Battery gauge disabled, battery level will not be reported");
        }

        Self {
            acquisition: AsyncMutex::new(Acquisition {
                sensor: sensor.map(SampleAcquirer::new),
                battery,
            }),
            attributes,
            interval: config.interval,
        }
    }

    pub fn attributes(&self) -> &'a AttributeStore {
        self.attributes
    }

    /// Run one cycle. Waits for a cycle already in progress to finish first.
    pub async fn run_cycle<N: NetworkStack>(&self, stack: &N) -> CycleReport {
        let mut acquisition = self.acquisition.lock().await;

        let sample = acquisition.fetch_sample().await;
        let battery = acquisition.read_battery();

        match &sample {
            Ok(sample) => self.publish(stack, &sample.attribute_values()),
            Err(e) => warn!("Skipping temperature/humidity update: {}", e),
        }
        match &battery {
            Ok(reading) => self.publish(stack, &reading.attribute_values()),
            Err(e) => warn!("Skipping battery update: {}", e),
        }

        if let (Ok(sample), Ok(reading)) = (&sample, &battery) {
            info!(
                "Reported {} cC, {} c%RH, battery {} x100mV {}/200",
                sample.temperature, sample.humidity, reading.voltage, reading.percentage
            );
        }

        CycleReport { sample, battery }
    }

    /// Run one cycle and schedule the next one, whatever the outcome.
    pub async fn run_periodic_cycle<N: NetworkStack>(&self, stack: &N) -> CycleReport {
        let _next = Reschedule {
            stack,
            delay: self.interval,
        };
        self.run_cycle(stack).await
    }

    fn publish<N: NetworkStack>(&self, stack: &N, values: &[(Attribute, AttributeValue)]) {
        for &(attribute, value) in values {
            self.attributes.set(attribute, value);
            stack.set_attribute(ENDPOINT, attribute.cluster(), attribute.id(), value);
        }
    }
}

/// Schedules the next periodic cycle when dropped.
struct Reschedule<'a, N: NetworkStack> {
    stack: &'a N,
    delay: Duration,
}

impl<N: NetworkStack> Drop for Reschedule<'_, N> {
    fn drop(&mut self) {
        self.stack.schedule_alarm(Alarm::ReportCycle, self.delay);
    }
}
