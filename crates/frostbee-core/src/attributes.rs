//! Attribute storage shared with the reporting engine
//!
//! Single writer (the report cycle controller), many readers (the network
//! stack's reporting engine, diagnostics). Every attribute sits in its own
//! atomic so a reader never observes a torn value.

use core::sync::atomic::{AtomicI16, AtomicU8, AtomicU16, Ordering};

use crate::battery::BatteryReading;
use crate::sensors::SensorSample;
use crate::zcl::{Attribute, AttributeValue, HUMIDITY_UNKNOWN, TEMPERATURE_UNKNOWN};

/// Last written value of every reportable attribute.
pub struct AttributeStore {
    temperature: AtomicI16,
    humidity: AtomicU16,
    battery_voltage: AtomicU8,
    battery_percentage: AtomicU8,
}

/// Plain copy of the store at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSnapshot {
    pub temperature: i16,
    pub humidity: u16,
    pub battery_voltage: u8,
    pub battery_percentage: u8,
}

impl AttributeStore {
    /// Unknown sensor values and the given nominal battery reading.
    pub const fn new(nominal_battery: BatteryReading) -> Self {
        Self {
            temperature: AtomicI16::new(TEMPERATURE_UNKNOWN),
            humidity: AtomicU16::new(HUMIDITY_UNKNOWN),
            battery_voltage: AtomicU8::new(nominal_battery.voltage),
            battery_percentage: AtomicU8::new(nominal_battery.percentage),
        }
    }

    /// Store `value`. A payload of the wrong width is rejected and logged.
    pub fn set(&self, attribute: Attribute, value: AttributeValue) {
        match (attribute, value) {
            (Attribute::Temperature, AttributeValue::I16(v)) => {
                self.temperature.store(v, Ordering::Release)
            }
            (Attribute::Humidity, AttributeValue::U16(v)) => {
                self.humidity.store(v, Ordering::Release)
            }
            (Attribute::BatteryVoltage, AttributeValue::U8(v)) => {
                self.battery_voltage.store(v, Ordering::Release)
            }
            (Attribute::BatteryPercentage, AttributeValue::U8(v)) => {
                self.battery_percentage.store(v, Ordering::Release)
            }
            (attribute, value) => {
                log::error!("Type mismatch writing {:?}: {:?}", attribute, value);
            }
        }
    }

    pub fn get(&self, attribute: Attribute) -> AttributeValue {
        match attribute {
            Attribute::Temperature => AttributeValue::I16(self.temperature.load(Ordering::Acquire)),
            Attribute::Humidity => AttributeValue::U16(self.humidity.load(Ordering::Acquire)),
            Attribute::BatteryVoltage => {
                AttributeValue::U8(self.battery_voltage.load(Ordering::Acquire))
            }
            Attribute::BatteryPercentage => {
                AttributeValue::U8(self.battery_percentage.load(Ordering::Acquire))
            }
        }
    }

    pub fn snapshot(&self) -> AttributeSnapshot {
        AttributeSnapshot {
            temperature: self.temperature.load(Ordering::Acquire),
            humidity: self.humidity.load(Ordering::Acquire),
            battery_voltage: self.battery_voltage.load(Ordering::Acquire),
            battery_percentage: self.battery_percentage.load(Ordering::Acquire),
        }
    }
}

impl SensorSample {
    /// Attribute writes for this sample.
    pub const fn attribute_values(&self) -> [(Attribute, AttributeValue); 2] {
        [
            (Attribute::Temperature, AttributeValue::I16(self.temperature)),
            (Attribute::Humidity, AttributeValue::U16(self.humidity)),
        ]
    }
}

impl BatteryReading {
    /// Attribute writes for this reading. Both come from the same measurement.
    pub const fn attribute_values(&self) -> [(Attribute, AttributeValue); 2] {
        [
            (Attribute::BatteryVoltage, AttributeValue::U8(self.voltage)),
            (Attribute::BatteryPercentage, AttributeValue::U8(self.percentage)),
        ]
    }
}
