//! ESP32-H2 firmware-specific modules for frostbee
//!
//! Everything here touches real peripherals and cannot build for the host:
//! I2C and ADC bring-up, the bridge to the Zigbee stack, and the embassy
//! tasks that drive the hardware-independent logic in `frostbee_core`.

#![no_std]

pub mod config;
pub mod hardware;
pub mod stack;
pub mod tasks;
