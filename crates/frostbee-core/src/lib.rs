//! Hardware-independent core library for frostbee
//!
//! This crate contains the platform-agnostic logic of the frostbee sleepy
//! end device: the sample acquirer and SHT40 transport, the battery gauge,
//! the button state machine, the report cycle controller and the network
//! lifecycle adapter, plus the Zigbee attribute model they write into.
//!
//! It is `#![no_std]` so it compiles on both the embedded target (ESP32-H2)
//! and desktop hosts (for the simulator and tests).

#![no_std]

pub mod app_state;
pub mod attributes;
pub mod battery;
pub mod button;
pub mod config;
pub mod network;
pub mod report;
pub mod sensors;
pub mod zcl;
