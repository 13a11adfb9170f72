//! Bridge between `frostbee_core` and the Zigbee stack integration.
//!
//! This tree does not contain a Zigbee stack. Nothing here drains
//! [`STACK_COMMANDS`] or [`CONTROL_COMMANDS`], and nothing feeds
//! [`NETWORK_SIGNALS`], so until a stack integration is linked in the device
//! never sees [`NetworkSignal::Joined`] and never starts reporting. The
//! integration must consume both command queues and push its signals into
//! [`NETWORK_SIGNALS`]. The report alarm lives on the embassy timer through
//! [`REPORT_ALARM`].

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use log::{info, warn};

use frostbee_core::network::{Alarm, NetworkSignal, NetworkStack, StackError};
use frostbee_core::zcl::{AttributeValue, ClusterId};

const COMMAND_QUEUE_DEPTH: usize = 8;
const CONTROL_QUEUE_DEPTH: usize = 2;
const SIGNAL_QUEUE_DEPTH: usize = 4;

/// Requests for the Zigbee stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCommand {
    SetAttribute {
        endpoint: u8,
        cluster: ClusterId,
        attribute: u16,
        value: AttributeValue,
    },
    /// The core passed on this signal; apply the stack's default handling.
    DefaultHandling(NetworkSignal),
}

/// The leave sequence, kept apart from attribute traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ErasePersistentStorage(bool),
    LeaveNetwork,
}

/// Delay until the next report cycle. Signalling again replaces it.
pub static REPORT_ALARM: Signal<CriticalSectionRawMutex, Duration> = Signal::new();

pub static STACK_COMMANDS: Channel<CriticalSectionRawMutex, StackCommand, COMMAND_QUEUE_DEPTH> =
    Channel::new();

pub static CONTROL_COMMANDS: Channel<CriticalSectionRawMutex, ControlCommand, CONTROL_QUEUE_DEPTH> =
    Channel::new();

pub static NETWORK_SIGNALS: Channel<CriticalSectionRawMutex, NetworkSignal, SIGNAL_QUEUE_DEPTH> =
    Channel::new();

/// [`NetworkStack`] over the static queues above.
#[derive(Debug, Default, Clone, Copy)]
pub struct StackBridge;

impl StackBridge {
    fn submit(&self, command: StackCommand) {
        if STACK_COMMANDS.try_send(command).is_err() {
            warn!("Stack command queue full, dropping {:?}", command);
        }
    }

    fn submit_control(&self, command: ControlCommand, request: &'static str) -> Result<(), StackError> {
        CONTROL_COMMANDS
            .try_send(command)
            .map_err(|_| StackError::Rejected { request })
    }
}

impl NetworkStack for StackBridge {
    fn schedule_alarm(&self, alarm: Alarm, delay: Duration) {
        match alarm {
            Alarm::ReportCycle => REPORT_ALARM.signal(delay),
        }
    }

    fn set_attribute(&self, endpoint: u8, cluster: ClusterId, attribute: u16, value: AttributeValue) {
        self.submit(StackCommand::SetAttribute {
            endpoint,
            cluster,
            attribute,
            value,
        });
    }

    fn erase_persistent_storage(&self, erase: bool) -> Result<(), StackError> {
        self.submit_control(ControlCommand::ErasePersistentStorage(erase), "erase")
    }

    fn leave_network(&self) -> Result<(), StackError> {
        self.submit_control(ControlCommand::LeaveNetwork, "leave")
    }

    fn reboot(&self) {
        info!("Rebooting");
        esp_hal::system::software_reset();
    }
}
