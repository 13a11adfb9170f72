//! Boundary to the Zigbee stack and the network lifecycle adapter
//!
//! The stack itself (joining, routing, security, persistence, reporting) lives
//! outside this crate. The core drives it through [`NetworkStack`] and is
//! driven by it through [`NetworkSignal`]s handed to [`NetworkLifecycle`].

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::Duration;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::config::ReportConfig;
use crate::zcl::{AttributeValue, ClusterId};

/// Deferred work the stack runs on the core's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    /// Run a periodic report cycle.
    ReportCycle,
}

/// A request the stack did not accept.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    #[error("stack did not accept the {request} request")]
    Rejected { request: &'static str },
}

/// Operations the core needs from the Zigbee stack.
///
/// Methods take `&self`: the stack is shared between the button, timer and
/// signal paths and is expected to queue requests internally. Attribute
/// updates are best effort since the next cycle republishes them; the leave
/// sequence must report whether it was accepted.
pub trait NetworkStack {
    /// Run `alarm` after `delay`. A pending alarm of the same kind is replaced.
    fn schedule_alarm(&self, alarm: Alarm, delay: Duration);

    /// Publish a new attribute value to the stack's reporting engine.
    fn set_attribute(&self, endpoint: u8, cluster: ClusterId, attribute: u16, value: AttributeValue);

    /// Whether the next leave wipes the stored network credentials.
    fn erase_persistent_storage(&self, erase: bool) -> Result<(), StackError>;

    /// Leave the current network. Completion arrives as [`NetworkSignal::Leave`].
    fn leave_network(&self) -> Result<(), StackError>;

    /// Cold restart of the device.
    fn reboot(&self);
}

/// Stack events the core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSignal {
    /// Joined or rejoined a network.
    Joined,
    /// Finished leaving the network.
    Leave,
    /// Anything else, by stack-specific signal id.
    Other(u16),
}

/// Who finishes handling a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDisposition {
    Handled,
    /// The stack applies its default handling.
    Default,
}

/// Starts reporting on join and turns a requested factory reset into a reboot.
pub struct NetworkLifecycle {
    factory_reset: AtomicBool,
    first_report_delay: Duration,
}

impl NetworkLifecycle {
    pub const fn new(config: &ReportConfig) -> Self {
        Self {
            factory_reset: AtomicBool::new(false),
            first_report_delay: config.first_report_delay,
        }
    }

    pub fn factory_reset_in_progress(&self) -> bool {
        self.factory_reset.load(Ordering::Acquire)
    }

    /// Wipe the network credentials and leave. The reboot follows the leave signal.
    ///
    /// If the stack refuses either request the reset is not in progress and a
    /// later request starts over.
    pub fn request_factory_reset<N: NetworkStack>(&self, stack: &N) -> Result<(), StackError> {
        if self
            .factory_reset
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Factory reset already in progress");
            return Ok(());
        }

        info!("Factory reset: erasing network state and leaving");
        let requested = stack
            .erase_persistent_storage(true)
            .and_then(|()| stack.leave_network());
        if requested.is_err() {
            self.factory_reset.store(false, Ordering::Release);
        }
        requested
    }

    pub fn handle_signal<N: NetworkStack>(&self, signal: NetworkSignal, stack: &N) -> SignalDisposition {
        match signal {
            NetworkSignal::Joined => {
                info!(
                    "Joined network, first report in {} ms",
                    self.first_report_delay.as_millis()
                );
                stack.schedule_alarm(Alarm::ReportCycle, self.first_report_delay);
                SignalDisposition::Handled
            }
            NetworkSignal::Leave if self.factory_reset_in_progress() => {
                info!("Left network after factory reset, rebooting");
                stack.reboot();
                SignalDisposition::Handled
            }
            NetworkSignal::Leave | NetworkSignal::Other(_) => SignalDisposition::Default,
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    extern crate std;

    use super::*;
    use core::cell::RefCell;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StackCall {
        ScheduleAlarm(Alarm, Duration),
        SetAttribute(u8, ClusterId, u16, AttributeValue),
        ErasePersistentStorage(bool),
        LeaveNetwork,
        Reboot,
    }

    /// Refuses the leave sequence, as a stack with a full request queue would.
    #[derive(Default)]
    pub struct FullQueueStack;

    impl NetworkStack for FullQueueStack {
        fn schedule_alarm(&self, _alarm: Alarm, _delay: Duration) {}

        fn set_attribute(&self, _endpoint: u8, _cluster: ClusterId, _attribute: u16, _value: AttributeValue) {}

        fn erase_persistent_storage(&self, _erase: bool) -> Result<(), StackError> {
            Err(StackError::Rejected { request: "erase" })
        }

        fn leave_network(&self) -> Result<(), StackError> {
            Err(StackError::Rejected { request: "leave" })
        }

        fn reboot(&self) {}
    }

    /// Records every call in order.
    #[derive(Default)]
    pub struct RecordingStack {
        pub calls: RefCell<Vec<StackCall>>,
    }

    impl RecordingStack {
        pub fn take(&self) -> Vec<StackCall> {
            self.calls.take()
        }
    }

    impl NetworkStack for RecordingStack {
        fn schedule_alarm(&self, alarm: Alarm, delay: Duration) {
            self.calls
                .borrow_mut()
                .push(StackCall::ScheduleAlarm(alarm, delay));
        }

        fn set_attribute(&self, endpoint: u8, cluster: ClusterId, attribute: u16, value: AttributeValue) {
            self.calls
                .borrow_mut()
                .push(StackCall::SetAttribute(endpoint, cluster, attribute, value));
        }

        fn erase_persistent_storage(&self, erase: bool) -> Result<(), StackError> {
            self.calls
                .borrow_mut()
                .push(StackCall::ErasePersistentStorage(erase));
            Ok(())
        }

        fn leave_network(&self) -> Result<(), StackError> {
            self.calls.borrow_mut().push(StackCall::LeaveNetwork);
            Ok(())
        }

        fn reboot(&self) {
            self.calls.borrow_mut().push(StackCall::Reboot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{FullQueueStack, RecordingStack, StackCall};
    use super::*;

    fn lifecycle() -> NetworkLifecycle {
        NetworkLifecycle::new(&ReportConfig::DEFAULT)
    }

    #[test]
    fn test_join_schedules_first_report() {
        let stack = RecordingStack::default();

        let disposition = lifecycle().handle_signal(NetworkSignal::Joined, &stack);

        assert_eq!(disposition, SignalDisposition::Handled);
        assert_eq!(
            stack.take(),
            [StackCall::ScheduleAlarm(Alarm::ReportCycle, Duration::from_secs(5))]
        );
    }

    #[test]
    fn test_unrequested_leave_is_delegated() {
        let stack = RecordingStack::default();

        let disposition = lifecycle().handle_signal(NetworkSignal::Leave, &stack);

        assert_eq!(disposition, SignalDisposition::Default);
        assert!(stack.take().is_empty());
    }

    #[test]
    fn test_other_signals_are_delegated() {
        let stack = RecordingStack::default();

        let disposition = lifecycle().handle_signal(NetworkSignal::Other(0x17), &stack);

        assert_eq!(disposition, SignalDisposition::Default);
        assert!(stack.take().is_empty());
    }

    #[test]
    fn test_factory_reset_then_leave_reboots() {
        let stack = RecordingStack::default();
        let lifecycle = lifecycle();

        assert_eq!(lifecycle.request_factory_reset(&stack), Ok(()));
        assert!(lifecycle.factory_reset_in_progress());
        assert_eq!(
            stack.take(),
            [StackCall::ErasePersistentStorage(true), StackCall::LeaveNetwork]
        );

        let disposition = lifecycle.handle_signal(NetworkSignal::Leave, &stack);
        assert_eq!(disposition, SignalDisposition::Handled);
        assert_eq!(stack.take(), [StackCall::Reboot]);
    }

    #[test]
    fn test_repeated_factory_reset_only_leaves_once() {
        let stack = RecordingStack::default();
        let lifecycle = lifecycle();

        assert_eq!(lifecycle.request_factory_reset(&stack), Ok(()));
        assert_eq!(lifecycle.request_factory_reset(&stack), Ok(()));

        assert_eq!(stack.take().len(), 2);
    }

    #[test]
    fn test_rejected_factory_reset_can_be_retried() {
        let lifecycle = lifecycle();

        assert_eq!(
            lifecycle.request_factory_reset(&FullQueueStack),
            Err(StackError::Rejected { request: "erase" })
        );
        assert!(!lifecycle.factory_reset_in_progress());

        let stack = RecordingStack::default();
        assert_eq!(lifecycle.request_factory_reset(&stack), Ok(()));
        assert!(lifecycle.factory_reset_in_progress());
        assert_eq!(
            stack.take(),
            [StackCall::ErasePersistentStorage(true), StackCall::LeaveNetwork]
        );
    }

    #[test]
    fn test_leave_after_rejected_reset_is_delegated() {
        let lifecycle = lifecycle();
        let _ = lifecycle.request_factory_reset(&FullQueueStack);

        let stack = RecordingStack::default();
        let disposition = lifecycle.handle_signal(NetworkSignal::Leave, &stack);

        assert_eq!(disposition, SignalDisposition::Default);
        assert!(stack.take().is_empty());
    }
}
