//! Application state for frostbee
//!
//! [`AppState`] owns every component and is shared by reference between the
//! firmware tasks (or the simulator loop). Each external event has one entry
//! point: alarms from the stack, classified button actions, and stack signals.

use log::{error, info};

use crate::attributes::AttributeStore;
use crate::battery::BatteryMonitor;
use crate::button::ButtonAction;
use crate::config::FrostbeeConfig;
use crate::network::{Alarm, NetworkLifecycle, NetworkSignal, NetworkStack, SignalDisposition};
use crate::report::{CycleReport, ReportController};
use crate::sensors::SampleSource;

pub struct AppState<'a, S, B, N> {
    controller: ReportController<'a, S, B>,
    lifecycle: NetworkLifecycle,
    stack: N,
}

impl<'a, S, B, N> AppState<'a, S, B, N>
where
    S: SampleSource,
    B: BatteryMonitor,
    N: NetworkStack,
{
    pub fn new(
        config: &FrostbeeConfig,
        sensor: Option<S>,
        battery: Option<B>,
        attributes: &'a AttributeStore,
        stack: N,
    ) -> Self {
        Self {
            controller: ReportController::new(sensor, battery, attributes, &config.report),
            lifecycle: NetworkLifecycle::new(&config.report),
            stack,
        }
    }

    pub fn stack(&self) -> &N {
        &self.stack
    }

    pub fn attributes(&self) -> &'a AttributeStore {
        self.controller.attributes()
    }

    pub fn factory_reset_in_progress(&self) -> bool {
        self.lifecycle.factory_reset_in_progress()
    }

    /// An alarm scheduled through the stack expired.
    pub async fn on_alarm(&self, alarm: Alarm) -> CycleReport {
        match alarm {
            Alarm::ReportCycle => self.controller.run_periodic_cycle(&self.stack).await,
        }
    }

    /// The button state machine classified a press.
    pub async fn on_button(&self, action: ButtonAction) -> Option<CycleReport> {
        match action {
            ButtonAction::SensorRead => {
                info!("On-demand report cycle");
                Some(self.controller.run_cycle(&self.stack).await)
            }
            ButtonAction::FactoryReset => {
                if let Err(e) = self.lifecycle.request_factory_reset(&self.stack) {
                    error!("Factory reset not started, press again to retry: {}", e);
                }
                None
            }
        }
    }

    /// The stack raised a signal.
    pub fn on_signal(&self, signal: NetworkSignal) -> SignalDisposition {
        self.lifecycle.handle_signal(signal, &self.stack)
    }
}
