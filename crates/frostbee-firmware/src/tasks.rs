//! Embassy tasks that feed hardware and stack events into [`App`].

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};
use esp_hal::gpio::{Input, Output};
use log::{debug, info};

use frostbee_core::app_state::AppState;
use frostbee_core::button::{ButtonAction, ButtonMachine};
use frostbee_core::config::ButtonConfig;
use frostbee_core::network::{Alarm, SignalDisposition};
use frostbee_core::report::CycleReport;

use crate::hardware::{Gauge, Sensor};
use crate::stack::{NETWORK_SIGNALS, REPORT_ALARM, STACK_COMMANDS, StackBridge, StackCommand};

pub type App = AppState<'static, Sensor, Gauge, StackBridge>;

static BUTTON_ACTIONS: Channel<CriticalSectionRawMutex, ButtonAction, 2> = Channel::new();
static HEARTBEAT: Signal<CriticalSectionRawMutex, ()> = Signal::new();

fn after_cycle(report: &CycleReport) {
    match &report.sample {
        Ok(_) => HEARTBEAT.signal(()),
        Err(e) => debug!("No heartbeat, sample failed: {}", e),
    }
}

/// Debounce and classify the user button.
#[embassy_executor::task]
pub async fn button_task(mut button: Input<'static>, config: ButtonConfig) {
    let mut machine = ButtonMachine::new(config, button.is_low());

    loop {
        let action = match machine.next_deadline() {
            Some(deadline) => {
                let event = select(button.wait_for_any_edge(), Timer::at(deadline)).await;
                match event {
                    Either::First(()) => {
                        machine.on_edge(Instant::now());
                        None
                    }
                    Either::Second(()) => machine.on_timer(Instant::now(), button.is_low()),
                }
            }
            None => {
                button.wait_for_any_edge().await;
                machine.on_edge(Instant::now());
                None
            }
        };

        if let Some(action) = action {
            BUTTON_ACTIONS.send(action).await;
        }
    }
}

#[embassy_executor::task]
pub async fn button_action_task(app: &'static App) {
    loop {
        let action = BUTTON_ACTIONS.receive().await;
        info!("Button action: {:?}", action);
        if let Some(report) = app.on_button(action).await {
            after_cycle(&report);
        }
    }
}

/// Run the report cycle whenever the stack's alarm expires.
#[embassy_executor::task]
pub async fn report_alarm_task(app: &'static App) {
    let mut delay = REPORT_ALARM.wait().await;
    loop {
        match select(REPORT_ALARM.wait(), Timer::after(delay)).await {
            // Rescheduled before expiry.
            Either::First(next) => delay = next,
            Either::Second(()) => {
                after_cycle(&app.on_alarm(Alarm::ReportCycle).await);
                delay = REPORT_ALARM.wait().await;
            }
        }
    }
}

#[embassy_executor::task]
pub async fn signal_task(app: &'static App) {
    loop {
        let signal = NETWORK_SIGNALS.receive().await;
        if app.on_signal(signal) == SignalDisposition::Default {
            STACK_COMMANDS
                .send(StackCommand::DefaultHandling(signal))
                .await;
        }
    }
}

/// Toggle the status LED after each valid sample.
#[embassy_executor::task]
pub async fn heartbeat_task(mut led: Output<'static>) {
    loop {
        HEARTBEAT.wait().await;
        led.toggle();
    }
}
