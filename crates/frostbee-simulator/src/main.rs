//! Desktop simulator for the frostbee sensor.
//!
//! Runs `frostbee-core` against a simulated Zigbee stack, a synthetic SHT40
//! and a slowly discharging battery on a virtual clock. A short script joins
//! the network, presses the button briefly, then holds it for a factory
//! reset. Run with `RUST_LOG=debug` to see every attribute write.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embassy_futures::block_on;
use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use frostbee_core::app_state::AppState;
use frostbee_core::attributes::{AttributeSnapshot, AttributeStore};
use frostbee_core::battery::{BatteryAdc, BatteryGauge, BatteryReading, VoltageDivider};
use frostbee_core::button::{ButtonAction, ButtonMachine};
use frostbee_core::config::{BatteryConfig, FrostbeeConfig};
use frostbee_core::network::{Alarm, NetworkSignal, NetworkStack, SignalDisposition, StackError};
use frostbee_core::report::CycleReport;
use frostbee_core::sensors::{FetchError, RawSample, SampleSource};
use frostbee_core::zcl::{self, AttributeValue, ClusterId};

// ---------------------------------------------------------------------------
// Scenario constants
// ---------------------------------------------------------------------------

/// How long the default scenario runs if nothing reboots the device first.
const SIMULATION_LENGTH: Duration = Duration::from_secs(15 * 60);

/// Every n-th sensor fetch times out.
const SENSOR_FAILURE_PERIOD: u32 = 5;

/// Contact bounce after each button transition.
const BOUNCE_EDGES: [Duration; 2] = [Duration::from_millis(3), Duration::from_millis(7)];

/// Battery voltage at the start of the run and its drain rate.
const BATTERY_START_MV: u32 = 4_100;
const BATTERY_DRAIN_MV_PER_MIN: u32 = 2;

// ---------------------------------------------------------------------------
// Virtual clock
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Clock {
    millis: Cell<u64>,
}

impl Clock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.millis.get())
    }

    fn advance_to(&self, at: Instant) {
        self.millis.set(self.millis.get().max(at.as_millis()));
    }
}

// ---------------------------------------------------------------------------
// Simulated Zigbee stack
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StackState {
    alarm: Option<(Alarm, Instant)>,
    attributes: BTreeMap<(u16, u16), AttributeValue>,
    attribute_writes: usize,
    erase_on_leave: bool,
    erased: bool,
    pending_signals: VecDeque<NetworkSignal>,
    rebooted: bool,
}

/// In-process stand-in for the Zigbee stack.
///
/// Alarms use replace semantics, a leave completes immediately by queueing
/// [`NetworkSignal::Leave`], and a reboot only sets a flag.
struct SimStack {
    clock: Rc<Clock>,
    state: RefCell<StackState>,
}

impl SimStack {
    fn new(clock: Rc<Clock>) -> Self {
        Self {
            clock,
            state: RefCell::default(),
        }
    }

    fn raise(&self, signal: NetworkSignal) {
        self.state.borrow_mut().pending_signals.push_back(signal);
    }

    fn next_signal(&self) -> Option<NetworkSignal> {
        self.state.borrow_mut().pending_signals.pop_front()
    }

    fn alarm_deadline(&self) -> Option<Instant> {
        self.state.borrow().alarm.map(|(_, at)| at)
    }

    fn take_alarm(&self) -> Option<Alarm> {
        self.state.borrow_mut().alarm.take().map(|(alarm, _)| alarm)
    }

    fn rebooted(&self) -> bool {
        self.state.borrow().rebooted
    }
}

impl NetworkStack for SimStack {
    fn schedule_alarm(&self, alarm: Alarm, delay: Duration) {
        let at = self.clock.now() + delay;
        debug!("[stack] {:?} scheduled for t={} ms", alarm, at.as_millis());
        self.state.borrow_mut().alarm = Some((alarm, at));
    }

    fn set_attribute(&self, endpoint: u8, cluster: ClusterId, attribute: u16, value: AttributeValue) {
        debug!(
            "[stack] ep {} cluster {:#06x} attr {:#06x} = {:?}",
            endpoint,
            cluster.id(),
            attribute,
            value
        );
        let mut state = self.state.borrow_mut();
        state.attributes.insert((cluster.id(), attribute), value);
        state.attribute_writes += 1;
    }

    fn erase_persistent_storage(&self, erase: bool) -> Result<(), StackError> {
        self.state.borrow_mut().erase_on_leave = erase;
        Ok(())
    }

    fn leave_network(&self) -> Result<(), StackError> {
        info!("[stack] leaving network");
        let mut state = self.state.borrow_mut();
        if state.erase_on_leave {
            state.erased = true;
            state.attributes.clear();
        }
        state.alarm = None;
        state.pending_signals.push_back(NetworkSignal::Leave);
        Ok(())
    }

    fn reboot(&self) {
        info!("[stack] reboot requested");
        self.state.borrow_mut().rebooted = true;
    }
}

// ---------------------------------------------------------------------------
// Synthetic devices
// ---------------------------------------------------------------------------

/// SHT40 stand-in producing a slow sinusoid and periodic timeouts.
struct SyntheticSht40 {
    clock: Rc<Clock>,
    fetches: u32,
}

impl SyntheticSht40 {
    fn ticks(value: f64, offset: f64, span: f64) -> u16 {
        ((value + offset) * 65_535.0 / span).round().clamp(0.0, 65_535.0) as u16
    }
}

impl SampleSource for SyntheticSht40 {
    async fn fetch_sample(&mut self) -> Result<RawSample, FetchError> {
        self.fetches += 1;
        if self.fetches % SENSOR_FAILURE_PERIOD == 0 {
            return Err(FetchError::NotReady { sensor: "SHT40" });
        }

        let t = self.clock.now().as_millis() as f64 / 1_000.0;
        let temperature_c = 21.0 + 3.0 * (t / 600.0).sin();
        let humidity_rh = 45.0 + 10.0 * (t / 900.0).cos();

        Ok(RawSample {
            temperature: Self::ticks(temperature_c, 45.0, 175.0),
            humidity: Self::ticks(humidity_rh, 6.0, 125.0),
        })
    }
}

/// ADC behind the battery divider, with one noisy sample in every read.
struct SimAdc {
    clock: Rc<Clock>,
    config: BatteryConfig,
    reads: u32,
}

impl BatteryAdc for SimAdc {
    type Error = Infallible;

    fn read_raw(&mut self) -> Result<u16, Self::Error> {
        self.reads += 1;
        let minutes = (self.clock.now().as_secs() / 60) as u32;
        let battery_mv = BATTERY_START_MV
            .saturating_sub(minutes * BATTERY_DRAIN_MV_PER_MIN)
            .max(self.config.empty_mv);
        let pin_mv =
            battery_mv * self.config.divider.denominator / self.config.divider.numerator;
        let mut code = pin_mv * self.config.max_code() / self.config.full_scale_mv();
        if self.reads % self.config.samples as u32 == 0 {
            code += 400;
        }
        Ok(code.min(self.config.max_code()) as u16)
    }
}

struct SimPin;

impl embedded_hal::digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct SimDelay;

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

type SimApp<'a> = AppState<'a, SyntheticSht40, BatteryGauge<SimAdc, SimPin, SimDelay>, SimStack>;

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Join,
    /// Press the button and release it after `hold`.
    Press { hold: Duration },
}

#[derive(Debug, Clone, Copy)]
enum Input {
    Join,
    Level(bool),
}

/// Expand scripted steps into timed inputs, including contact bounce.
fn expand(script: &[(Duration, Step)]) -> VecDeque<(Instant, Input)> {
    let mut inputs = Vec::new();
    for &(at, step) in script {
        let at = Instant::from_millis(0) + at;
        match step {
            Step::Join => inputs.push((at, Input::Join)),
            Step::Press { hold } => {
                for (start, level) in [(at, true), (at + hold, false)] {
                    inputs.push((start, Input::Level(level)));
                    for (i, bounce) in BOUNCE_EDGES.iter().enumerate() {
                        // Odd bounces flip back, so the last edge settles on `level`.
                        let bounced = if i % 2 == 0 { !level } else { level };
                        inputs.push((start + *bounce, Input::Level(bounced)));
                    }
                }
            }
        }
    }
    inputs.sort_by_key(|(at, _)| *at);
    inputs.into()
}

/// What a scenario run left behind.
#[derive(Debug)]
struct Outcome {
    periodic_cycles: usize,
    on_demand_cycles: usize,
    failed_samples: usize,
    attribute_writes: usize,
    erased: bool,
    rebooted: bool,
    /// What the stack holds at the end. Cleared by a factory reset.
    final_attributes: BTreeMap<(u16, u16), AttributeValue>,
    /// What the device itself last wrote.
    device_attributes: AttributeSnapshot,
}

fn log_cycle(kind: &str, report: &CycleReport, failed: &mut usize) {
    match report.sample {
        Ok(sample) => info!(
            "{} cycle: {}.{:02} °C, {}.{:02} %RH",
            kind,
            sample.temperature / 100,
            (sample.temperature % 100).abs(),
            sample.humidity / 100,
            sample.humidity % 100
        ),
        Err(e) => {
            *failed += 1;
            warn!("{} cycle: {}", kind, e);
        }
    }
    match report.battery {
        Ok(battery) => debug!(
            "battery {}.{} V, {}%",
            battery.voltage / 10,
            battery.voltage % 10,
            battery.percentage / 2
        ),
        Err(e) => warn!("battery: {}", e),
    }
}

fn run_scenario(script: &[(Duration, Step)], length: Duration) -> Outcome {
    let config = FrostbeeConfig::DEFAULT;
    let clock = Rc::new(Clock::default());
    let end = Instant::from_millis(0) + length;

    let attributes = AttributeStore::new(BatteryReading::nominal(&config.battery));
    let sensor = SyntheticSht40 {
        clock: clock.clone(),
        fetches: 0,
    };
    let battery = VoltageDivider::new(SimPin).ok().map(|divider| {
        BatteryGauge::new(
            SimAdc {
                clock: clock.clone(),
                config: config.battery,
                reads: 0,
            },
            divider,
            SimDelay,
            config.battery,
        )
    });
    let app: SimApp<'_> = AppState::new(
        &config,
        Some(sensor),
        battery,
        &attributes,
        SimStack::new(clock.clone()),
    );

    let mut inputs = expand(script);
    let mut button = ButtonMachine::new(config.button, false);
    let mut pressed = false;
    let mut periodic_cycles = 0;
    let mut on_demand_cycles = 0;
    let mut failed_samples = 0;

    loop {
        let next_input = inputs.front().map(|(at, _)| *at);
        let next_button = button.next_deadline();
        let next_alarm = app.stack().alarm_deadline();

        let Some(next) = [next_input, next_button, next_alarm].into_iter().flatten().min() else {
            info!("Nothing left to do");
            break;
        };
        if next > end {
            break;
        }
        clock.advance_to(next);

        if next_input == Some(next) {
            if let Some((_, input)) = inputs.pop_front() {
                match input {
                    Input::Join => {
                        info!("t={} s: joined network", next.as_secs());
                        app.stack().raise(NetworkSignal::Joined);
                    }
                    Input::Level(level) => {
                        pressed = level;
                        button.on_edge(next);
                    }
                }
            }
        } else if next_button == Some(next) {
            match button.on_timer(next, pressed) {
                Some(action) => {
                    info!("t={} s: button {:?}", next.as_secs(), action);
                    if let Some(report) = block_on(app.on_button(action)) {
                        on_demand_cycles += 1;
                        log_cycle("on-demand", &report, &mut failed_samples);
                    }
                    if action == ButtonAction::FactoryReset {
                        debug!("Factory reset in progress: {}", app.factory_reset_in_progress());
                    }
                }
                None => {
                    if let Some(remaining) = button.long_press_remaining(next) {
                        debug!("Long press in {} ms", remaining.as_millis());
                    }
                }
            }
        } else if let Some(alarm) = app.stack().take_alarm() {
            periodic_cycles += 1;
            let report = block_on(app.on_alarm(alarm));
            log_cycle("periodic", &report, &mut failed_samples);
        }

        while let Some(signal) = app.stack().next_signal() {
            if app.on_signal(signal) == SignalDisposition::Default {
                debug!("Default handling for {:?}", signal);
            }
        }

        if app.stack().rebooted() {
            info!("t={} s: device rebooted", clock.now().as_secs());
            break;
        }
    }

    let state = app.stack().state.borrow();
    Outcome {
        periodic_cycles,
        on_demand_cycles,
        failed_samples,
        attribute_writes: state.attribute_writes,
        erased: state.erased,
        rebooted: state.rebooted,
        final_attributes: state.attributes.clone(),
        device_attributes: app.attributes().snapshot(),
    }
}

fn default_script() -> [(Duration, Step); 3] {
    [
        (Duration::from_secs(2), Step::Join),
        (
            Duration::from_secs(200),
            Step::Press {
                hold: Duration::from_millis(300),
            },
        ),
        (
            Duration::from_secs(400),
            Step::Press {
                hold: Duration::from_secs(6),
            },
        ),
    ]
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!(
        "Starting {} {} simulator (endpoint {}, profile {:#06x}, device {:#06x})",
        zcl::MANUFACTURER_NAME,
        zcl::MODEL_IDENTIFIER,
        zcl::ENDPOINT,
        zcl::PROFILE_ID,
        zcl::DEVICE_ID
    );
    info!(
        "Server clusters {:04x?}, client clusters {:04x?}",
        ClusterId::SERVER.map(ClusterId::id),
        ClusterId::CLIENT.map(ClusterId::id)
    );

    let outcome = run_scenario(&default_script(), SIMULATION_LENGTH);

    info!(
        "{} periodic and {} on-demand cycles, {} failed samples, {} attribute writes",
        outcome.periodic_cycles,
        outcome.on_demand_cycles,
        outcome.failed_samples,
        outcome.attribute_writes
    );
    info!(
        "Persistent storage erased: {}, rebooted: {}",
        outcome.erased, outcome.rebooted
    );
    info!("Last device attributes: {:?}", outcome.device_attributes);
    info!("Simulator exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_script_ends_in_factory_reset() {
        let outcome = run_scenario(&default_script(), SIMULATION_LENGTH);

        // Joined at 2 s, first report at 7 s, then every minute until the reset.
        assert_eq!(outcome.periodic_cycles, 7);
        assert_eq!(outcome.on_demand_cycles, 1);
        assert!(outcome.erased);
        assert!(outcome.rebooted);
        assert!(outcome.final_attributes.is_empty());
        assert_ne!(outcome.device_attributes.temperature, zcl::TEMPERATURE_UNKNOWN);
    }

    #[test]
    fn test_idle_device_reports_nothing_before_join() {
        let outcome = run_scenario(&[], Duration::from_secs(600));

        assert_eq!(outcome.periodic_cycles, 0);
        assert_eq!(outcome.attribute_writes, 0);
        assert!(!outcome.rebooted);
    }

    #[test]
    fn test_joined_device_publishes_every_attribute() {
        let outcome = run_scenario(
            &[(Duration::from_secs(1), Step::Join)],
            Duration::from_secs(10),
        );

        assert_eq!(outcome.periodic_cycles, 1);
        assert_eq!(outcome.failed_samples, 0);
        assert_eq!(outcome.attribute_writes, 4);
        assert!(matches!(
            outcome.final_attributes.get(&(ClusterId::TemperatureMeasurement.id(), 0x0000)),
            Some(AttributeValue::I16(t)) if (1_800..=2_400).contains(t)
        ));
        assert_eq!(
            outcome.final_attributes.get(&(ClusterId::PowerConfig.id(), 0x0020)),
            Some(&AttributeValue::U8(41))
        );
    }
}
