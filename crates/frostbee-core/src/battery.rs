//! Battery gauge
//!
//! The battery is sensed through a resistor divider that is only powered while
//! a reading is in progress: the divider's enable line is active-low and sits
//! high-impedance the rest of the time. A reading enables the divider, waits
//! for the filter capacitor to settle, takes a burst of ADC samples and
//! disables the divider again on every path, including failures.
//!
//! The burst is reduced by dropping the lowest and highest sample and averaging
//! the rest, which rejects a single noise spike without a running filter.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::{debug, error, warn};
use thiserror_no_std::Error;

use crate::config::BatteryConfig;

/// Upper bound on samples per reading.
pub const MAX_SAMPLES: usize = 16;

/// Lower bound on samples per reading; outlier rejection needs one survivor.
pub const MIN_SAMPLES: usize = 3;

/// ZCL "100 %" in half-percent units.
pub const PERCENTAGE_FULL: u8 = 200;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeError {
    #[error("battery ADC is not available")]
    Unavailable,
    #[error("ADC sample {index} failed")]
    Sample { index: usize },
    #[error("failed to drive the divider enable line")]
    Divider,
}

/// One battery measurement in ZCL units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    /// Battery voltage in 100 mV steps.
    pub voltage: u8,
    /// Remaining charge in 0.5 % steps, 0..=200.
    pub percentage: u8,
}

impl BatteryReading {
    /// Reading for a battery at `battery_mv`.
    pub fn from_millivolts(battery_mv: u32, config: &BatteryConfig) -> Self {
        Self {
            voltage: ((battery_mv + 50) / 100).min(u32::from(u8::MAX)) as u8,
            percentage: percentage_for(battery_mv, config),
        }
    }

    /// Reading reported before the first measurement: a full battery.
    pub fn nominal(config: &BatteryConfig) -> Self {
        Self::from_millivolts(config.full_mv, config)
    }
}

/// Linear map of `battery_mv` between the empty and full voltage, clamped.
pub fn percentage_for(battery_mv: u32, config: &BatteryConfig) -> u8 {
    if battery_mv <= config.empty_mv {
        0
    } else if battery_mv >= config.full_mv {
        PERCENTAGE_FULL
    } else {
        let span = config.full_mv - config.empty_mv;
        ((battery_mv - config.empty_mv) * u32::from(PERCENTAGE_FULL) / span) as u8
    }
}

/// Voltage at the ADC pin for a raw `code`.
pub fn code_to_pin_mv(code: u16, config: &BatteryConfig) -> u32 {
    u32::from(code).min(config.max_code()) * config.full_scale_mv() / config.max_code()
}

/// Battery voltage behind the divider for a pin voltage.
pub fn pin_to_battery_mv(pin_mv: u32, config: &BatteryConfig) -> u32 {
    pin_mv * config.divider.numerator / config.divider.denominator
}

/// Sort `samples`, drop one minimum and one maximum, average the remainder.
///
/// `samples` must hold at least [`MIN_SAMPLES`] values.
pub fn reject_outliers(samples: &mut [u16]) -> u16 {
    samples.sort_unstable();
    let kept = &samples[1..samples.len() - 1];
    let sum: u32 = kept.iter().map(|&s| u32::from(s)).sum();
    (sum / kept.len() as u32) as u16
}

/// Raw one-shot conversions on the battery sense channel.
pub trait BatteryAdc {
    type Error: core::fmt::Debug;

    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

/// Anything that can produce a [`BatteryReading`].
pub trait BatteryMonitor {
    fn read(&mut self) -> Result<BatteryReading, GaugeError>;
}

/// Enable line of the sense divider. Low conducts, high is high-impedance.
pub struct VoltageDivider<P> {
    pin: P,
}

impl<P: OutputPin> VoltageDivider<P> {
    /// Take the enable line and park it in the disabled state.
    pub fn new(mut pin: P) -> Result<Self, GaugeError> {
        pin.set_high().map_err(|e| {
            error!("Failed to park divider enable line: {:?}", e);
            GaugeError::Divider
        })?;
        Ok(Self { pin })
    }

    /// Power the divider until the returned guard is dropped.
    fn power_on(&mut self) -> Result<PoweredDivider<'_, P>, GaugeError> {
        self.pin.set_low().map_err(|e| {
            error!("Failed to enable divider: {:?}", e);
            GaugeError::Divider
        })?;
        Ok(PoweredDivider { pin: &mut self.pin })
    }
}

struct PoweredDivider<'a, P: OutputPin> {
    pin: &'a mut P,
}

impl<P: OutputPin> Drop for PoweredDivider<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.pin.set_high() {
            error!("Failed to disable divider: {:?}", e);
        }
    }
}

/// ADC + switched divider battery gauge.
pub struct BatteryGauge<A, P, D> {
    adc: A,
    divider: VoltageDivider<P>,
    delay: D,
    config: BatteryConfig,
    last: BatteryReading,
}

impl<A, P, D> BatteryGauge<A, P, D>
where
    A: BatteryAdc,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(adc: A, divider: VoltageDivider<P>, delay: D, config: BatteryConfig) -> Self {
        if !(MIN_SAMPLES..=MAX_SAMPLES).contains(&config.samples) {
            warn!(
                "Battery sample count {} outside {}..={}, clamping",
                config.samples, MIN_SAMPLES, MAX_SAMPLES
            );
        }
        Self {
            adc,
            divider,
            delay,
            last: BatteryReading::nominal(&config),
            config,
        }
    }

    /// Last successful reading, or the nominal reading before the first one.
    pub fn last_reading(&self) -> BatteryReading {
        self.last
    }

    fn sample_count(&self) -> usize {
        self.config.samples.clamp(MIN_SAMPLES, MAX_SAMPLES)
    }
}

fn take_samples<A: BatteryAdc, D: DelayNs>(
    adc: &mut A,
    delay: &mut D,
    count: usize,
    inter_sample_delay_us: u32,
) -> Result<Vec<u16, MAX_SAMPLES>, GaugeError> {
    let mut samples = Vec::new();
    for index in 0..count {
        if index > 0 {
            delay.delay_us(inter_sample_delay_us);
        }
        let code = adc.read_raw().map_err(|e| {
            error!("Battery ADC sample {} failed: {:?}", index, e);
            GaugeError::Sample { index }
        })?;
        // count never exceeds MAX_SAMPLES
        let _ = samples.push(code);
    }
    Ok(samples)
}

impl<A, P, D> BatteryMonitor for BatteryGauge<A, P, D>
where
    A: BatteryAdc,
    P: OutputPin,
    D: DelayNs,
{
    fn read(&mut self) -> Result<BatteryReading, GaugeError> {
        let count = self.sample_count();

        let mut samples = {
            let _powered = self.divider.power_on()?;
            self.delay.delay_us(self.config.settle_delay_us);
            take_samples(
                &mut self.adc,
                &mut self.delay,
                count,
                self.config.inter_sample_delay_us,
            )?
        };

        let code = reject_outliers(&mut samples);
        let pin_mv = code_to_pin_mv(code, &self.config);
        let battery_mv = pin_to_battery_mv(pin_mv, &self.config);
        let reading = BatteryReading::from_millivolts(battery_mv, &self.config);

        debug!(
            "Battery: code {} -> {} mV at pin, {} mV, {}/200",
            code, pin_mv, battery_mv, reading.percentage
        );

        self.last = reading;
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::cell::RefCell;
    use embedded_hal::digital::ErrorKind;
    use std::rc::Rc;
    use std::vec;
    use std::vec::Vec as StdVec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        DividerDisabled,
        DividerEnabled,
        Delay(u32),
        Sample,
    }

    type Log = Rc<RefCell<StdVec<Event>>>;

    struct FakePin {
        log: Log,
        /// Driving the line low fails, as with a shorted enable line.
        stuck_high: bool,
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = ErrorKind;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), ErrorKind> {
            if self.stuck_high {
                return Err(ErrorKind::Other);
            }
            self.log.borrow_mut().push(Event::DividerEnabled);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), ErrorKind> {
            self.log.borrow_mut().push(Event::DividerDisabled);
            Ok(())
        }
    }

    struct FakeDelay(Log);

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.0.borrow_mut().push(Event::Delay(ns / 1_000));
        }
    }

    struct FakeAdc {
        log: Log,
        codes: StdVec<u16>,
        fail_at: Option<usize>,
        taken: usize,
    }

    impl BatteryAdc for FakeAdc {
        type Error = ();

        fn read_raw(&mut self) -> Result<u16, ()> {
            let index = self.taken;
            self.taken += 1;
            if self.fail_at == Some(index) {
                return Err(());
            }
            self.log.borrow_mut().push(Event::Sample);
            Ok(self.codes[index % self.codes.len()])
        }
    }

    fn gauge(
        codes: StdVec<u16>,
        fail_at: Option<usize>,
    ) -> (BatteryGauge<FakeAdc, FakePin, FakeDelay>, Log) {
        gauge_with_pin(codes, fail_at, false)
    }

    fn gauge_with_pin(
        codes: StdVec<u16>,
        fail_at: Option<usize>,
        stuck_high: bool,
    ) -> (BatteryGauge<FakeAdc, FakePin, FakeDelay>, Log) {
        let log: Log = Rc::new(RefCell::new(StdVec::new()));
        let adc = FakeAdc {
            log: log.clone(),
            codes,
            fail_at,
            taken: 0,
        };
        let pin = FakePin {
            log: log.clone(),
            stuck_high,
        };
        let divider = VoltageDivider::new(pin).unwrap();
        let gauge = BatteryGauge::new(adc, divider, FakeDelay(log.clone()), BatteryConfig::DEFAULT);
        (gauge, log)
    }

    /// Code that lands on `pin_mv` with the default 3600 mV full scale.
    fn code_for_pin_mv(pin_mv: u32) -> u16 {
        let config = BatteryConfig::DEFAULT;
        ((pin_mv * config.max_code() + config.full_scale_mv() / 2) / config.full_scale_mv()) as u16
    }

    #[test]
    fn test_reject_outliers_drops_one_min_and_one_max() {
        let cases: [([u16; 5], u16); 5] = [
            ([10, 1000, 12, 11, 0], 11),
            ([5, 5, 5, 5, 5], 5),
            ([0, 0, 4095, 4095, 4095], 2730),
            ([100, 200, 300, 400, 500], 300),
            ([7, 1, 7, 1, 9], 5),
        ];

        for (samples, expected) in cases {
            let mut forward = samples;
            let mut reversed = samples;
            reversed.reverse();

            assert_eq!(reject_outliers(&mut forward), expected, "{:?}", samples);
            assert_eq!(reject_outliers(&mut reversed), expected, "{:?}", samples);
        }
    }

    #[test]
    fn test_reject_outliers_is_order_independent() {
        let base = [2011u16, 1890, 2400, 1999, 2005];
        let expected = (1999 + 2005 + 2011) / 3;

        for shift in 0..base.len() {
            let mut rotated = base;
            rotated.rotate_left(shift);
            assert_eq!(reject_outliers(&mut rotated), expected);
        }
    }

    #[test]
    fn test_round_trip_half_charged_cell() {
        let config = BatteryConfig::DEFAULT;
        let code = code_for_pin_mv(1800);

        let pin_mv = code_to_pin_mv(code, &config);
        let battery_mv = pin_to_battery_mv(pin_mv, &config);
        let reading = BatteryReading::from_millivolts(battery_mv, &config);

        assert_eq!(pin_mv, 1800);
        assert_eq!(battery_mv, 3600);
        assert_eq!(reading.voltage, 36);
        assert_eq!(reading.percentage, 100);
    }

    #[test]
    fn test_percentage_is_clamped() {
        let config = BatteryConfig::DEFAULT;

        assert_eq!(percentage_for(2_500, &config), 0);
        assert_eq!(percentage_for(3_000, &config), 0);
        assert_eq!(percentage_for(3_300, &config), 50);
        assert_eq!(percentage_for(4_200, &config), 200);
        assert_eq!(percentage_for(5_000, &config), 200);
    }

    #[test]
    fn test_divider_is_only_powered_around_samples() {
        let code = code_for_pin_mv(1800);
        let (mut gauge, log) = gauge(vec![code, code, 4095, code, 0], None);

        let reading = gauge.read().unwrap();
        assert_eq!(reading.percentage, 100);

        let events = log.borrow();
        let enabled = events
            .iter()
            .position(|e| *e == Event::DividerEnabled)
            .unwrap();
        let first_sample = events.iter().position(|e| *e == Event::Sample).unwrap();
        let last_sample = events.iter().rposition(|e| *e == Event::Sample).unwrap();

        assert_eq!(events[0], Event::DividerDisabled);
        assert!(events[..enabled].iter().all(|e| *e != Event::Sample));
        assert_eq!(events[enabled + 1], Event::Delay(2_000));
        assert!(enabled < first_sample);
        assert_eq!(events[last_sample + 1..], [Event::DividerDisabled]);
        assert_eq!(events.iter().filter(|e| **e == Event::Sample).count(), 5);
    }

    #[test]
    fn test_failed_sample_disables_divider_and_keeps_last_reading() {
        let code = code_for_pin_mv(1800);
        let (mut gauge, log) = gauge(vec![code], None);
        let good = gauge.read().unwrap();

        gauge.adc.fail_at = Some(gauge.adc.taken + 2);
        log.borrow_mut().clear();

        assert_eq!(gauge.read(), Err(GaugeError::Sample { index: 2 }));
        assert_eq!(gauge.last_reading(), good);
        assert_eq!(log.borrow().last(), Some(&Event::DividerDisabled));
        assert_eq!(
            log.borrow()
                .iter()
                .filter(|e| **e == Event::DividerEnabled)
                .count(),
            1
        );
    }

    #[test]
    fn test_first_sample_failure_disables_divider() {
        let (mut gauge, log) = gauge(vec![code_for_pin_mv(1800)], Some(0));

        assert_eq!(gauge.read(), Err(GaugeError::Sample { index: 0 }));
        assert_eq!(
            *log.borrow(),
            [
                Event::DividerDisabled,
                Event::DividerEnabled,
                Event::Delay(2_000),
                Event::DividerDisabled,
            ]
        );
        assert_eq!(gauge.last_reading(), BatteryReading { voltage: 42, percentage: 200 });
    }

    #[test]
    fn test_divider_enable_failure_takes_no_samples() {
        let (mut gauge, log) = gauge_with_pin(vec![code_for_pin_mv(1800)], None, true);

        assert_eq!(gauge.read(), Err(GaugeError::Divider));
        assert_eq!(gauge.adc.taken, 0);
        assert_eq!(*log.borrow(), [Event::DividerDisabled]);
        assert_eq!(gauge.last_reading(), BatteryReading { voltage: 42, percentage: 200 });
    }

    #[test]
    fn test_nominal_reading_before_first_measurement() {
        let (gauge, _log) = gauge(vec![0], None);

        assert_eq!(gauge.last_reading(), BatteryReading { voltage: 42, percentage: 200 });
    }
}
