//! Debounced button with short-press and long-press detection
//!
//! The state machine is driven by three inputs from its owner:
//!
//! - [`ButtonMachine::on_edge`] for every interrupt on the pin (either edge),
//! - [`ButtonMachine::on_timer`] once [`ButtonMachine::next_deadline`] passes,
//!   together with the pin level read at that instant,
//! - nothing else. Time is always passed in, never read.
//!
//! Two single-shot timers live inside the machine as deadlines. The debounce
//! deadline is pushed back by every edge, so a burst of bounces collapses into
//! one settled read. The long-press deadline is armed on a settled press and
//! cancelled by a settled release.
//!
//! | Transition                                   | Action          |
//! |----------------------------------------------|-----------------|
//! | Released -> Waiting (settled press)          | arm long press  |
//! | Waiting -> LongPressFired (deadline, held)   | `FactoryReset`  |
//! | Waiting -> Released (release < short press)  | `SensorRead`    |
//! | Waiting -> Released (release >= short press) | none            |
//! | LongPressFired -> Released                   | none            |

use embassy_time::{Duration, Instant};
use log::{debug, info};

use crate::config::ButtonConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Released,
    /// The button was already down when the machine started. Its release is
    /// swallowed and no long press is timed for it.
    HeldSinceBoot,
    PressedWaitingForLongPress { since: Instant },
    LongPressFired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Short press: run a report cycle now.
    SensorRead,
    /// Long press: leave the network and wipe its persistent state.
    FactoryReset,
}

pub struct ButtonMachine {
    config: ButtonConfig,
    state: ButtonState,
    debounce_deadline: Option<Instant>,
    long_press_deadline: Option<Instant>,
}

impl ButtonMachine {
    /// Seed the machine from the pin level at start-up.
    pub fn new(config: ButtonConfig, pressed_at_boot: bool) -> Self {
        let state = if pressed_at_boot {
            info!("Button held at boot, ignoring until released");
            ButtonState::HeldSinceBoot
        } else {
            ButtonState::Released
        };

        Self {
            config,
            state,
            debounce_deadline: None,
            long_press_deadline: None,
        }
    }

    pub fn state(&self) -> ButtonState {
        self.state
    }

    /// Last settled level.
    pub fn is_pressed(&self) -> bool {
        self.state != ButtonState::Released
    }

    /// Earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce_deadline, self.long_press_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// An edge was seen on the pin. (Re)starts the debounce timer.
    pub fn on_edge(&mut self, now: Instant) {
        self.debounce_deadline = Some(now + self.config.debounce);
    }

    /// Run every timer that expired at or before `now`, in deadline order.
    ///
    /// `pressed` is the pin level sampled at `now`.
    pub fn on_timer(&mut self, now: Instant, pressed: bool) -> Option<ButtonAction> {
        let mut action = None;

        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }

            let fired = if self.long_press_deadline == Some(deadline) {
                self.long_press_elapsed(pressed)
            } else {
                self.settle(deadline, pressed)
            };
            action = action.or(fired);
        }

        action
    }

    fn settle(&mut self, at: Instant, pressed: bool) -> Option<ButtonAction> {
        self.debounce_deadline = None;

        match (self.state, pressed) {
            (ButtonState::Released, true) => {
                debug!("Button pressed");
                self.state = ButtonState::PressedWaitingForLongPress { since: at };
                self.long_press_deadline = Some(at + self.config.long_press);
                None
            }
            (ButtonState::PressedWaitingForLongPress { since }, false) => {
                self.state = ButtonState::Released;
                self.long_press_deadline = None;

                let held = at.duration_since(since);
                if held < self.config.short_press {
                    info!("Short press ({} ms), requesting sensor read", held.as_millis());
                    Some(ButtonAction::SensorRead)
                } else {
                    debug!("Released after {} ms, no action", held.as_millis());
                    None
                }
            }
            (ButtonState::LongPressFired | ButtonState::HeldSinceBoot, false) => {
                debug!("Button released");
                self.state = ButtonState::Released;
                None
            }
            // Level did not change: a bounce that settled back.
            _ => None,
        }
    }

    fn long_press_elapsed(&mut self, pressed: bool) -> Option<ButtonAction> {
        self.long_press_deadline = None;

        match self.state {
            ButtonState::PressedWaitingForLongPress { .. } if pressed => {
                info!(
                    "Long press ({} ms), requesting factory reset",
                    self.config.long_press.as_millis()
                );
                self.state = ButtonState::LongPressFired;
                Some(ButtonAction::FactoryReset)
            }
            _ => None,
        }
    }

    /// Time left until the long press fires, for diagnostics.
    pub fn long_press_remaining(&self, now: Instant) -> Option<Duration> {
        self.long_press_deadline
            .map(|deadline| deadline.checked_duration_since(now).unwrap_or(Duration::from_ticks(0)))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec;

    /// Feed `edges` (time in ms, level after the edge) and fire timers in
    /// chronological order until `until_ms`. Returns every action produced.
    fn drive(machine: &mut ButtonMachine, edges: &[(u64, bool)], until_ms: u64) -> Vec<ButtonAction> {
        let mut level = machine.is_pressed();
        let mut actions = Vec::new();
        let mut edges = edges.iter().peekable();
        let until = Instant::from_millis(until_ms);

        loop {
            let next_edge = edges.peek().map(|(t, _)| Instant::from_millis(*t));
            match (next_edge, machine.next_deadline()) {
                (Some(edge), Some(timer)) if timer < edge => {
                    actions.extend(machine.on_timer(timer, level));
                }
                (Some(edge), _) => {
                    let (_, new_level) = edges.next().unwrap();
                    level = *new_level;
                    machine.on_edge(edge);
                }
                (None, Some(timer)) if timer <= until => {
                    actions.extend(machine.on_timer(timer, level));
                }
                _ => break,
            }
        }

        actions
    }

    fn machine() -> ButtonMachine {
        ButtonMachine::new(ButtonConfig::DEFAULT, false)
    }

    #[test]
    fn test_bounces_collapse_into_one_transition() {
        let mut button = machine();
        for t in [0, 3, 6, 9] {
            button.on_edge(Instant::from_millis(t));
        }

        assert_eq!(button.next_deadline(), Some(Instant::from_millis(59)));
        assert_eq!(button.on_timer(Instant::from_millis(58), true), None);
        assert_eq!(button.state(), ButtonState::Released);

        assert_eq!(button.on_timer(Instant::from_millis(59), true), None);
        assert_eq!(
            button.state(),
            ButtonState::PressedWaitingForLongPress {
                since: Instant::from_millis(59)
            }
        );
    }

    #[test]
    fn test_bounce_that_settles_back_is_ignored() {
        let mut button = machine();
        let actions = drive(&mut button, &[(0, true), (2, false)], 10_000);

        assert!(actions.is_empty());
        assert_eq!(button.state(), ButtonState::Released);
        assert_eq!(button.next_deadline(), None);
    }

    #[test]
    fn test_short_press_requests_one_read() {
        let mut button = machine();
        let actions = drive(
            &mut button,
            &[(0, true), (4, false), (7, true), (600, false), (603, true), (605, false)],
            10_000,
        );

        assert_eq!(actions, [ButtonAction::SensorRead]);
        assert_eq!(button.state(), ButtonState::Released);
    }

    #[test]
    fn test_long_press_fires_once() {
        let mut button = machine();
        let actions = drive(&mut button, &[(0, true), (5_200, false)], 10_000);

        assert_eq!(actions, [ButtonAction::FactoryReset]);
        assert_eq!(button.state(), ButtonState::Released);
    }

    #[test]
    fn test_long_press_fires_while_still_held() {
        let mut button = machine();
        let actions = drive(&mut button, &[(0, true)], 60_000);

        assert_eq!(actions, [ButtonAction::FactoryReset]);
        assert_eq!(button.state(), ButtonState::LongPressFired);
        assert_eq!(button.next_deadline(), None);
    }

    #[test]
    fn test_press_after_long_press_is_fresh() {
        let mut button = machine();
        let actions = drive(
            &mut button,
            &[(0, true), (6_000, false), (7_000, true), (7_300, false)],
            20_000,
        );

        assert_eq!(actions, [ButtonAction::FactoryReset, ButtonAction::SensorRead]);
    }

    #[test]
    fn test_medium_hold_does_nothing() {
        let mut button = machine();
        let actions = drive(&mut button, &[(0, true), (3_000, false)], 20_000);

        assert!(actions.is_empty());
    }

    #[test]
    fn test_release_just_before_long_press_cancels_it() {
        let mut button = machine();
        let actions = drive(&mut button, &[(0, true), (4_990, false)], 20_000);

        assert!(actions.is_empty());
        assert_eq!(button.next_deadline(), None);
    }

    #[test]
    fn test_long_press_timer_with_pin_released_does_not_fire() {
        let mut button = machine();
        button.on_edge(Instant::from_millis(0));
        assert_eq!(button.on_timer(Instant::from_millis(50), true), None);

        // Release edge still debouncing when the long press deadline passes.
        button.on_edge(Instant::from_millis(5_040));
        assert_eq!(button.on_timer(Instant::from_millis(5_050), false), None);
        assert_eq!(button.on_timer(Instant::from_millis(5_090), false), None);
        assert_eq!(button.state(), ButtonState::Released);
    }

    #[test]
    fn test_held_at_boot_never_fires() {
        let mut button = ButtonMachine::new(ButtonConfig::DEFAULT, true);
        assert!(button.is_pressed());
        assert_eq!(button.next_deadline(), None);

        let actions = drive(&mut button, &[(10_000, false)], 30_000);

        assert!(actions.is_empty());
        assert_eq!(button.state(), ButtonState::Released);
    }

    #[test]
    fn test_long_press_remaining() {
        let mut button = machine();
        button.on_edge(Instant::from_millis(0));
        button.on_timer(Instant::from_millis(50), true);

        assert_eq!(
            button.long_press_remaining(Instant::from_millis(1_050)),
            Some(Duration::from_millis(4_000))
        );
    }
}
