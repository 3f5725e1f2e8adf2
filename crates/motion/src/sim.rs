//! A simulated board with a hand-cranked clock, for tests and the console.

use std::collections::BTreeMap;

use terrapen_protocol::RobotState;

use crate::board::{Board, Pin, PinState};
use crate::coordinator::Coordinator;
use crate::driver::Controller;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DigitalWrite {
    pub at_us: u64,
    pub pin: Pin,
    pub state: PinState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServoWrite {
    pub at_us: u64,
    pub pin: Pin,
    pub degrees: u8,
}

/// Records every write and only lets time pass when asked.
///
/// Time is kept as a 64-bit microsecond count; the board reports it through
/// the wrapping 32-bit counters like real hardware would.
#[derive(Clone, Debug, Default)]
pub struct SimBoard {
    elapsed_us: u64,
    levels: BTreeMap<Pin, PinState>,
    servos: BTreeMap<Pin, u8>,
    digital_writes: Vec<DigitalWrite>,
    servo_writes: Vec<ServoWrite>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(elapsed_us: u64) -> Self {
        SimBoard {
            elapsed_us,
            ..Self::default()
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    pub fn advance_us(&mut self, us: u64) {
        self.elapsed_us += us;
    }

    pub fn advance_ms(&mut self, ms: u64) {
        self.advance_us(ms * 1000);
    }

    /// The last level written to `pin`. Pins start out low.
    pub fn level(&self, pin: Pin) -> PinState {
        self.levels.get(&pin).copied().unwrap_or(PinState::Low)
    }

    pub fn coils(&self, pins: [Pin; 4]) -> [bool; 4] {
        pins.map(|p| self.level(p) == PinState::High)
    }

    /// The angle the servo on `pin` was last sent, if it's being driven.
    pub fn servo_angle(&self, pin: Pin) -> Option<u8> {
        self.servos.get(&pin).copied()
    }

    pub fn digital_writes(&self) -> &[DigitalWrite] {
        &self.digital_writes
    }

    pub fn servo_writes(&self) -> &[ServoWrite] {
        &self.servo_writes
    }

    /// When each step on the channel driving `coils` happened. A step rewrites
    /// all four coils in order, so a write of the last coil that leaves any
    /// coil energized marks one.
    pub fn step_times(&self, coils: [Pin; 4]) -> Vec<u64> {
        let mut times: Vec<u64> = Vec::new();
        let mut levels = [false; 4];
        for w in &self.digital_writes {
            if let Some(idx) = coils.iter().position(|p| *p == w.pin) {
                levels[idx] = w.state == PinState::High;
                if idx == 3 && levels.iter().any(|l| *l) && times.last() != Some(&w.at_us) {
                    times.push(w.at_us);
                }
            }
        }
        times
    }

    pub fn clear_history(&mut self) {
        self.digital_writes.clear();
        self.servo_writes.clear();
    }
}

impl Board for SimBoard {
    fn write_digital(&mut self, pin: Pin, state: PinState) {
        self.levels.insert(pin, state);
        self.digital_writes.push(DigitalWrite {
            at_us: self.elapsed_us,
            pin,
            state,
        });
    }

    fn write_servo(&mut self, pin: Pin, degrees: u8) {
        self.servos.insert(pin, degrees);
        self.servo_writes.push(ServoWrite {
            at_us: self.elapsed_us,
            pin,
            degrees,
        });
    }

    fn release_servo(&mut self, pin: Pin) {
        self.servos.remove(&pin);
    }

    fn now_us(&self) -> u32 {
        self.elapsed_us as u32
    }

    fn now_ms(&self) -> u32 {
        (self.elapsed_us / 1000) as u32
    }
}

/// Ticks until the machine stops moving, advancing the clock by `tick_us`
/// before each tick. Returns the number of ticks, or `None` if it was still
/// moving after `max_ticks`.
pub fn run_until_settled(
    coord: &mut Coordinator<SimBoard>,
    tick_us: u64,
    max_ticks: usize,
) -> Option<usize> {
    for n in 0..max_ticks {
        if coord.state() != RobotState::Moving {
            return Some(n);
        }
        coord.board_mut().advance_us(tick_us);
        coord.tick();
    }
    (coord.state() != RobotState::Moving).then_some(max_ticks)
}

/// Like [`run_until_settled`], but through a [`Controller`], collecting any
/// periodic status frames it emits on the way.
pub fn run_controller_until_settled(
    controller: &mut Controller<SimBoard>,
    tick_us: u64,
    max_ticks: usize,
) -> (bool, Vec<terrapen_protocol::Response>) {
    let mut emitted = Vec::new();
    for _ in 0..max_ticks {
        if controller.coordinator().state() != RobotState::Moving {
            return (true, emitted);
        }
        controller.coordinator_mut().board_mut().advance_us(tick_us);
        emitted.extend(controller.tick());
    }
    (controller.coordinator().state() != RobotState::Moving, emitted)
}
