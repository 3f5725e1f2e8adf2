use crate::board::{Board, Pin, PinState};

/// Half-step excitation: one row per phase, one column per coil.
pub const PHASES: [[bool; 4]; 8] = [
    [true, false, false, false],
    [true, true, false, false],
    [false, true, false, false],
    [false, true, true, false],
    [false, false, true, false],
    [false, false, true, true],
    [false, false, false, true],
    [true, false, false, true],
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// The direction that moves `from` toward `to`, if they differ.
    pub fn toward(from: i32, to: i32) -> Option<Direction> {
        match to.cmp(&from) {
            core::cmp::Ordering::Greater => Some(Direction::Forward),
            core::cmp::Ordering::Less => Some(Direction::Reverse),
            core::cmp::Ordering::Equal => None,
        }
    }

    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

/// One 4-coil stepper motor, paced by a minimum interval between steps.
#[derive(Clone, Debug)]
pub struct StepperChannel {
    pins: Option<[Pin; 4]>,
    phase: i8,
    energized: bool,
    last_step_us: u32,
    interval_us: u32,
    min_interval_us: u32,
    max_interval_us: u32,
}

impl StepperChannel {
    /// A detached channel whose step interval will be kept within `[min_interval_us, max_interval_us]`.
    /// Bounds given the wrong way round are swapped.
    pub fn new(min_interval_us: u32, max_interval_us: u32) -> Self {
        let (min_interval_us, max_interval_us) = (
            min_interval_us.min(max_interval_us),
            min_interval_us.max(max_interval_us),
        );
        StepperChannel {
            pins: None,
            phase: 0,
            energized: false,
            last_step_us: 0,
            interval_us: max_interval_us,
            min_interval_us,
            max_interval_us,
        }
    }

    /// Takes over four coil pins, drives them low and rewinds to phase 0.
    pub fn attach<B: Board>(&mut self, board: &mut B, pins: [Pin; 4]) {
        self.pins = Some(pins);
        self.phase = 0;
        self.last_step_us = board.now_us();
        self.release(board);
    }

    pub fn detach<B: Board>(&mut self, board: &mut B) {
        self.release(board);
        self.pins = None;
    }

    pub fn is_attached(&self) -> bool {
        self.pins.is_some()
    }

    /// Sets the step rate. Rates that would step too fast or too slow are clamped,
    /// and rates that aren't positive select the slowest interval.
    pub fn set_speed(&mut self, steps_per_second: f32) {
        self.interval_us = if steps_per_second > 0.0 {
            let interval = 1_000_000.0 / steps_per_second;
            let min = self.min_interval_us as f32;
            let max = self.max_interval_us as f32;
            interval.clamp(min, max) as u32
        } else {
            self.max_interval_us
        };
    }

    /// The current step rate, in steps per second.
    pub fn speed(&self) -> f32 {
        1_000_000.0 / self.interval_us as f32
    }

    pub fn interval_us(&self) -> u32 {
        self.interval_us
    }

    pub fn phase(&self) -> i8 {
        self.phase
    }

    pub fn is_energized(&self) -> bool {
        self.energized
    }

    /// The coil pattern for the current phase, or all-off if released.
    pub fn coils(&self) -> [bool; 4] {
        if self.energized {
            PHASES[self.phase as usize]
        } else {
            [false; 4]
        }
    }

    /// Has the interval elapsed since the last step?
    pub fn is_ready<B: Board>(&self, board: &B) -> bool {
        let now = board.now_us();
        // The counter wrapped. The unsigned difference below handles that too,
        // but never let a step wait out a whole counter period.
        now < self.last_step_us || now.wrapping_sub(self.last_step_us) >= self.interval_us
    }

    /// Steps once if the channel is attached and the interval has elapsed.
    pub fn try_step<B: Board>(&mut self, board: &mut B, dir: Direction) -> bool {
        if self.pins.is_none() || !self.is_ready(board) {
            return false;
        }
        self.step_now(board, dir)
    }

    /// Steps once, ignoring the interval.
    pub fn step_now<B: Board>(&mut self, board: &mut B, dir: Direction) -> bool {
        if self.pins.is_none() {
            return false;
        }
        let inc = match dir {
            Direction::Forward => 1,
            Direction::Reverse => 7,
        };
        self.phase = (self.phase + inc) % 8;
        self.energized = true;
        self.apply(board);
        self.last_step_us = board.now_us();
        true
    }

    /// Energizes the coils for the current phase.
    pub fn hold<B: Board>(&mut self, board: &mut B) {
        if self.pins.is_some() {
            self.energized = true;
            self.apply(board);
        }
    }

    /// Drives all four coils low.
    pub fn release<B: Board>(&mut self, board: &mut B) {
        if self.pins.is_some() {
            self.energized = false;
            self.apply(board);
        }
    }

    fn apply<B: Board>(&self, board: &mut B) {
        let Some(pins) = self.pins else {
            return;
        };
        for (pin, on) in pins.iter().zip(self.coils()) {
            board.write_digital(*pin, PinState::from(on));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBoard;
    use proptest::prelude::*;

    const PINS: [Pin; 4] = [Pin(2), Pin(3), Pin(4), Pin(5)];

    fn attached(board: &mut SimBoard) -> StepperChannel {
        let mut ch = StepperChannel::new(600, 10_000);
        ch.attach(board, PINS);
        ch.set_speed(1000.0);
        ch
    }

    #[test]
    fn phases_alternate_one_and_two_coils() {
        for (i, row) in PHASES.iter().enumerate() {
            let on = row.iter().filter(|c| **c).count();
            assert_eq!(on, if i % 2 == 0 { 1 } else { 2 });
        }
    }

    #[test]
    fn swapped_bounds_are_reordered() {
        let mut ch = StepperChannel::new(10_000, 600);
        ch.set_speed(1e6);
        assert_eq!(ch.interval_us(), 600);
        ch.set_speed(1.0);
        assert_eq!(ch.interval_us(), 10_000);
        ch.set_speed(0.0);
        assert_eq!(ch.interval_us(), 10_000);
    }

    #[test]
    fn attach_drives_low() {
        let mut board = SimBoard::new();
        let ch = attached(&mut board);
        assert_eq!(board.coils(PINS), [false; 4]);
        assert_eq!(ch.phase(), 0);
        assert!(!ch.is_energized());
    }

    #[test]
    fn forward_and_reverse_walk_the_table() {
        let mut board = SimBoard::new();
        let mut ch = attached(&mut board);

        assert!(ch.step_now(&mut board, Direction::Forward));
        assert_eq!(ch.phase(), 1);
        assert_eq!(board.coils(PINS), PHASES[1]);

        for _ in 0..3 {
            ch.step_now(&mut board, Direction::Reverse);
        }
        assert_eq!(ch.phase(), 6);
        assert_eq!(board.coils(PINS), PHASES[6]);

        ch.release(&mut board);
        assert_eq!(board.coils(PINS), [false; 4]);
        ch.hold(&mut board);
        assert_eq!(board.coils(PINS), PHASES[6]);
    }

    #[test]
    fn try_step_waits_for_interval() {
        let mut board = SimBoard::new();
        let mut ch = attached(&mut board);

        assert!(!ch.try_step(&mut board, Direction::Forward));
        board.advance_us(999);
        assert!(!ch.try_step(&mut board, Direction::Forward));
        assert_eq!(ch.phase(), 0);
        board.advance_us(1);
        assert!(ch.try_step(&mut board, Direction::Forward));
        assert!(!ch.try_step(&mut board, Direction::Forward));
        assert_eq!(ch.phase(), 1);
    }

    #[test]
    fn steps_across_clock_wrap() {
        let mut board = SimBoard::starting_at(u32::MAX as u64 - 200);
        let mut ch = attached(&mut board);
        board.advance_us(150);
        assert!(!ch.try_step(&mut board, Direction::Forward));
        // Now past the wrap.
        board.advance_us(100);
        assert!(board.now_us() < 1000);
        assert!(ch.try_step(&mut board, Direction::Forward));
    }

    #[test]
    fn detached_channel_does_nothing() {
        let mut board = SimBoard::new();
        let mut ch = StepperChannel::new(600, 10_000);
        board.advance_us(100_000);
        assert!(!ch.try_step(&mut board, Direction::Forward));
        assert!(!ch.step_now(&mut board, Direction::Forward));
        ch.hold(&mut board);
        assert!(!ch.is_energized());
        assert_eq!(board.digital_writes().len(), 0);
    }

    #[test]
    fn non_positive_speed_is_slowest() {
        let mut ch = StepperChannel::new(600, 10_000);
        ch.set_speed(0.0);
        assert_eq!(ch.interval_us(), 10_000);
        ch.set_speed(-5.0);
        assert_eq!(ch.interval_us(), 10_000);
        ch.set_speed(f32::NAN);
        assert_eq!(ch.interval_us(), 10_000);
        ch.set_speed(500.0);
        assert_eq!(ch.interval_us(), 2000);
        assert!((ch.speed() - 500.0).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn interval_is_clamped(rate in 0.001f32..1e7) {
            let mut ch = StepperChannel::new(600, 10_000);
            ch.set_speed(rate);
            prop_assert!((600..=10_000).contains(&ch.interval_us()));
        }
    }
}
