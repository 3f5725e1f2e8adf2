use libm::floorf;

use crate::board::{Board, Pin};

/// Sweeps shorter than this are stretched to it.
pub const MIN_SWEEP_MS: u32 = 10;
pub const MAX_ANGLE: u8 = 180;

fn clamp_angle(degrees: i32) -> u8 {
    degrees.clamp(0, MAX_ANGLE as i32) as u8
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Sweep {
    start: u8,
    target: u8,
    start_ms: u32,
    duration_ms: u32,
}

/// A hobby servo that can move either immediately or by a timed linear sweep.
#[derive(Clone, Debug, Default)]
pub struct ServoChannel {
    pin: Option<Pin>,
    current: u8,
    target: u8,
    sweep: Option<Sweep>,
}

impl ServoChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<B: Board>(&mut self, board: &mut B, pin: Pin, initial: i32) {
        let deg = clamp_angle(initial);
        self.pin = Some(pin);
        self.current = deg;
        self.target = deg;
        self.sweep = None;
        board.write_servo(pin, deg);
    }

    pub fn detach<B: Board>(&mut self, board: &mut B) {
        if let Some(pin) = self.pin.take() {
            board.release_servo(pin);
        }
        self.sweep = None;
    }

    pub fn is_attached(&self) -> bool {
        self.pin.is_some()
    }

    /// Moves straight to `degrees`, cancelling any sweep.
    pub fn set_angle<B: Board>(&mut self, board: &mut B, degrees: i32) {
        let Some(pin) = self.pin else {
            return;
        };
        let deg = clamp_angle(degrees);
        self.sweep = None;
        self.current = deg;
        self.target = deg;
        board.write_servo(pin, deg);
    }

    /// Starts a linear sweep from the current angle to `degrees`. The sweep is
    /// advanced by [`ServoChannel::tick`].
    pub fn sweep_to<B: Board>(&mut self, board: &B, degrees: i32, duration_ms: u32) {
        if self.pin.is_none() {
            return;
        }
        let deg = clamp_angle(degrees);
        self.target = deg;
        if deg == self.current {
            // Asking for where we already are ends any sweep in progress.
            self.sweep = None;
            return;
        }
        self.sweep = Some(Sweep {
            start: self.current,
            target: deg,
            start_ms: board.now_ms(),
            duration_ms: duration_ms.max(MIN_SWEEP_MS),
        });
    }

    pub fn tick<B: Board>(&mut self, board: &mut B) {
        let (Some(pin), Some(sweep)) = (self.pin, self.sweep) else {
            return;
        };
        let p = Self::fraction(&sweep, board.now_ms());
        let next = if p >= 1.0 {
            self.sweep = None;
            sweep.target
        } else {
            let span = sweep.target as f32 - sweep.start as f32;
            floorf(sweep.start as f32 + p * span + 0.5) as u8
        };
        if next != self.current {
            self.current = next;
            board.write_servo(pin, next);
        }
    }

    /// Freezes a sweep where it currently is.
    pub fn stop(&mut self) {
        self.sweep = None;
        self.target = self.current;
    }

    pub fn is_moving(&self) -> bool {
        self.sweep.is_some()
    }

    pub fn angle(&self) -> u8 {
        self.current
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    /// How far the sweep has come, in `[0, 1]`. Idle servos report 1.
    pub fn progress<B: Board>(&self, board: &B) -> f32 {
        match &self.sweep {
            Some(sweep) => Self::fraction(sweep, board.now_ms()),
            None => 1.0,
        }
    }

    fn fraction(sweep: &Sweep, now_ms: u32) -> f32 {
        let elapsed = now_ms.wrapping_sub(sweep.start_ms) as f32;
        (elapsed / sweep.duration_ms as f32).clamp(0.0, 1.0)
    }
}
