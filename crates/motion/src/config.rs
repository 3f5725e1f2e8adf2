use terrapen_geom::{Geometry, Len, Workspace};

use crate::board::Pin;
use crate::error::ErrorKind;

/// The highest pin number the controller board exposes.
pub const MAX_PIN: u8 = 19;
pub const MIN_TIMING_US: u32 = 100;
pub const MAX_TIMING_US: u32 = 100_000;

/// Which board outputs drive what.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PinMap {
    pub left: [Pin; 4],
    pub right: [Pin; 4],
    pub servo: Pin,
    pub telemetry: Option<Pin>,
}

impl Default for PinMap {
    fn default() -> Self {
        PinMap {
            left: [Pin(2), Pin(3), Pin(4), Pin(5)],
            right: [Pin(6), Pin(7), Pin(8), Pin(9)],
            servo: Pin(10),
            telemetry: None,
        }
    }
}

impl PinMap {
    pub fn iter(&self) -> impl Iterator<Item = Pin> + '_ {
        self.left
            .iter()
            .chain(self.right.iter())
            .copied()
            .chain(core::iter::once(self.servo))
            .chain(self.telemetry)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pin) = self.iter().find(|p| p.0 > MAX_PIN) {
            return Err(ConfigError::InvalidPin(pin.0));
        }
        for (i, pin) in self.iter().enumerate() {
            if self.iter().skip(i + 1).any(|other| other == pin) {
                return Err(ConfigError::PinConflict(pin.0));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("pin {0} is out of range")]
    InvalidPin(u8),
    #[error("pin {0} is assigned twice")]
    PinConflict(u8),
    #[error("step timing out of range")]
    InvalidTiming,
    #[error("wheel geometry must be positive")]
    InvalidGeometry,
    #[error("workspace is empty")]
    InvalidWorkspace,
    #[error("servo angle {0} is over 180")]
    InvalidServoAngle(u8),
    #[error("speed limits must be positive")]
    InvalidSpeedLimit,
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::InvalidPin(_) => ErrorKind::InvalidPin,
            ConfigError::PinConflict(_) => ErrorKind::PinConflict,
            _ => ErrorKind::InvalidConfig,
        }
    }
}

/// The hardware snapshot the motion core runs with. It doesn't change while
/// the machine is running; see [`crate::Coordinator::reconfigure`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub geometry: Geometry,
    pub workspace: Workspace,
    pub pins: PinMap,

    /// Step interval for step-count moves.
    pub step_delay_us: u32,
    pub min_step_delay_us: u32,
    pub max_step_delay_us: u32,

    pub pen_up_angle: u8,
    pub pen_down_angle: u8,
    pub servo_move_ms: u32,

    /// mm/s
    pub default_speed: f32,
    /// mm/s
    pub default_draw_speed: f32,
    /// mm/s
    pub max_speed: f32,
    /// rad/s
    pub max_angular_speed: f32,

    pub max_continuous_steps: u32,
    /// Deadline the controller gives each goal before stopping it. Zero
    /// disables it.
    pub movement_timeout_ms: u32,
    /// Zero disables periodic status frames.
    pub status_interval_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pins.validate()?;

        let timing = [
            self.min_step_delay_us,
            self.step_delay_us,
            self.max_step_delay_us,
        ];
        if timing
            .iter()
            .any(|t| !(MIN_TIMING_US..=MAX_TIMING_US).contains(t))
            || self.min_step_delay_us >= self.max_step_delay_us
            || !(self.min_step_delay_us..=self.max_step_delay_us).contains(&self.step_delay_us)
        {
            return Err(ConfigError::InvalidTiming);
        }

        if !self.geometry.is_valid() {
            return Err(ConfigError::InvalidGeometry);
        }
        if !self.workspace.is_valid() {
            return Err(ConfigError::InvalidWorkspace);
        }
        for angle in [self.pen_up_angle, self.pen_down_angle] {
            if angle > 180 {
                return Err(ConfigError::InvalidServoAngle(angle));
            }
        }

        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !(positive(self.default_speed)
            && positive(self.default_draw_speed)
            && positive(self.max_speed)
            && positive(self.max_angular_speed))
            || self.default_speed > self.max_speed
            || self.default_draw_speed > self.max_speed
            || self.max_continuous_steps == 0
        {
            return Err(ConfigError::InvalidSpeedLimit);
        }
        Ok(())
    }

    /// The step rate used by step-count moves.
    pub fn step_rate(&self) -> f32 {
        1_000_000.0 / self.step_delay_us as f32
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                geometry: Geometry::default(),
                workspace: Workspace::default(),
                pins: PinMap::default(),
                step_delay_us: 1000,
                min_step_delay_us: 600,
                max_step_delay_us: 10_000,
                pen_up_angle: 90,
                pen_down_angle: 45,
                servo_move_ms: 500,
                default_speed: 15.0,
                default_draw_speed: 10.0,
                max_speed: 50.0,
                max_angular_speed: 1.0,
                max_continuous_steps: 50_000,
                movement_timeout_ms: 0,
                status_interval_ms: 1000,
            },
        }
    }
}

impl ConfigBuilder {
    pub fn build(&self) -> Config {
        self.config
    }

    pub fn with_wheel_diameter(&mut self, diameter: Len) -> &mut Self {
        self.config.geometry.wheel_diameter = diameter;
        self
    }

    pub fn with_wheelbase(&mut self, wheelbase: Len) -> &mut Self {
        self.config.geometry.wheelbase = wheelbase;
        self
    }

    pub fn with_steps_per_revolution(&mut self, steps: u16) -> &mut Self {
        self.config.geometry.steps_per_revolution = steps;
        self
    }

    pub fn with_workspace(&mut self, workspace: Workspace) -> &mut Self {
        self.config.workspace = workspace;
        self
    }

    pub fn with_pins(&mut self, pins: PinMap) -> &mut Self {
        self.config.pins = pins;
        self
    }

    pub fn with_step_delay(&mut self, delay_us: u32, min_us: u32, max_us: u32) -> &mut Self {
        self.config.step_delay_us = delay_us;
        self.config.min_step_delay_us = min_us;
        self.config.max_step_delay_us = max_us;
        self
    }

    pub fn with_pen_angles(&mut self, up: u8, down: u8) -> &mut Self {
        self.config.pen_up_angle = up;
        self.config.pen_down_angle = down;
        self
    }

    pub fn with_servo_move_ms(&mut self, ms: u32) -> &mut Self {
        self.config.servo_move_ms = ms;
        self
    }

    pub fn with_default_speeds(&mut self, travel: f32, draw: f32) -> &mut Self {
        self.config.default_speed = travel;
        self.config.default_draw_speed = draw;
        self
    }

    pub fn with_speed_limits(&mut self, linear: f32, angular: f32) -> &mut Self {
        self.config.max_speed = linear;
        self.config.max_angular_speed = angular;
        self
    }

    pub fn with_max_continuous_steps(&mut self, steps: u32) -> &mut Self {
        self.config.max_continuous_steps = steps;
        self
    }

    pub fn with_movement_timeout_ms(&mut self, ms: u32) -> &mut Self {
        self.config.movement_timeout_ms = ms;
        self
    }

    pub fn with_status_interval_ms(&mut self, ms: u32) -> &mut Self {
        self.config.status_interval_ms = ms;
        self
    }
}
