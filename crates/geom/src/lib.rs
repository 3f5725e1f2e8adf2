//! Basic geometry of the terrapen, a two-wheeled differential-drive plotter.
//!
//! The robot's pose is `(x, y, theta)`: `x` grows to the right, `y` grows
//! forward, and a heading of zero faces `+y`. Positive rotation is
//! counter-clockwise. Lengths are in millimeters, angles in radians.
//!
//! This crate supports `no_std` and uses `libm` for its float math, so the
//! same kinematics run on the controller and on the host.

#![cfg_attr(not(feature = "std"), no_std)]

use core::f32::consts::{PI, TAU};
use libm::{atan2f, cosf, fabsf, remainderf, roundf, sinf, sqrtf};

pub struct Mm;

pub type Len = euclid::Length<f32, Mm>;
pub type Point = euclid::Point2D<f32, Mm>;
pub type Vector = euclid::Vector2D<f32, Mm>;

pub trait LenExt {
    fn mm(self) -> Len;
}

impl LenExt for f32 {
    fn mm(self) -> Len {
        Len::new(self)
    }
}

fn square<T: core::ops::Mul<T> + Copy>(x: T) -> <T as core::ops::Mul<T>>::Output {
    x * x
}

/// Shifts an angle into `[-PI, PI]` by whole turns.
pub fn normalize(theta: f32) -> f32 {
    if !theta.is_finite() {
        return theta;
    }
    // Subtracting one turn at a time would never finish for huge inputs.
    let mut theta = if fabsf(theta) > 4.0 * TAU {
        remainderf(theta, TAU)
    } else {
        theta
    };
    while theta > PI {
        theta -= TAU;
    }
    while theta < -PI {
        theta += TAU;
    }
    theta
}

/// The signed rotation, in `[-PI, PI]`, that takes heading `from` to heading `to`.
pub fn shortest_delta(from: f32, to: f32) -> f32 {
    normalize(to - from)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LeftRight<T> {
    pub left: T,
    pub right: T,
}

/// Signed step counts on the two wheels. Positive counts drive a wheel forward.
pub type WheelSteps = LeftRight<i32>;

impl WheelSteps {
    pub fn new(left: i32, right: i32) -> Self {
        WheelSteps { left, right }
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// A body-frame motion: a distance along the current heading and a change of heading.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Motion {
    pub distance: f32,
    pub rotation: f32,
}

impl Motion {
    pub fn straight(distance: f32) -> Self {
        Motion {
            distance,
            rotation: 0.0,
        }
    }

    pub fn rotate(rotation: f32) -> Self {
        Motion {
            distance: 0.0,
            rotation,
        }
    }
}

/// The dead-reckoned position and heading of the robot.
#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    /// Heading in radians, always in `[-PI, PI]`.
    pub theta: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Pose {
            x,
            y,
            theta: normalize(theta),
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn distance_to(&self, p: &Point) -> f32 {
        sqrtf(square(p.x - self.x) + square(p.y - self.y))
    }

    /// The azimuth of `p` as seen from this pose, measured from `+y`.
    pub fn heading_to(&self, p: &Point) -> f32 {
        atan2f(p.x - self.x, p.y - self.y)
    }

    /// How far we need to rotate in order to face `p`.
    pub fn turn_angle_to(&self, p: &Point) -> f32 {
        shortest_delta(self.theta, self.heading_to(p))
    }

    /// Integrates a small motion with a single Euler step.
    ///
    /// The translation uses the heading from *before* the rotation is applied.
    pub fn advance(&mut self, motion: Motion) {
        self.x += motion.distance * sinf(self.theta);
        self.y += motion.distance * cosf(self.theta);
        self.theta = normalize(self.theta + motion.rotation);
    }

    pub fn theta_degrees(&self) -> f32 {
        self.theta.to_degrees()
    }
}

/// The drive geometry: wheel size, wheel spacing and stepper resolution.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Geometry {
    pub wheel_diameter: Len,
    /// Distance between the two wheel contact points.
    pub wheelbase: Len,
    /// How many steps does it take for a wheel to make one revolution?
    pub steps_per_revolution: u16,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            wheel_diameter: 25.0.mm(),
            wheelbase: 30.0.mm(),
            steps_per_revolution: 2048,
        }
    }
}

impl Geometry {
    pub fn new(wheel_diameter: Len, wheelbase: Len, steps_per_revolution: u16) -> Self {
        Geometry {
            wheel_diameter,
            wheelbase,
            steps_per_revolution,
        }
    }

    pub fn is_valid(&self) -> bool {
        let d = self.wheel_diameter.get();
        let w = self.wheelbase.get();
        d.is_finite() && d > 0.0 && w.is_finite() && w > 0.0 && self.steps_per_revolution > 0
    }

    pub fn wheel_circumference(&self) -> Len {
        self.wheel_diameter * PI
    }

    /// How far a wheel rolls in a single step.
    pub fn mm_per_step(&self) -> f32 {
        self.wheel_circumference().get() / self.steps_per_revolution as f32
    }

    pub fn steps_per_mm(&self) -> f32 {
        self.steps_per_revolution as f32 / self.wheel_circumference().get()
    }

    /// Forward kinematics: what body motion do these wheel steps produce?
    pub fn steps_to_motion(&self, steps: &WheelSteps) -> Motion {
        let mm_per_step = self.mm_per_step();
        let left = steps.left as f32 * mm_per_step;
        let right = steps.right as f32 * mm_per_step;
        Motion {
            distance: (left + right) / 2.0,
            rotation: (right - left) / self.wheelbase.get(),
        }
    }

    /// Inverse kinematics: the wheel steps that best approximate a body motion.
    ///
    /// Each wheel rolls the requested distance plus or minus the arc that it
    /// sweeps while the body rotates about its center. Rounding is half away from zero.
    pub fn motion_to_steps(&self, motion: &Motion) -> WheelSteps {
        let arc = motion.rotation * self.wheelbase.get() / 2.0;
        let mm_per_step = self.mm_per_step();
        WheelSteps {
            left: roundf((motion.distance - arc) / mm_per_step) as i32,
            right: roundf((motion.distance + arc) / mm_per_step) as i32,
        }
    }

    /// The wheel step rate for a linear speed, in mm per second.
    pub fn linear_step_rate(&self, mm_per_s: f32) -> f32 {
        mm_per_s * self.steps_per_mm()
    }

    /// The wheel step rate for spinning in place, in radians per second.
    pub fn angular_step_rate(&self, rad_per_s: f32) -> f32 {
        self.linear_step_rate(rad_per_s * self.wheelbase.get() / 2.0)
    }
}

/// The axis-aligned rectangle of reachable targets. Both edges are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Workspace {
    pub min: Point,
    pub max: Point,
}

impl Default for Workspace {
    fn default() -> Self {
        Workspace {
            min: Point::new(-100.0, -100.0),
            max: Point::new(100.0, 100.0),
        }
    }
}

impl Workspace {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Workspace {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.x < self.max.x && self.min.y < self.max.y
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.min.x <= p.x && p.x <= self.max.x && self.min.y <= p.y && p.y <= self.max.y
    }

    pub fn size(&self) -> Vector {
        self.max - self.min
    }
}
