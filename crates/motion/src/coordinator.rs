//! The motion state machine.
//!
//! A [`Coordinator`] owns both wheel channels, the pen servo and the
//! dead-reckoned pose. Commands are accepted only while idle. They plant a
//! [`Goal`], and every call to [`Coordinator::tick`] advances that goal by at
//! most one step per wheel.

use libm::fabsf;
use log::{debug, info, trace, warn};
use terrapen_geom::{shortest_delta, LeftRight, Motion, Point, Pose, WheelSteps};
use terrapen_protocol::RobotState;

use crate::board::Board;
use crate::config::Config;
use crate::error::{ErrorKind, ErrorLog, ErrorRecord, MotionError};
use crate::servo::ServoChannel;
use crate::stepper::{Direction, StepperChannel};

/// A coordinate move is finished once we're this close to the target, in mm.
pub const ARRIVAL_TOLERANCE: f32 = 0.5;
/// Heading errors larger than this (about 5 degrees) are fixed by turning in place.
pub const HEADING_TOLERANCE: f32 = 0.087;
/// Coordinate moves creep forward at most this far, in mm, before re-aiming.
pub const MAX_SEGMENT: f32 = 1.0;

/// Per-wheel step targets and how far we've got toward them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepTargets {
    pub target: WheelSteps,
    pub done: WheelSteps,
}

impl StepTargets {
    pub fn new(target: WheelSteps) -> Self {
        StepTargets {
            target,
            done: WheelSteps::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done == self.target
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateTarget {
    pub target: Point,
    /// mm/s
    pub speed: f32,
    /// Whether the pen was lowered when the move was accepted.
    pub drawing: bool,
    /// The turn or straight creep currently being executed.
    pub segment: StepTargets,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Goal {
    #[default]
    Idle,
    Steps(StepTargets),
    Coordinate(CoordinateTarget),
}

pub struct Coordinator<B> {
    board: B,
    config: Config,
    left: StepperChannel,
    right: StepperChannel,
    servo: ServoChannel,
    pose: Pose,
    goal: Goal,
    state: RobotState,
    pen_down: bool,
    totals: LeftRight<i32>,
    goal_started_ms: u32,
    init_error: Option<ErrorKind>,
    errors: ErrorLog,
}

impl<B: Board> Coordinator<B> {
    /// Validates `config` and attaches the hardware.
    ///
    /// An invalid config doesn't fail construction: the machine comes up
    /// latched in `Error`, with nothing attached, until [`Coordinator::reconfigure`]
    /// is given a good one.
    pub fn new(board: B, config: Config) -> Self {
        let mut coord = Coordinator {
            board,
            config,
            left: StepperChannel::new(config.min_step_delay_us, config.max_step_delay_us),
            right: StepperChannel::new(config.min_step_delay_us, config.max_step_delay_us),
            servo: ServoChannel::new(),
            pose: Pose::default(),
            goal: Goal::Idle,
            state: RobotState::Idle,
            pen_down: false,
            totals: LeftRight::default(),
            goal_started_ms: 0,
            init_error: None,
            errors: ErrorLog::new(),
        };

        match config.validate() {
            Ok(()) => {
                coord.attach();
                info!("motion core ready");
            }
            Err(e) => {
                let kind = match e.kind() {
                    ErrorKind::InvalidConfig => ErrorKind::HardwareInitFailed,
                    kind => kind,
                };
                warn!("hardware init failed: {e}");
                coord.init_error = Some(kind);
                coord.state = RobotState::Error;
                let now = coord.board.now_ms();
                coord
                    .errors
                    .record(MotionError::new(kind, format_args!("{e}")), now);
            }
        }
        coord
    }

    fn attach(&mut self) {
        let c = &self.config;
        self.left = StepperChannel::new(c.min_step_delay_us, c.max_step_delay_us);
        self.right = StepperChannel::new(c.min_step_delay_us, c.max_step_delay_us);
        self.left.attach(&mut self.board, c.pins.left);
        self.right.attach(&mut self.board, c.pins.right);
        self.left.set_speed(c.step_rate());
        self.right.set_speed(c.step_rate());
        self.servo
            .attach(&mut self.board, c.pins.servo, c.pen_up_angle as i32);
        self.pen_down = false;
    }

    fn detach(&mut self) {
        self.left.detach(&mut self.board);
        self.right.detach(&mut self.board);
        self.servo.detach(&mut self.board);
    }

    /// Swaps in a new hardware configuration.
    ///
    /// Refused while moving. On success, a machine that failed to initialize becomes idle.
    pub fn reconfigure(&mut self, config: Config) -> Result<(), MotionError> {
        if self.state == RobotState::Moving {
            return self.reject(MotionError::new(
                ErrorKind::InvalidState,
                format_args!("cannot reconfigure while moving"),
            ));
        }
        if let Err(e) = config.validate() {
            return self.reject(MotionError::new(e.kind(), format_args!("{e}")));
        }

        self.detach();
        self.config = config;
        self.attach();
        if self.init_error.take().is_some() {
            self.set_state(RobotState::Idle);
        }
        Ok(())
    }

    // Commands.

    pub fn move_forward(&mut self, steps: i32) -> Result<(), MotionError> {
        self.start_steps(steps, |n| WheelSteps::new(n, n))
    }

    pub fn move_backward(&mut self, steps: i32) -> Result<(), MotionError> {
        self.start_steps(steps, |n| WheelSteps::new(-n, -n))
    }

    pub fn turn_left(&mut self, steps: i32) -> Result<(), MotionError> {
        self.start_steps(steps, |n| WheelSteps::new(-n, n))
    }

    pub fn turn_right(&mut self, steps: i32) -> Result<(), MotionError> {
        self.start_steps(steps, |n| WheelSteps::new(n, -n))
    }

    /// Travels to `(x, y)` with the pen raised.
    pub fn move_to(&mut self, x: f32, y: f32, speed: f32) -> Result<(), MotionError> {
        self.start_coordinate(x, y, speed, false)
    }

    /// Travels to `(x, y)` with the pen lowered.
    pub fn draw_to(&mut self, x: f32, y: f32, speed: f32) -> Result<(), MotionError> {
        self.start_coordinate(x, y, speed, true)
    }

    pub fn move_by(&mut self, dx: f32, dy: f32, speed: f32) -> Result<(), MotionError> {
        self.move_to(self.pose.x + dx, self.pose.y + dy, speed)
    }

    pub fn draw_by(&mut self, dx: f32, dy: f32, speed: f32) -> Result<(), MotionError> {
        self.draw_to(self.pose.x + dx, self.pose.y + dy, speed)
    }

    /// Turns in place to face `theta`, the short way round.
    pub fn turn_to(&mut self, theta: f32, angular_speed: f32) -> Result<(), MotionError> {
        self.ensure_idle()?;
        if !theta.is_finite() {
            return self.reject(MotionError::new(
                ErrorKind::InvalidCoordinates,
                format_args!("heading {theta} is not finite"),
            ));
        }
        self.start_turn(shortest_delta(self.pose.theta, theta), angular_speed)
    }

    /// Turns in place by `delta` radians; positive is counter-clockwise.
    pub fn turn_by(&mut self, delta: f32, angular_speed: f32) -> Result<(), MotionError> {
        self.ensure_idle()?;
        if !delta.is_finite() {
            return self.reject(MotionError::new(
                ErrorKind::InvalidCoordinates,
                format_args!("turn {delta} is not finite"),
            ));
        }
        self.start_turn(delta, angular_speed)
    }

    pub fn pen_up(&mut self) {
        self.set_pen(false);
    }

    pub fn pen_down(&mut self) {
        self.set_pen(true);
    }

    fn set_pen(&mut self, down: bool) {
        let angle = if down {
            self.config.pen_down_angle
        } else {
            self.config.pen_up_angle
        };
        if down != self.pen_down {
            debug!("pen {}", if down { "down" } else { "up" });
        }
        self.pen_down = down;
        self.servo
            .sweep_to(&self.board, angle as i32, self.config.servo_move_ms);
    }

    /// Drops the coils and abandons whatever we were doing. Always succeeds.
    pub fn emergency_stop(&mut self) {
        self.left.release(&mut self.board);
        self.right.release(&mut self.board);
        self.goal = Goal::Idle;
        if self.state != RobotState::EmergencyStop {
            warn!("emergency stop");
        }
        self.set_state(RobotState::EmergencyStop);
    }

    /// Leaves `Error` or `EmergencyStop`.
    pub fn clear(&mut self) -> Result<(), MotionError> {
        match self.state {
            RobotState::Error | RobotState::EmergencyStop => {
                if let Some(kind) = self.init_error {
                    return self.reject(MotionError::new(
                        ErrorKind::HardwareInitFailed,
                        format_args!("init failed with {kind}"),
                    ));
                }
                self.left.release(&mut self.board);
                self.right.release(&mut self.board);
                self.goal = Goal::Idle;
                self.set_state(RobotState::Idle);
                Ok(())
            }
            state => self.reject(MotionError::new(
                ErrorKind::InvalidState,
                format_args!("nothing to clear in {state:?}"),
            )),
        }
    }

    /// Declares the current pose and zeroes the step counters.
    pub fn reset_position(&mut self, x: f32, y: f32, theta: f32) -> Result<(), MotionError> {
        if self.state == RobotState::Moving {
            return self.reject(MotionError::new(
                ErrorKind::InvalidState,
                format_args!("cannot reset position while moving"),
            ));
        }
        if !(x.is_finite() && y.is_finite() && theta.is_finite()) {
            return self.reject(MotionError::new(
                ErrorKind::InvalidCoordinates,
                format_args!("pose ({x}, {y}, {theta}) is not finite"),
            ));
        }
        self.pose = Pose::new(x, y, theta);
        self.totals = LeftRight::default();
        debug!("position reset to ({x}, {y}, {})", self.pose.theta);
        Ok(())
    }

    pub fn reset_step_counts(&mut self) {
        self.totals = LeftRight::default();
    }

    // Queries.

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn goal(&self) -> Goal {
        self.goal
    }

    pub fn is_busy(&self) -> bool {
        self.state != RobotState::Idle
    }

    /// Is there nothing left to do? True when idle and not latched in a fault.
    pub fn is_at_target(&self) -> bool {
        self.state == RobotState::Idle && self.goal == Goal::Idle
    }

    pub fn is_pen_down(&self) -> bool {
        self.pen_down
    }

    pub fn left_steps_total(&self) -> i32 {
        self.totals.left
    }

    pub fn right_steps_total(&self) -> i32 {
        self.totals.right
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.errors.last()
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// How long the current goal has been running, if there is one.
    pub fn goal_elapsed_ms(&self) -> Option<u32> {
        (self.state == RobotState::Moving)
            .then(|| self.board.now_ms().wrapping_sub(self.goal_started_ms))
    }

    /// Logs an error raised outside the core, e.g. a host-side deadline.
    /// The state is left alone.
    pub fn report(&mut self, err: MotionError) {
        warn!("{err}");
        self.record(err);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn left(&self) -> &StepperChannel {
        &self.left
    }

    pub fn right(&self) -> &StepperChannel {
        &self.right
    }

    pub fn servo(&self) -> &ServoChannel {
        &self.servo
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn now_ms(&self) -> u32 {
        self.board.now_ms()
    }

    /// Advances the machine by one bounded, non-blocking step.
    ///
    /// In order: the servo sweep, then one step attempt per wheel, then a
    /// single pose update covering whichever steps fired.
    pub fn tick(&mut self) {
        self.servo.tick(&mut self.board);
        if self.state != RobotState::Moving {
            return;
        }

        match self.goal {
            Goal::Idle => self.finish(),
            Goal::Steps(mut steps) => {
                self.step_toward(&mut steps);
                if steps.is_complete() {
                    self.finish();
                } else {
                    self.goal = Goal::Steps(steps);
                }
            }
            Goal::Coordinate(mut coord) => {
                if coord.segment.is_complete() {
                    match self.plan_segment(&coord.target) {
                        Some(segment) => coord.segment = segment,
                        None => {
                            self.finish();
                            return;
                        }
                    }
                }
                self.step_toward(&mut coord.segment);
                self.goal = Goal::Coordinate(coord);
            }
        }
    }

    fn step_toward(&mut self, steps: &mut StepTargets) {
        let mut fired = WheelSteps::default();
        if let Some(dir) = Direction::toward(steps.done.left, steps.target.left) {
            if self.left.try_step(&mut self.board, dir) {
                fired.left = dir.sign();
            }
        }
        if let Some(dir) = Direction::toward(steps.done.right, steps.target.right) {
            if self.right.try_step(&mut self.board, dir) {
                fired.right = dir.sign();
            }
        }
        if fired.is_zero() {
            return;
        }

        steps.done.left += fired.left;
        steps.done.right += fired.right;
        self.totals.left = self.totals.left.wrapping_add(fired.left);
        self.totals.right = self.totals.right.wrapping_add(fired.right);
        self.pose
            .advance(self.config.geometry.steps_to_motion(&fired));
    }

    /// Picks the next turn or creep toward `target`, or `None` if we're there.
    fn plan_segment(&self, target: &Point) -> Option<StepTargets> {
        let distance = self.pose.distance_to(target);
        if distance < ARRIVAL_TOLERANCE {
            return None;
        }
        let turn = self.pose.turn_angle_to(target);
        let motion = if fabsf(turn) > HEADING_TOLERANCE {
            Motion::rotate(turn)
        } else {
            Motion::straight(distance.min(MAX_SEGMENT))
        };
        let steps = self.config.geometry.motion_to_steps(&motion);
        if steps.is_zero() {
            // The wheels can't resolve anything finer; this is as close as we get.
            debug!("stopping {distance} mm short of target, below step resolution");
            return None;
        }
        trace!("segment {motion:?} -> {steps:?}");
        Some(StepTargets::new(steps))
    }

    fn finish(&mut self) {
        self.goal = Goal::Idle;
        self.set_state(RobotState::Idle);
        debug!(
            "goal complete at ({}, {}, {})",
            self.pose.x, self.pose.y, self.pose.theta
        );
    }

    fn set_state(&mut self, state: RobotState) {
        if state != self.state {
            info!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn record(&mut self, err: MotionError) {
        let now = self.board.now_ms();
        self.errors.record(err, now);
    }

    fn reject(&mut self, err: MotionError) -> Result<(), MotionError> {
        warn!("rejected: {err}");
        self.record(err.clone());
        Err(err)
    }

    fn ensure_idle(&mut self) -> Result<(), MotionError> {
        match self.state {
            RobotState::Idle => Ok(()),
            state => self.reject(MotionError::new(
                ErrorKind::MovementBlocked,
                format_args!("robot is {state:?}"),
            )),
        }
    }

    fn check_speed(&mut self, speed: f32, max: f32, unit: &str) -> Result<(), MotionError> {
        if speed.is_finite() && speed > 0.0 && speed <= max {
            Ok(())
        } else {
            self.reject(MotionError::new(
                ErrorKind::InvalidSpeed,
                format_args!("{speed} {unit} outside (0, {max}]"),
            ))
        }
    }

    fn start_steps(
        &mut self,
        steps: i32,
        targets: impl FnOnce(i32) -> WheelSteps,
    ) -> Result<(), MotionError> {
        self.ensure_idle()?;
        let max = self.config.max_continuous_steps;
        if steps <= 0 || steps as u32 > max {
            return self.reject(MotionError::new(
                ErrorKind::InvalidSteps,
                format_args!("{steps} steps outside [1, {max}]"),
            ));
        }
        self.begin(Goal::Steps(StepTargets::new(targets(steps))), self.config.step_rate());
        Ok(())
    }

    fn start_turn(&mut self, delta: f32, angular_speed: f32) -> Result<(), MotionError> {
        self.check_speed(angular_speed, self.config.max_angular_speed, "rad/s")?;
        let geometry = self.config.geometry;
        let steps = geometry.motion_to_steps(&Motion::rotate(delta));
        self.begin(
            Goal::Steps(StepTargets::new(steps)),
            geometry.angular_step_rate(angular_speed),
        );
        Ok(())
    }

    fn start_coordinate(
        &mut self,
        x: f32,
        y: f32,
        speed: f32,
        drawing: bool,
    ) -> Result<(), MotionError> {
        self.ensure_idle()?;
        if !(x.is_finite() && y.is_finite()) {
            return self.reject(MotionError::new(
                ErrorKind::InvalidCoordinates,
                format_args!("target ({x}, {y}) is not finite"),
            ));
        }
        let target = Point::new(x, y);
        if !self.config.workspace.contains(&target) {
            return self.reject(MotionError::new(
                ErrorKind::WorkspaceViolation,
                format_args!("target ({x}, {y}) outside workspace"),
            ));
        }
        self.check_speed(speed, self.config.max_speed, "mm/s")?;

        self.set_pen(drawing);
        let rate = self.config.geometry.linear_step_rate(speed);
        self.begin(
            Goal::Coordinate(CoordinateTarget {
                target,
                speed,
                drawing,
                segment: StepTargets::default(),
            }),
            rate,
        );
        Ok(())
    }

    fn begin(&mut self, goal: Goal, steps_per_second: f32) {
        debug!("accepted {goal:?} at {steps_per_second} steps/s");
        self.left.set_speed(steps_per_second);
        self.right.set_speed(steps_per_second);
        self.goal = goal;
        self.goal_started_ms = self.board.now_ms();
        self.set_state(RobotState::Moving);
    }
}
