//! The terrapen's motion core: two stepper wheels, a pen servo, and the state
//! machine that turns commands into steps.
//!
//! Everything here is driven cooperatively. The main loop owns a
//! [`Controller`], feeds it commands, and calls [`Controller::tick`] as often
//! as it can; nothing blocks, sleeps or allocates.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod board;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod servo;
#[cfg(any(test, feature = "std"))]
pub mod sim;
pub mod stepper;
pub mod storage;

pub use board::{Board, Pin, PinState};
pub use config::{Config, ConfigBuilder, ConfigError, PinMap};
pub use coordinator::{CoordinateTarget, Coordinator, Goal, StepTargets};
pub use driver::Controller;
pub use error::{ErrorKind, ErrorLog, ErrorRecord, MotionError};
pub use servo::ServoChannel;
pub use stepper::{Direction, StepperChannel};
pub use storage::StoreError;
pub use terrapen_protocol::RobotState;
