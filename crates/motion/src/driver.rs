use core::fmt::Write as _;

use log::{debug, warn};
use terrapen_protocol::{Cmd, Message, Response};

use crate::board::Board;
use crate::coordinator::Coordinator;
use crate::error::{ErrorKind, MotionError};

/// The value the main loop owns: a coordinator plus the frame dispatch and
/// periodic status reporting around it.
pub struct Controller<B> {
    coordinator: Coordinator<B>,
    last_status_ms: u32,
}

impl<B: Board> Controller<B> {
    pub fn new(coordinator: Coordinator<B>) -> Self {
        let last_status_ms = coordinator.now_ms();
        Controller {
            coordinator,
            last_status_ms,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<B> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut Coordinator<B> {
        &mut self.coordinator
    }

    pub fn into_coordinator(self) -> Coordinator<B> {
        self.coordinator
    }

    /// Runs one coordinator tick, returning a status frame if one is due.
    ///
    /// A goal still running after `movement_timeout_ms` is cut short with an
    /// emergency stop, and `MOVEMENT_TIMEOUT` is logged.
    pub fn tick(&mut self) -> Option<Response> {
        self.coordinator.tick();
        self.enforce_deadline();

        let interval = self.coordinator.config().status_interval_ms;
        let now = self.coordinator.now_ms();
        if interval > 0 && now.wrapping_sub(self.last_status_ms) >= interval {
            self.last_status_ms = now;
            Some(self.status())
        } else {
            None
        }
    }

    fn enforce_deadline(&mut self) {
        let limit = self.coordinator.config().movement_timeout_ms;
        let Some(elapsed) = self.coordinator.goal_elapsed_ms() else {
            return;
        };
        if limit > 0 && elapsed > limit {
            warn!("goal overran its {limit} ms deadline");
            self.coordinator.emergency_stop();
            self.coordinator.report(MotionError::new(
                ErrorKind::MovementTimeout,
                format_args!("goal still running after {elapsed} ms"),
            ));
        }
    }

    pub fn handle(&mut self, cmd: &Cmd) -> Response {
        debug!("handling {cmd:?}");
        let config = *self.coordinator.config();
        let c = &mut self.coordinator;
        let result = match *cmd {
            Cmd::MoveTo { x, y, pen_down } => {
                if pen_down {
                    c.draw_to(x, y, config.default_draw_speed)
                } else {
                    c.move_to(x, y, config.default_speed)
                }
            }
            Cmd::DrawTo { x, y } => c.draw_to(x, y, config.default_draw_speed),
            Cmd::SetPen { down } => {
                if down {
                    c.pen_down();
                } else {
                    c.pen_up();
                }
                Ok(())
            }
            Cmd::GetPosition => return self.position(),
            Cmd::Home => c.move_to(0.0, 0.0, config.default_speed),
            Cmd::EmergencyStop => {
                c.emergency_stop();
                Ok(())
            }
            Cmd::GetStatus => return self.status(),
        };

        let timestamp = self.coordinator.now_ms();
        match result {
            Ok(()) => Response::Ack { timestamp },
            Err(e) => {
                let mut message = Message::new();
                // Overlong messages are cut short.
                let _ = write!(message, "{e}");
                Response::Nack { message, timestamp }
            }
        }
    }

    pub fn status(&self) -> Response {
        Response::Status {
            state: self.coordinator.state(),
            pen_down: self.coordinator.is_pen_down(),
            timestamp: self.coordinator.now_ms(),
        }
    }

    pub fn position(&self) -> Response {
        let pose = self.coordinator.pose();
        Response::Position {
            x: pose.x,
            y: pose.y,
            angle: pose.theta,
            timestamp: self.coordinator.now_ms(),
        }
    }

    /// Handles one JSON command line and returns the JSON response line.
    #[cfg(feature = "std")]
    pub fn handle_line(&mut self, line: &str) -> String {
        let response = match terrapen_protocol::parse_line(line) {
            Ok(cmd) => self.handle(&cmd),
            Err(e) => {
                log::warn!("bad frame {line:?}: {e}");
                Response::nack(&e.to_string(), self.coordinator.now_ms())
            }
        };
        terrapen_protocol::encode_line(&response)
            .unwrap_or_else(|_| String::from(r#"{"response":129,"error_message":"encode failed"}"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::sim::{run_controller_until_settled, SimBoard};
    use terrapen_protocol::RobotState;

    fn controller() -> Controller<SimBoard> {
        Controller::new(Coordinator::new(
            SimBoard::new(),
            ConfigBuilder::default().build(),
        ))
    }

    #[test]
    fn move_to_uses_default_speed() {
        let mut ctl = controller();
        let resp = ctl.handle(&Cmd::MoveTo {
            x: 0.0,
            y: 5.0,
            pen_down: false,
        });
        assert_eq!(resp, Response::Ack { timestamp: 0 });
        assert_eq!(ctl.coordinator().state(), RobotState::Moving);
        // 15 mm/s is about 391 steps/s.
        assert!((2556..=2557).contains(&ctl.coordinator().left().interval_us()));
        assert!(!ctl.coordinator().is_pen_down());
    }

    #[test]
    fn move_to_with_pen_down_draws() {
        let mut ctl = controller();
        ctl.handle(&Cmd::MoveTo {
            x: 0.0,
            y: 5.0,
            pen_down: true,
        });
        assert!(ctl.coordinator().is_pen_down());
    }

    #[test]
    fn rejection_is_nack_with_name() {
        let mut ctl = controller();
        let resp = ctl.handle(&Cmd::DrawTo { x: 500.0, y: 0.0 });
        let Response::Nack { message, .. } = resp else {
            panic!("expected a nack, got {resp:?}");
        };
        assert!(message.starts_with("WORKSPACE_VIOLATION: "), "{message}");
    }

    #[test]
    fn emergency_stop_always_acks() {
        let mut ctl = controller();
        for _ in 0..2 {
            let resp = ctl.handle(&Cmd::EmergencyStop);
            assert!(matches!(resp, Response::Ack { .. }));
        }
        assert_eq!(
            ctl.status(),
            Response::Status {
                state: RobotState::EmergencyStop,
                pen_down: false,
                timestamp: 0
            }
        );
        let resp = ctl.handle(&Cmd::Home);
        assert!(matches!(resp, Response::Nack { .. }));
    }

    #[test]
    fn home_returns_to_origin() {
        let mut ctl = controller();
        ctl.coordinator_mut().reset_position(3.0, 4.0, 0.0).unwrap();
        assert!(matches!(ctl.handle(&Cmd::Home), Response::Ack { .. }));
        let (settled, _) = run_controller_until_settled(&mut ctl, 250, 1_000_000);
        assert!(settled);
        let Response::Position { x, y, .. } = ctl.handle(&Cmd::GetPosition) else {
            panic!("expected a position");
        };
        assert!(x.hypot(y) < 0.5, "ended at ({x}, {y})");
    }

    #[test]
    fn periodic_status() {
        let mut ctl = controller();
        assert_eq!(ctl.tick(), None);
        ctl.coordinator_mut().board_mut().advance_ms(999);
        assert_eq!(ctl.tick(), None);
        ctl.coordinator_mut().board_mut().advance_ms(1);
        assert_eq!(
            ctl.tick(),
            Some(Response::Status {
                state: RobotState::Idle,
                pen_down: false,
                timestamp: 1000
            })
        );
        assert_eq!(ctl.tick(), None);
    }

    #[test]
    fn status_can_be_disabled() {
        let config = ConfigBuilder::default().with_status_interval_ms(0).build();
        let mut ctl = Controller::new(Coordinator::new(SimBoard::new(), config));
        ctl.coordinator_mut().board_mut().advance_ms(10_000);
        assert_eq!(ctl.tick(), None);
    }

    #[test]
    fn long_goals_run_to_completion_by_default() {
        let mut ctl = controller();
        ctl.coordinator_mut().move_forward(50_000).unwrap();
        let (settled, _) = run_controller_until_settled(&mut ctl, 250, 1_000_000);
        assert!(settled);
        assert_eq!(ctl.coordinator().state(), RobotState::Idle);
        assert_eq!(ctl.coordinator().left_steps_total(), 50_000);
        assert!(ctl.coordinator().last_error().is_none());
    }

    #[test]
    fn deadline_stops_overrunning_goals() {
        let config = ConfigBuilder::default()
            .with_movement_timeout_ms(100)
            .build();
        let mut ctl = Controller::new(Coordinator::new(SimBoard::new(), config));
        ctl.coordinator_mut().move_forward(50_000).unwrap();
        run_controller_until_settled(&mut ctl, 250, 1_000_000);

        let coord = ctl.coordinator();
        assert_eq!(coord.state(), RobotState::EmergencyStop);
        assert_eq!(
            coord.last_error().unwrap().error.kind,
            ErrorKind::MovementTimeout
        );
        assert!(!coord.left().is_energized());
        // About 100 steps fit in 100 ms at the default 1000 us delay.
        assert!((95..=105).contains(&coord.left_steps_total()));

        ctl.coordinator_mut().clear().unwrap();
        assert_eq!(ctl.coordinator().state(), RobotState::Idle);
    }

    #[cfg(feature = "std")]
    #[test]
    fn lines_in_lines_out() {
        let mut ctl = controller();
        assert_eq!(
            ctl.handle_line(r#"{"cmd":3,"down":true}"#),
            r#"{"response":128,"timestamp":0}"#
        );
        assert_eq!(
            ctl.handle_line(r#"{"cmd":7}"#),
            r#"{"response":131,"state":0,"pen_down":true,"timestamp":0}"#
        );
        assert_eq!(
            ctl.handle_line("garbage"),
            r#"{"response":129,"error_message":"Invalid JSON command","timestamp":0}"#
        );
        assert_eq!(
            ctl.handle_line(r#"{"cmd":42}"#),
            r#"{"response":129,"error_message":"Unknown command ID: 42","timestamp":0}"#
        );
        assert_eq!(
            ctl.handle_line(r#"{"cmd":1,"y":2}"#),
            r#"{"response":129,"error_message":"MOVE_TO requires x,y coordinates","timestamp":0}"#
        );
    }
}
