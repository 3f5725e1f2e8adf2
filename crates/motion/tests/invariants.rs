use std::f32::consts::PI;

use proptest::prelude::*;
use terrapen_geom::{normalize, WheelSteps};
use terrapen_motion::sim::SimBoard;
use terrapen_motion::{Config, Coordinator, Goal, RobotState};

#[derive(Clone, Copy, Debug)]
enum Command {
    Forward(i32),
    Backward(i32),
    Left(i32),
    Right(i32),
    TurnBy(f32),
    MoveTo(f32, f32),
    Stop,
    Clear,
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        (1..300i32).prop_map(Command::Forward),
        (1..300i32).prop_map(Command::Backward),
        (1..300i32).prop_map(Command::Left),
        (1..300i32).prop_map(Command::Right),
        (-4.0..4.0f32).prop_map(Command::TurnBy),
        (-15.0..15.0f32, -15.0..15.0f32).prop_map(|(x, y)| Command::MoveTo(x, y)),
        Just(Command::Stop),
        Just(Command::Clear),
    ]
}

fn issue(coord: &mut Coordinator<SimBoard>, cmd: Command) -> bool {
    let result = match cmd {
        Command::Forward(n) => coord.move_forward(n),
        Command::Backward(n) => coord.move_backward(n),
        Command::Left(n) => coord.turn_left(n),
        Command::Right(n) => coord.turn_right(n),
        Command::TurnBy(a) => coord.turn_by(a, 1.0),
        Command::MoveTo(x, y) => coord.move_to(x, y, 30.0),
        Command::Stop => {
            coord.emergency_stop();
            Ok(())
        }
        Command::Clear => coord.clear(),
    };
    result.is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn tick_invariants(
        cmds in prop::collection::vec((command(), 0..3000usize), 1..6),
        tick_us in 100..700u64,
    ) {
        let mut coord = Coordinator::new(SimBoard::new(), Config::default());
        let geometry = coord.config().geometry;

        for (cmd, ticks) in cmds {
            let state_before = coord.state();
            let goal_before = coord.goal();
            let accepted = issue(&mut coord, cmd);

            if !matches!(cmd, Command::Stop | Command::Clear) {
                // Motion commands are only taken when idle.
                if state_before != RobotState::Idle {
                    prop_assert!(!accepted);
                }
                if !accepted {
                    prop_assert_eq!(coord.goal(), goal_before);
                    prop_assert_eq!(coord.state(), state_before);
                }
            }

            for _ in 0..ticks {
                let pose = coord.pose();
                let totals = WheelSteps::new(coord.left_steps_total(), coord.right_steps_total());

                coord.board_mut().advance_us(tick_us);
                coord.tick();

                let fired = WheelSteps::new(
                    coord.left_steps_total() - totals.left,
                    coord.right_steps_total() - totals.right,
                );
                prop_assert!(fired.left.abs() <= 1 && fired.right.abs() <= 1);

                let mut expected = pose;
                if !fired.is_zero() {
                    expected.advance(geometry.steps_to_motion(&fired));
                }
                prop_assert_eq!(coord.pose(), expected);

                let theta = coord.pose().theta;
                prop_assert!((-PI..=PI).contains(&theta));
                prop_assert_eq!(normalize(theta), theta);

                if coord.state() == RobotState::Idle {
                    prop_assert_eq!(coord.goal(), Goal::Idle);
                }
                if coord.state() == RobotState::EmergencyStop {
                    prop_assert!(fired.is_zero());
                    prop_assert!(!coord.left().is_energized());
                    prop_assert!(!coord.right().is_energized());
                }
            }
        }
    }

    #[test]
    fn step_counters_sum_completed_goals(
        moves in prop::collection::vec((0..4u8, 1..200i32), 1..5),
    ) {
        let mut coord = Coordinator::new(SimBoard::new(), Config::default());
        let mut expected = WheelSteps::default();

        for (kind, n) in moves {
            let (result, delta) = match kind {
                0 => (coord.move_forward(n), WheelSteps::new(n, n)),
                1 => (coord.move_backward(n), WheelSteps::new(-n, -n)),
                2 => (coord.turn_left(n), WheelSteps::new(-n, n)),
                _ => (coord.turn_right(n), WheelSteps::new(n, -n)),
            };
            prop_assert!(result.is_ok());
            prop_assert!(terrapen_motion::sim::run_until_settled(&mut coord, 300, 1_000_000).is_some());
            expected.left += delta.left;
            expected.right += delta.right;
        }

        prop_assert_eq!(coord.left_steps_total(), expected.left);
        prop_assert_eq!(coord.right_steps_total(), expected.right);
    }
}
