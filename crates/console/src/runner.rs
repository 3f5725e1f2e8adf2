use terrapen_geom::Point;
use terrapen_motion::sim::SimBoard;
use terrapen_motion::{Config, Controller, Coordinator, RobotState};

/// One straight piece of the path the robot's center travelled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceSegment {
    pub from: Point,
    pub to: Point,
    pub pen_down: bool,
}

/// Drives a simulated terrapen one command line at a time, waiting for each
/// motion to finish before taking the next line, the way a host would.
pub struct Runner {
    controller: Controller<SimBoard>,
    tick_us: u64,
    report_status: bool,
    trace: Vec<TraceSegment>,
}

impl Runner {
    pub fn new(config: Config, tick_us: u64) -> Self {
        Runner {
            controller: Controller::new(Coordinator::new(SimBoard::new(), config)),
            tick_us: tick_us.max(1),
            report_status: false,
            trace: Vec::new(),
        }
    }

    /// Also print the periodic status frames emitted while moving.
    pub fn with_status_reports(mut self, report: bool) -> Self {
        self.report_status = report;
        self
    }

    pub fn trace(&self) -> &[TraceSegment] {
        &self.trace
    }

    /// Feeds one line of input and returns the response lines. Blank lines
    /// and `#` comments produce nothing.
    pub fn feed(&mut self, line: &str) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Vec::new();
        }
        let mut out = vec![self.controller.handle_line(line)];
        out.extend(self.run_until_settled());
        out
    }

    /// Ticks until the robot stops, recording where it went.
    pub fn run_until_settled(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        let mut last = self.controller.coordinator().pose().position();
        let mut pen_down = self.controller.coordinator().is_pen_down();

        while self.controller.coordinator().state() == RobotState::Moving {
            self.controller
                .coordinator_mut()
                .board_mut()
                .advance_us(self.tick_us);
            let status = self.controller.tick();

            let coord = self.controller.coordinator();
            let here = coord.pose().position();
            let pen_now = coord.is_pen_down();
            if here != last || pen_now != pen_down {
                self.push_segment(last, here, pen_down);
                last = here;
                pen_down = pen_now;
            }

            if let Some(status) = status.filter(|_| self.report_status) {
                match terrapen_protocol::encode_line(&status) {
                    Ok(line) => out.push(line),
                    Err(e) => log::error!("couldn't encode status: {e}"),
                }
            }
        }
        out
    }

    // Collinear pieces with the same pen state are merged, so that a straight
    // creep made of many steps becomes a single segment.
    fn push_segment(&mut self, from: Point, to: Point, pen_down: bool) {
        if from == to {
            return;
        }
        if let Some(prev) = self.trace.last_mut() {
            let a = prev.to - prev.from;
            let b = to - from;
            let aligned = (a.cross(b)).abs() <= 1e-4 * a.length() * b.length() && a.dot(b) > 0.0;
            if prev.pen_down == pen_down && prev.to == from && aligned {
                prev.to = to;
                return;
            }
        }
        self.trace.push(TraceSegment { from, to, pen_down });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrapen_protocol::{decode_response, Response};

    fn runner() -> Runner {
        Runner::new(Config::default(), 250)
    }

    #[test]
    fn script_draws_a_line() {
        let mut r = runner();
        let script = [
            "# a short stroke",
            r#"{"cmd":2,"x":0,"y":10}"#,
            "",
            r#"{"cmd":4}"#,
        ];
        let out: Vec<String> = script.iter().flat_map(|l| r.feed(l)).collect();
        assert_eq!(out.len(), 2);
        assert!(matches!(decode_response(&out[0]), Ok(Response::Ack { .. })));

        let Ok(Response::Position { x, y, .. }) = decode_response(&out[1]) else {
            panic!("expected a position, got {}", out[1]);
        };
        assert!(x.abs() < 0.5 && (y - 10.0).abs() < 0.5, "at ({x}, {y})");

        assert_eq!(r.trace().len(), 1);
        let seg = r.trace()[0];
        assert!(seg.pen_down);
        assert_eq!(seg.from, Point::new(0.0, 0.0));
    }

    #[test]
    fn rejected_lines_report_nack() {
        let mut r = runner();
        let out = r.feed(r#"{"cmd":1,"x":400,"y":0}"#);
        assert_eq!(out.len(), 1);
        let Ok(Response::Nack { message, .. }) = decode_response(&out[0]) else {
            panic!("expected a nack, got {}", out[0]);
        };
        assert!(message.starts_with("WORKSPACE_VIOLATION"));
        assert!(r.trace().is_empty());
    }

    #[test]
    fn status_reports_while_moving() {
        let mut r = runner().with_status_reports(true);
        let out = r.feed(r#"{"cmd":1,"x":0,"y":30}"#);
        // 30 mm at 15 mm/s takes about two seconds.
        assert!(out.len() >= 2, "{out:?}");
        assert!(out[1..].iter().all(|l| l.starts_with(r#"{"response":131"#)));
    }
}
