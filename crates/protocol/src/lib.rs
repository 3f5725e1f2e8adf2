//! Command and response frames exchanged with the terrapen controller.
//!
//! Each frame is a single record carrying an integer opcode (requests) or
//! response code (responses) plus a few typed fields. With the `std` feature,
//! frames are encoded as one JSON object per line.

#![cfg_attr(not(feature = "std"), no_std)]

use serde::{Deserialize, Serialize};

pub mod opcode {
    pub const MOVE_TO: i32 = 1;
    pub const DRAW_TO: i32 = 2;
    pub const SET_PEN: i32 = 3;
    pub const GET_POSITION: i32 = 4;
    pub const HOME: i32 = 5;
    pub const EMERGENCY_STOP: i32 = 6;
    pub const GET_STATUS: i32 = 7;
}

pub mod response_code {
    pub const ACK: u8 = 128;
    pub const NACK: u8 = 129;
    pub const POSITION: u8 = 130;
    pub const STATUS: u8 = 131;
}

/// Human-readable detail attached to a NACK.
pub type Message = heapless::String<96>;

/// Builds a [`Message`], cutting `s` short if it doesn't fit.
pub fn message(s: &str) -> Message {
    let mut ret = Message::new();
    for c in s.chars() {
        if ret.push(c).is_err() {
            break;
        }
    }
    ret
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Cmd {
    /// Travel to `(x, y)`. The pen is raised unless `pen_down` is set, in which
    /// case this is the same as `DrawTo`.
    MoveTo { x: f32, y: f32, pen_down: bool },
    DrawTo { x: f32, y: f32 },
    SetPen { down: bool },
    GetPosition,
    /// Travel to the origin with the pen raised.
    Home,
    EmergencyStop,
    GetStatus,
}

impl Cmd {
    pub fn opcode(&self) -> i32 {
        match self {
            Cmd::MoveTo { .. } => opcode::MOVE_TO,
            Cmd::DrawTo { .. } => opcode::DRAW_TO,
            Cmd::SetPen { .. } => opcode::SET_PEN,
            Cmd::GetPosition => opcode::GET_POSITION,
            Cmd::Home => opcode::HOME,
            Cmd::EmergencyStop => opcode::EMERGENCY_STOP,
            Cmd::GetStatus => opcode::GET_STATUS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid JSON command")]
    Malformed,
    #[error("Missing 'cmd' field")]
    MissingOpcode,
    #[error("Unknown command ID: {0}")]
    UnknownOpcode(i32),
    #[error("{0} requires x,y coordinates")]
    MissingCoordinates(&'static str),
    #[error("SET_PEN requires 'down' parameter")]
    MissingPenState,
    #[error("Unknown response code: {0}")]
    UnknownResponse(u8),
}

/// A request as it appears on the wire, before its opcode has been checked.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub cmd: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen_down: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<bool>,
}

impl TryFrom<Frame> for Cmd {
    type Error = FrameError;

    fn try_from(frame: Frame) -> Result<Cmd, FrameError> {
        let op = frame.cmd.ok_or(FrameError::MissingOpcode)?;
        let coords = |name| frame.x.zip(frame.y).ok_or(FrameError::MissingCoordinates(name));
        let cmd = match op {
            opcode::MOVE_TO => {
                let (x, y) = coords("MOVE_TO")?;
                Cmd::MoveTo {
                    x,
                    y,
                    pen_down: frame.pen_down.unwrap_or(false),
                }
            }
            opcode::DRAW_TO => {
                let (x, y) = coords("DRAW_TO")?;
                Cmd::DrawTo { x, y }
            }
            opcode::SET_PEN => Cmd::SetPen {
                down: frame.down.ok_or(FrameError::MissingPenState)?,
            },
            opcode::GET_POSITION => Cmd::GetPosition,
            opcode::HOME => Cmd::Home,
            opcode::EMERGENCY_STOP => Cmd::EmergencyStop,
            opcode::GET_STATUS => Cmd::GetStatus,
            other => return Err(FrameError::UnknownOpcode(other)),
        };
        Ok(cmd)
    }
}

impl From<&Cmd> for Frame {
    fn from(cmd: &Cmd) -> Frame {
        let mut frame = Frame {
            cmd: Some(cmd.opcode()),
            ..Frame::default()
        };
        match *cmd {
            Cmd::MoveTo { x, y, pen_down } => {
                frame.x = Some(x);
                frame.y = Some(y);
                frame.pen_down = Some(pen_down);
            }
            Cmd::DrawTo { x, y } => {
                frame.x = Some(x);
                frame.y = Some(y);
            }
            Cmd::SetPen { down } => frame.down = Some(down),
            _ => {}
        }
        frame
    }
}

/// The state of the motion state machine, as reported in status frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotState {
    Idle,
    Moving,
    Error,
    EmergencyStop,
}

impl RobotState {
    pub fn code(self) -> u8 {
        match self {
            RobotState::Idle => 0,
            RobotState::Moving => 1,
            RobotState::Error => 2,
            RobotState::EmergencyStop => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<RobotState> {
        match code {
            0 => Some(RobotState::Idle),
            1 => Some(RobotState::Moving),
            2 => Some(RobotState::Error),
            3 => Some(RobotState::EmergencyStop),
            _ => None,
        }
    }
}

/// Every response carries the controller's millisecond clock at the time it was sent.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Ack {
        timestamp: u32,
    },
    Nack {
        message: Message,
        timestamp: u32,
    },
    Position {
        x: f32,
        y: f32,
        angle: f32,
        timestamp: u32,
    },
    Status {
        state: RobotState,
        pen_down: bool,
        timestamp: u32,
    },
}

impl Response {
    pub fn nack(msg: &str, timestamp: u32) -> Response {
        Response::Nack {
            message: message(msg),
            timestamp,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Response::Ack { .. } => response_code::ACK,
            Response::Nack { .. } => response_code::NACK,
            Response::Position { .. } => response_code::POSITION,
            Response::Status { .. } => response_code::STATUS,
        }
    }

    pub fn timestamp(&self) -> u32 {
        match *self {
            Response::Ack { timestamp }
            | Response::Nack { timestamp, .. }
            | Response::Position { timestamp, .. }
            | Response::Status { timestamp, .. } => timestamp,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

/// A response as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub response: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen_down: Option<bool>,
    pub timestamp: u32,
}

impl From<&Response> for ResponseFrame {
    fn from(resp: &Response) -> ResponseFrame {
        let mut frame = ResponseFrame {
            response: resp.code(),
            error_message: None,
            position: None,
            state: None,
            pen_down: None,
            timestamp: resp.timestamp(),
        };
        match resp {
            Response::Ack { .. } => {}
            Response::Nack { message, .. } => frame.error_message = Some(message.clone()),
            Response::Position { x, y, angle, .. } => {
                frame.position = Some(PositionRecord {
                    x: *x,
                    y: *y,
                    angle: *angle,
                })
            }
            Response::Status {
                state, pen_down, ..
            } => {
                frame.state = Some(state.code());
                frame.pen_down = Some(*pen_down);
            }
        }
        frame
    }
}

impl TryFrom<ResponseFrame> for Response {
    type Error = FrameError;

    fn try_from(frame: ResponseFrame) -> Result<Response, FrameError> {
        let timestamp = frame.timestamp;
        let resp = match frame.response {
            response_code::ACK => Response::Ack { timestamp },
            response_code::NACK => Response::Nack {
                message: frame.error_message.unwrap_or_default(),
                timestamp,
            },
            response_code::POSITION => {
                let p = frame.position.ok_or(FrameError::Malformed)?;
                Response::Position {
                    x: p.x,
                    y: p.y,
                    angle: p.angle,
                    timestamp,
                }
            }
            response_code::STATUS => Response::Status {
                state: frame
                    .state
                    .and_then(RobotState::from_code)
                    .ok_or(FrameError::Malformed)?,
                pen_down: frame.pen_down.unwrap_or(false),
                timestamp,
            },
            other => return Err(FrameError::UnknownResponse(other)),
        };
        Ok(resp)
    }
}

/// Parses one line of input into a command.
#[cfg(feature = "std")]
pub fn parse_line(line: &str) -> Result<Cmd, FrameError> {
    let frame: Frame = serde_json::from_str(line.trim()).map_err(|_| FrameError::Malformed)?;
    Cmd::try_from(frame)
}

#[cfg(feature = "std")]
pub fn encode_cmd(cmd: &Cmd) -> serde_json::Result<String> {
    serde_json::to_string(&Frame::from(cmd))
}

/// Encodes a response as a single line, without the trailing newline.
#[cfg(feature = "std")]
pub fn encode_line(resp: &Response) -> serde_json::Result<String> {
    serde_json::to_string(&ResponseFrame::from(resp))
}

#[cfg(feature = "std")]
pub fn decode_response(line: &str) -> Result<Response, FrameError> {
    let frame: ResponseFrame =
        serde_json::from_str(line.trim()).map_err(|_| FrameError::Malformed)?;
    Response::try_from(frame)
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn parse_move_to() {
        let cmd = parse_line(r#"{"cmd":1,"x":10,"y":-5.5}"#).unwrap();
        assert_eq!(
            cmd,
            Cmd::MoveTo {
                x: 10.0,
                y: -5.5,
                pen_down: false
            }
        );

        let cmd = parse_line(r#"{"cmd":1,"x":1,"y":2,"pen_down":true}"#).unwrap();
        assert_eq!(
            cmd,
            Cmd::MoveTo {
                x: 1.0,
                y: 2.0,
                pen_down: true
            }
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_line("not json"), Err(FrameError::Malformed));
        assert_eq!(parse_line(r#"{"x":1}"#), Err(FrameError::MissingOpcode));
        assert_eq!(parse_line(r#"{"cmd":42}"#), Err(FrameError::UnknownOpcode(42)));
        assert_eq!(
            parse_line(r#"{"cmd":2,"x":1}"#),
            Err(FrameError::MissingCoordinates("DRAW_TO"))
        );
        assert_eq!(parse_line(r#"{"cmd":3}"#), Err(FrameError::MissingPenState));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            FrameError::UnknownOpcode(9).to_string(),
            "Unknown command ID: 9"
        );
        assert_eq!(
            FrameError::MissingCoordinates("MOVE_TO").to_string(),
            "MOVE_TO requires x,y coordinates"
        );
    }

    #[test]
    fn every_opcode_parses() {
        for cmd in [
            Cmd::MoveTo {
                x: 3.0,
                y: 4.0,
                pen_down: true,
            },
            Cmd::DrawTo { x: -1.0, y: 2.5 },
            Cmd::SetPen { down: true },
            Cmd::GetPosition,
            Cmd::Home,
            Cmd::EmergencyStop,
            Cmd::GetStatus,
        ] {
            let line = encode_cmd(&cmd).unwrap();
            assert_eq!(parse_line(&line).unwrap(), cmd, "{line}");
        }
    }

    #[test]
    fn encode_responses() {
        let ack = encode_line(&Response::Ack { timestamp: 7 }).unwrap();
        assert_eq!(ack, r#"{"response":128,"timestamp":7}"#);

        let nack = encode_line(&Response::nack("MOVEMENT_BLOCKED: busy", 9)).unwrap();
        assert_eq!(
            nack,
            r#"{"response":129,"error_message":"MOVEMENT_BLOCKED: busy","timestamp":9}"#
        );

        let status = encode_line(&Response::Status {
            state: RobotState::EmergencyStop,
            pen_down: true,
            timestamp: 1,
        })
        .unwrap();
        assert_eq!(
            status,
            r#"{"response":131,"state":3,"pen_down":true,"timestamp":1}"#
        );

        let pos = encode_line(&Response::Position {
            x: 1.5,
            y: -2.0,
            angle: 0.5,
            timestamp: 3,
        })
        .unwrap();
        assert_eq!(
            pos,
            r#"{"response":130,"position":{"x":1.5,"y":-2.0,"angle":0.5},"timestamp":3}"#
        );
        assert_eq!(
            decode_response(&pos).unwrap(),
            Response::Position {
                x: 1.5,
                y: -2.0,
                angle: 0.5,
                timestamp: 3
            }
        );
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(500);
        let Response::Nack { message, .. } = Response::nack(&long, 0) else {
            unreachable!();
        };
        assert_eq!(message.len(), 96);
    }
}
