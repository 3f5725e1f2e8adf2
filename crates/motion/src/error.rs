use core::fmt::{self, Write as _};

use heapless::HistoryBuffer;

/// How many rejections the coordinator remembers.
pub const ERROR_HISTORY: usize = 8;

pub type Detail = heapless::String<64>;

/// The kinds of failure, with the numeric codes reported by the firmware.
///
/// Codes are grouped: 5-7 hardware, 20-25 movement, 40 configuration, 100 logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PinConflict,
    InvalidPin,
    HardwareInitFailed,
    InvalidSpeed,
    InvalidSteps,
    MovementBlocked,
    WorkspaceViolation,
    InvalidCoordinates,
    MovementTimeout,
    InvalidConfig,
    InvalidState,
}

impl ErrorKind {
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::PinConflict => 5,
            ErrorKind::InvalidPin => 6,
            ErrorKind::HardwareInitFailed => 7,
            ErrorKind::InvalidSpeed => 20,
            ErrorKind::InvalidSteps => 21,
            ErrorKind::MovementBlocked => 22,
            ErrorKind::WorkspaceViolation => 23,
            ErrorKind::InvalidCoordinates => 24,
            ErrorKind::MovementTimeout => 25,
            ErrorKind::InvalidConfig => 40,
            ErrorKind::InvalidState => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::PinConflict => "PIN_CONFLICT",
            ErrorKind::InvalidPin => "INVALID_PIN",
            ErrorKind::HardwareInitFailed => "HARDWARE_INIT_FAILED",
            ErrorKind::InvalidSpeed => "INVALID_SPEED",
            ErrorKind::InvalidSteps => "INVALID_STEPS",
            ErrorKind::MovementBlocked => "MOVEMENT_BLOCKED",
            ErrorKind::WorkspaceViolation => "WORKSPACE_VIOLATION",
            ErrorKind::InvalidCoordinates => "INVALID_COORDINATES",
            ErrorKind::MovementTimeout => "MOVEMENT_TIMEOUT",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::InvalidState => "INVALID_STATE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a command was refused.
///
/// Displays as `NAME: detail`, which is also the text of the NACK frame.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct MotionError {
    pub kind: ErrorKind,
    pub detail: Detail,
}

impl MotionError {
    /// Builds an error from formatted context. Details that don't fit are cut short.
    pub fn new(kind: ErrorKind, detail: fmt::Arguments<'_>) -> Self {
        let mut buf = Detail::new();
        let _ = buf.write_fmt(detail);
        MotionError { kind, detail: buf }
    }

    pub fn code(&self) -> u8 {
        self.kind.code()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorRecord {
    pub error: MotionError,
    pub timestamp_ms: u32,
}

/// The most recent rejections, oldest first.
#[derive(Default)]
pub struct ErrorLog {
    records: HistoryBuffer<ErrorRecord, ERROR_HISTORY>,
    total: u32,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: MotionError, timestamp_ms: u32) {
        self.records.write(ErrorRecord {
            error,
            timestamp_ms,
        });
        self.total = self.total.saturating_add(1);
    }

    pub fn last(&self) -> Option<&ErrorRecord> {
        self.records.recent()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> + '_ {
        self.records.oldest_ordered()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() == 0
    }

    /// Counts every error ever recorded, including the ones that fell out of the history.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(kind: ErrorKind, n: u32) -> MotionError {
        MotionError::new(kind, format_args!("attempt {n}"))
    }

    #[test]
    fn display_matches_nack_text() {
        let e = MotionError::new(ErrorKind::InvalidSpeed, format_args!("speed -1 mm/s"));
        assert_eq!(e.to_string(), "INVALID_SPEED: speed -1 mm/s");
        assert_eq!(e.code(), 20);
    }

    #[test]
    fn long_detail_is_truncated() {
        let long = "x".repeat(200);
        let e = MotionError::new(ErrorKind::InvalidState, format_args!("{long}"));
        assert!(e.detail.len() <= 64);
    }

    #[test]
    fn log_keeps_recent_records() {
        let mut log = ErrorLog::new();
        assert!(log.last().is_none());

        for n in 0..10 {
            log.record(err(ErrorKind::MovementBlocked, n), n * 100);
        }
        assert_eq!(log.len(), ERROR_HISTORY);
        assert_eq!(log.total(), 10);
        assert_eq!(log.last().unwrap().timestamp_ms, 900);
        assert_eq!(log.iter().next().unwrap().timestamp_ms, 200);

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.total(), 10);
    }

    #[test]
    fn codes_are_grouped() {
        assert_eq!(ErrorKind::PinConflict.code(), 5);
        assert_eq!(ErrorKind::InvalidPin.code(), 6);
        assert_eq!(ErrorKind::HardwareInitFailed.code(), 7);
        assert_eq!(ErrorKind::InvalidCoordinates.code(), 24);
        assert_eq!(ErrorKind::MovementTimeout.code(), 25);
        assert_eq!(ErrorKind::InvalidConfig.code(), 40);
        assert_eq!(ErrorKind::InvalidState.code(), 100);
    }
}
