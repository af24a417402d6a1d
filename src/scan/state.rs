//! Scan session state machine

use serde::Serialize;

use crate::analysis::ExtractedCode;
use crate::vision::Region;

/// Lifecycle of the one scan session a controller may run at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No attempt in progress
    #[default]
    Idle,
    /// An attempt or attempt loop is running
    Scanning,
    /// Cancellation flagged; the loop exits at its next safe point
    StopRequested,
}

impl SessionState {
    /// `Idle -> Scanning`; `None` when a session is already active
    pub fn start(self) -> Option<Self> {
        match self {
            SessionState::Idle => Some(SessionState::Scanning),
            _ => None,
        }
    }

    /// `Scanning -> StopRequested`; `None` when there is nothing to stop
    pub fn request_stop(self) -> Option<Self> {
        match self {
            SessionState::Scanning => Some(SessionState::StopRequested),
            _ => None,
        }
    }

    /// Terminal transition back to `Idle`
    pub fn finish(self) -> Self {
        SessionState::Idle
    }

    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    pub fn is_stop_requested(self) -> bool {
        matches!(self, SessionState::StopRequested)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Scanning => write!(f, "Scanning"),
            SessionState::StopRequested => write!(f, "Stop requested"),
        }
    }
}

/// Terminal outcome of a scan session; exactly one per session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    Found {
        code: ExtractedCode,
        region: Option<Region>,
    },
    NotFound,
    Interrupted,
}
