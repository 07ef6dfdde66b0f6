use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Capture engine lifecycle.
///
/// State transitions:
/// ```text
/// ready → capturing ⇄ paused
///   ↑         │          │
///   └──── stop ──────────┘
/// ```
///
/// There is no terminal state: a stopped engine is `Ready` again and can be
/// restarted indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    #[default]
    Ready,
    Capturing,
    Paused,
}

/// Lifecycle operations checked against the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Stop,
}

impl CaptureState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Capturing => "capturing",
            Self::Paused => "paused",
        }
    }

    /// Target state of `transition`, or `InvalidState` if it is illegal from here.
    ///
    /// Only the legality of the move is decided here; the engine commits the
    /// returned state once the side effects of the transition succeeded.
    pub fn next(self, transition: Transition) -> Result<CaptureState, CaptureError> {
        match (self, transition) {
            (Self::Ready, Transition::Start) => Ok(Self::Capturing),
            (Self::Capturing, Transition::Pause) => Ok(Self::Paused),
            (Self::Paused, Transition::Resume) => Ok(Self::Capturing),
            (Self::Capturing | Self::Paused, Transition::Stop) => Ok(Self::Ready),
            (state, _) => Err(CaptureError::InvalidState(state.name())),
        }
    }

    /// Configuration setters are only accepted while ready.
    pub fn ensure_configurable(self) -> Result<(), CaptureError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CaptureError::InvalidState(self.name()))
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
