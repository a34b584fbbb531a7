//! Phase machine for one streaming session.

use std::sync::Arc;

use thiserror::Error;

use crate::event::{ResultSet, ServerEvent};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Streaming,
    Complete,
    Error,
}

impl SessionPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// `complete` and `error` end a session; only a fresh submission leaves
    /// either one.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// A stream record arrived in a phase that does not accept records. The
/// caller logs it and drops the record; the session is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stream record ignored in {} phase", .phase.label())]
pub struct OutOfPhaseEvent {
    pub phase: SessionPhase,
}

/// The observable state of the current session: phase, latest progress
/// line, terminal error message, and the completed result set. One value
/// exists per controller; a new submission discards and restarts it.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
    progress: String,
    error: Option<String>,
    results: Option<Arc<ResultSet>>,
}

impl SessionState {
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            progress: String::new(),
            error: None,
            results: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn progress(&self) -> &str {
        &self.progress
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn results(&self) -> Option<&Arc<ResultSet>> {
        self.results.as_ref()
    }

    /// Discards whatever session came before and enters `connecting`.
    pub fn start(&mut self) {
        self.phase = SessionPhase::Connecting;
        self.progress.clear();
        self.error = None;
        self.results = None;
    }

    /// The open handshake succeeded (possibly after silent reconnects).
    pub fn mark_streaming(&mut self) {
        if matches!(
            self.phase,
            SessionPhase::Connecting | SessionPhase::Streaming
        ) {
            self.phase = SessionPhase::Streaming;
            self.error = None;
        }
    }

    /// Applies one interpreted stream record. Records are only meaningful
    /// while streaming; anything else is reported back for logging and
    /// leaves the state untouched.
    pub fn apply(&mut self, event: ServerEvent) -> Result<(), OutOfPhaseEvent> {
        if self.phase != SessionPhase::Streaming {
            return Err(OutOfPhaseEvent { phase: self.phase });
        }
        match event {
            ServerEvent::Progress { text } => {
                self.progress = text;
            }
            ServerEvent::Complete { results } => {
                self.phase = SessionPhase::Complete;
                self.progress.clear();
                self.results = Some(Arc::new(results));
            }
            ServerEvent::RateLimited { message } => {
                self.fail(message);
            }
        }
        Ok(())
    }

    /// Terminal failure: records the user-facing message and discards any
    /// buffered progress. Ignored once the session already ended.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = SessionPhase::Error;
        self.progress.clear();
        self.error = Some(message.into());
    }

    /// Back to the resting state, dropping the session entirely.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
