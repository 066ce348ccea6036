use crate::error::StateError;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Phases of a maintenance run.
///
/// ```text
/// INIT -> SELECTING -> BATCHING -> EXECUTING -> AGGREGATING -> DONE
///   \________\____________________________________________-> FAILED
/// ```
///
/// `FAILED` is only reachable before any document was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Init,
    Selecting,
    Batching,
    Executing,
    Aggregating,
    Done,
    Failed,
}

impl RunPhase {
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Init, Selecting)
                | (Selecting, Batching)
                | (Batching, Executing)
                | (Executing, Aggregating)
                | (Aggregating, Done)
                | (Init, Failed)
                | (Selecting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Init => "INIT",
            RunPhase::Selecting => "SELECTING",
            RunPhase::Batching => "BATCHING",
            RunPhase::Executing => "EXECUTING",
            RunPhase::Aggregating => "AGGREGATING",
            RunPhase::Done => "DONE",
            RunPhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        RunState {
            phase: RunPhase::Init,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn advance(&mut self, next: RunPhase) -> Result<(), StateError> {
        if !self.phase.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = %self.phase, to = %next, "Run phase transition");
        self.phase = next;
        Ok(())
    }
}
