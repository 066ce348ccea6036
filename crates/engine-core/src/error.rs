use crate::state::RunPhase;
use connectors::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Session error: {0}")]
    Store(#[from] StoreError),

    #[error("Timed out waiting for a session")]
    Timeout,

    #[error("Session failed its health check")]
    BadConnection,

    #[error("Session pool is closed")]
    PoolClosed,

    #[error("Could not acquire a session after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<ConnectionError>,
    },
}

impl ConnectionError {
    pub fn attempts(&self) -> u32 {
        match self {
            ConnectionError::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Illegal run state transition: {from} -> {to}")]
    IllegalTransition { from: RunPhase, to: RunPhase },
}
