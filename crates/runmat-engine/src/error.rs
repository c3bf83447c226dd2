use runmat_engine_protocol::ProtocolError;
use runmat_mx::MxError;
use thiserror::Error;

use crate::session::SessionState;

/// Errors surfaced by sessions, the registry and configuration loading.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Mx(#[from] MxError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Undefined function or variable '{0}'.")]
    UndefinedVariable(String),
    #[error("failed to start engine: {0}")]
    SessionStart(String),
    #[error("engine channel failed: {0}")]
    Channel(String),
    #[error("session {0} is broken and must be restarted")]
    SessionBroken(String),
    #[error("cannot {operation} while the session is {state}")]
    SessionState {
        state: SessionState,
        operation: &'static str,
    },
    /// The engine rejected the code; the session stays usable.
    #[error("{message}")]
    Evaluation {
        identifier: String,
        message: String,
        /// Output produced before the error, when captured
        output: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// MATLAB error identifier of an evaluation failure.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            EngineError::Evaluation { identifier, .. } => Some(identifier),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
