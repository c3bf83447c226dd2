use runmat_mx::MxError;
use thiserror::Error;

use crate::lexer::LexError;
use crate::parser::ParseError;

pub const UNDEFINED_FUNCTION: &str = "MATLAB:UndefinedFunction";
pub const BAD_SUBSCRIPT: &str = "MATLAB:badsubscript";
pub const DIMENSION_MISMATCH: &str = "MATLAB:dimagree";
pub const CONCAT_MISMATCH: &str = "MATLAB:catenate:dimensionMismatch";
pub const TOO_MANY_OUTPUTS: &str = "MATLAB:TooManyOutputs";
pub const INVALID_ARGUMENT: &str = "MATLAB:invalidInput";
pub const SYNTAX: &str = "MATLAB:parse";
pub const SIZE_LIMIT: &str = "MATLAB:array:SizeLimitExceeded";

/// A MATLAB-style error: identifier plus message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    pub identifier: String,
    pub message: String,
}

impl EvalError {
    pub fn new(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    pub fn undefined(name: &str) -> Self {
        Self::new(
            UNDEFINED_FUNCTION,
            format!("Undefined function or variable '{name}'."),
        )
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(INVALID_ARGUMENT, message)
    }

    pub fn subscript(message: impl Into<String>) -> Self {
        Self::new(BAD_SUBSCRIPT, message)
    }

    pub fn size_limit() -> Self {
        Self::new(
            SIZE_LIMIT,
            "Requested array exceeds the maximum possible variable size.",
        )
    }
}

impl From<MxError> for EvalError {
    fn from(e: MxError) -> Self {
        let identifier = match &e {
            MxError::Allocation { .. } => "MATLAB:nomem",
            MxError::Ownership { .. } => "RunMat:ownership",
            MxError::Shape(_) => DIMENSION_MISMATCH,
            MxError::Type(_) => "MATLAB:invalidType",
            MxError::InvalidArgument(_) => INVALID_ARGUMENT,
        };
        EvalError::new(identifier, e.to_string())
    }
}

impl From<LexError> for EvalError {
    fn from(e: LexError) -> Self {
        EvalError::new(SYNTAX, e.to_string())
    }
}

impl From<ParseError> for EvalError {
    fn from(e: ParseError) -> Self {
        EvalError::new(SYNTAX, e.to_string())
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
