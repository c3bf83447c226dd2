use thiserror::Error;

use crate::value::Ownership;

/// Errors raised by foreign value handling and conversion.
///
/// None of these leave a value in a different state than before the
/// failing call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MxError {
    #[error("cannot allocate {requested} bytes of foreign memory ({in_use} in use, limit {limit:?})")]
    Allocation {
        requested: usize,
        in_use: usize,
        limit: Option<usize>,
    },
    #[error("foreign value #{id} is {actual:?}; {operation} requires a host-owned value")]
    Ownership {
        id: u64,
        actual: Ownership,
        operation: &'static str,
    },
    #[error("shape error: {0}")]
    Shape(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl MxError {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        MxError::Shape(message.into())
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        MxError::Type(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        MxError::InvalidArgument(message.into())
    }
}

pub type MxResult<T> = std::result::Result<T, MxError>;
