//! Protocol between a RunMat engine session and its worker process.
//!
//! Messages are JSON objects, one per line, on the worker's stdin (requests)
//! and stdout (responses). The worker greets with an unsolicited
//! [`Response::Ready`]; every later response answers exactly one request
//! and names it through [`Envelope::parent_id`].

pub mod error;
pub mod framing;
pub mod message;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use framing::{decode_line, encode_line, read_message, write_message};
pub use message::{Envelope, ErrorKind, Request, RequestEnvelope, Response, ResponseEnvelope};
pub use wire::{WireArray, WireData};

/// Bumped whenever a message shape changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;
