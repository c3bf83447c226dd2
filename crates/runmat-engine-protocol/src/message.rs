//! Message envelopes, requests and responses.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wire::WireArray;

/// Every message on the wire. Replies carry the request's `id` as their
/// `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Unique message identifier
    pub id: String,
    /// Identifier of the request this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub date: String,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(body: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            date: chrono::Utc::now().to_rfc3339(),
            body,
        }
    }

    /// Build the reply to `parent`.
    pub fn reply<P>(parent: &Envelope<P>, body: T) -> Self {
        Self {
            parent_id: Some(parent.id.clone()),
            ..Self::new(body)
        }
    }

    /// Whether this message answers `request`.
    pub fn answers<P>(&self, request: &Envelope<P>) -> bool {
        self.parent_id.as_deref() == Some(request.id.as_str())
    }
}

/// Requests a session sends to its engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Store `value` in the workspace under `name`
    Put { name: String, value: WireArray },
    /// Fetch a copy of a workspace variable
    Get { name: String },
    /// Evaluate MATLAB source
    Eval {
        code: String,
        #[serde(default)]
        capture_output: bool,
    },
    /// Remove variables; an empty list clears the whole workspace
    Clear {
        #[serde(default)]
        names: Vec<String>,
    },
    /// List workspace variable names
    Who,
    Shutdown,
}

impl Request {
    /// Short name for log lines.
    pub fn verb(&self) -> &'static str {
        match self {
            Request::Put { .. } => "put",
            Request::Get { .. } => "get",
            Request::Eval { .. } => "eval",
            Request::Clear { .. } => "clear",
            Request::Who => "who",
            Request::Shutdown => "shutdown",
        }
    }
}

/// Engine replies, plus the unsolicited `ready` greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ready {
        engine: String,
        version: String,
        protocol_version: u32,
    },
    Ok,
    Value {
        value: WireArray,
    },
    Evaluated {
        #[serde(default)]
        output: String,
    },
    Names {
        names: Vec<String>,
    },
    Error {
        kind: ErrorKind,
        identifier: String,
        message: String,
        /// Output produced before the failure, when captured
        #[serde(default)]
        output: String,
    },
    Goodbye,
}

impl Response {
    pub fn error(kind: ErrorKind, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            identifier: identifier.into(),
            message: message.into(),
            output: String::new(),
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Response::Ready { .. } => "ready",
            Response::Ok => "ok",
            Response::Value { .. } => "value",
            Response::Evaluated { .. } => "evaluated",
            Response::Names { .. } => "names",
            Response::Error { .. } => "error",
            Response::Goodbye => "goodbye",
        }
    }
}

/// Category of an engine-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UndefinedVariable,
    Evaluation,
    InvalidRequest,
}

pub type RequestEnvelope = Envelope<Request>;
pub type ResponseEnvelope = Envelope<Response>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_links_to_parent() {
        let request = Envelope::new(Request::Who);
        let reply = Envelope::reply(&request, Response::Names { names: vec![] });
        assert!(reply.answers(&request));
        assert_ne!(reply.id, request.id);
        assert!(!Envelope::new(Response::Ok).answers(&request));
    }

    #[test]
    fn requests_are_tagged_by_type() {
        let json = serde_json::to_value(Request::Eval {
            code: "x = 1;".into(),
            capture_output: true,
        })
        .unwrap();
        assert_eq!(json["type"], "eval");
        assert_eq!(json["capture_output"], true);

        let clear: Request = serde_json::from_str(r#"{"type":"clear"}"#).unwrap();
        assert_eq!(clear, Request::Clear { names: vec![] });
    }

    #[test]
    fn error_kind_is_snake_case() {
        let json = serde_json::to_value(Response::error(
            ErrorKind::UndefinedVariable,
            "MATLAB:UndefinedFunction",
            "Undefined function or variable 'q'.",
        ))
        .unwrap();
        assert_eq!(json["kind"], "undefined_variable");
        assert_eq!(json["output"], "");
    }
}
