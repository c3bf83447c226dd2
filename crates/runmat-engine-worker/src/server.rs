//! The protocol loop: greet, then answer one request per line until
//! shutdown or end of input.

use std::io::{BufRead, Write};

use log::{info, warn};
use runmat_engine_protocol::{
    decode_line, write_message, Envelope, ErrorKind, ProtocolError, RequestEnvelope, Response,
};

use crate::engine::{Engine, Reply};

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// `shutdown` request answered with `goodbye`
    Requested,
    /// The session closed our stdin
    EndOfInput,
    /// `exit`/`quit` ran; the process should exit with this status
    Exit(i32),
}

pub fn serve<R: BufRead, W: Write>(
    engine: &mut Engine,
    reader: &mut R,
    writer: &mut W,
) -> Result<Shutdown, ProtocolError> {
    write_message(writer, &Envelope::new(engine.ready()))?;
    info!("{}: ready", engine.name());
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(Shutdown::EndOfInput);
        }
        if line.trim().is_empty() {
            continue;
        }
        let request: RequestEnvelope = match decode_line(&line) {
            Ok(request) => request,
            Err(e) => {
                reject(engine, writer, &line, e)?;
                continue;
            }
        };
        match engine.handle(request.body.clone()) {
            Reply::Send(response) => {
                write_message(writer, &Envelope::reply(&request, response))?;
            }
            Reply::Last(response) => {
                write_message(writer, &Envelope::reply(&request, response))?;
                return Ok(Shutdown::Requested);
            }
            Reply::Exit(code) => return Ok(Shutdown::Exit(code)),
        }
    }
}

/// Answer a request whose body is not understood. Lines without a readable
/// envelope have no id to answer and are dropped.
fn reject<W: Write>(
    engine: &Engine,
    writer: &mut W,
    line: &str,
    err: ProtocolError,
) -> Result<(), ProtocolError> {
    match decode_line::<Envelope<serde_json::Value>>(line) {
        Ok(envelope) => {
            warn!("{}: invalid request {}: {err}", engine.name(), envelope.id);
            let response = Response::error(
                ErrorKind::InvalidRequest,
                "RunMat:invalidRequest",
                err.to_string(),
            );
            write_message(writer, &Envelope::reply(&envelope, response))
        }
        Err(_) => {
            warn!("{}: dropping unreadable line: {err}", engine.name());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmat_engine_protocol::{encode_line, Request, ResponseEnvelope, PROTOCOL_VERSION};
    use std::io::Cursor;

    fn run(requests: &[RequestEnvelope]) -> (Shutdown, Vec<ResponseEnvelope>) {
        let input: String = requests.iter().map(|r| encode_line(r).unwrap()).collect();
        let mut reader = Cursor::new(input.into_bytes());
        let mut output = Vec::new();
        let mut engine = Engine::new("loop");
        let end = serve(&mut engine, &mut reader, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let replies = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (end, replies)
    }

    #[test]
    fn greets_then_answers_in_order() {
        let eval = Envelope::new(Request::Eval {
            code: "x = 1;".into(),
            capture_output: false,
        });
        let who = Envelope::new(Request::Who);
        let bye = Envelope::new(Request::Shutdown);
        let (end, replies) = run(&[eval.clone(), who.clone(), bye.clone()]);
        assert_eq!(end, Shutdown::Requested);
        assert_eq!(replies.len(), 4);
        assert!(matches!(
            replies[0].body,
            Response::Ready { protocol_version, .. } if protocol_version == PROTOCOL_VERSION
        ));
        assert!(replies[1].answers(&eval));
        assert!(replies[2].answers(&who));
        assert_eq!(replies[2].body, Response::Names { names: vec!["x".into()] });
        assert!(replies[3].answers(&bye));
        assert_eq!(replies[3].body, Response::Goodbye);
    }

    #[test]
    fn exit_stops_without_a_reply() {
        let exit = Envelope::new(Request::Eval {
            code: "quit(2)".into(),
            capture_output: false,
        });
        let never = Envelope::new(Request::Who);
        let (end, replies) = run(&[exit, never]);
        assert_eq!(end, Shutdown::Exit(2));
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn unknown_requests_are_rejected_by_id() {
        let input = concat!(
            "{\"id\":\"abc\",\"date\":\"now\",\"body\":{\"type\":\"frobnicate\"}}\n",
            "not json at all\n",
        );
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();
        let mut engine = Engine::new("loop");
        let end = serve(&mut engine, &mut reader, &mut output).unwrap();
        assert_eq!(end, Shutdown::EndOfInput);
        let text = String::from_utf8(output).unwrap();
        let replies: Vec<ResponseEnvelope> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].parent_id.as_deref(), Some("abc"));
        assert!(matches!(
            replies[1].body,
            Response::Error {
                kind: ErrorKind::InvalidRequest,
                ..
            }
        ));
    }

    #[test]
    fn end_of_input_ends_the_loop() {
        let (end, replies) = run(&[]);
        assert_eq!(end, Shutdown::EndOfInput);
        assert_eq!(replies.len(), 1);
    }
}
