//! One JSON document per line.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, Write};

use crate::error::{ProtocolError, Result};

/// Serialise `message` as a single newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Malformed("empty line".into()));
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Write one message and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    writer.write_all(encode_line(message)?.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read the next message, skipping blank lines. `None` at end of input.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return decode_line(&line).map(Some);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Envelope, Request, RequestEnvelope};
    use std::io::Cursor;

    #[test]
    fn lines_round_trip_through_a_buffer() {
        let first = Envelope::new(Request::Get { name: "x".into() });
        let second = Envelope::new(Request::Shutdown);
        let mut buf = Vec::new();
        write_message(&mut buf, &first).unwrap();
        buf.extend_from_slice(b"\n\n");
        write_message(&mut buf, &second).unwrap();

        let mut reader = Cursor::new(buf);
        let a: Option<RequestEnvelope> = read_message(&mut reader).unwrap();
        let b: Option<RequestEnvelope> = read_message(&mut reader).unwrap();
        let end: Option<RequestEnvelope> = read_message(&mut reader).unwrap();
        assert_eq!(a, Some(first));
        assert_eq!(b, Some(second));
        assert_eq!(end, None);
    }

    #[test]
    fn garbage_is_a_json_error() {
        let err = decode_line::<RequestEnvelope>("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert!(matches!(
            decode_line::<RequestEnvelope>("   "),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
