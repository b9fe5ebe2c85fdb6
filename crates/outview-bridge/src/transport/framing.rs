//! Host stream framing.
//! - read_message: parse one Content-Length framed payload, skipping bad frames whole
//! - write_message: emit one framed payload
//! - ProtocolLog: optional `<-`/`->` transcript

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufWriter, Read, Write};
use std::path::Path;
use std::rc::Rc;

const CONTENT_LENGTH: &str = "Content-Length";

/// Largest payload accepted from a host.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

fn invalid_frame(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Read one framed payload. Returns `Ok(None)` on a clean end of stream.
///
/// Blank lines between frames are skipped. An unusable frame (missing or
/// unparsable length, oversized, not UTF-8) is consumed and reported as
/// `InvalidData`, leaving the reader at the start of the next frame.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    read_message_limited(reader, MAX_FRAME_LEN)
}

fn read_message_limited<R: BufRead>(reader: &mut R, limit: usize) -> io::Result<Option<String>> {
    let mut content_length: Option<Result<usize, String>> = None;
    let mut in_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if in_header {
                break;
            }
            continue;
        }
        in_header = true;
        let Some((name, value)) = trimmed.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            content_length = Some(value.parse::<usize>().map_err(|_| value.to_string()));
        }
    }

    let length = match content_length {
        Some(Ok(length)) => length,
        Some(Err(raw)) => return Err(invalid_frame(format!("invalid Content-Length '{raw}'"))),
        None => return Err(invalid_frame("missing Content-Length header")),
    };
    if length > limit {
        let skip = u64::try_from(length).unwrap_or(u64::MAX);
        io::copy(&mut reader.by_ref().take(skip), &mut io::sink())?;
        return Err(invalid_frame(format!(
            "frame of {length} bytes exceeds the {limit} byte limit"
        )));
    }

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer)?;
    String::from_utf8(buffer)
        .map(Some)
        .map_err(|_| invalid_frame("payload is not valid utf-8"))
}

/// Emit one frame; header and payload go out in a single `write_all`.
pub fn write_message<W: Write>(writer: &mut W, payload: &str) -> io::Result<()> {
    let mut frame = format!("{CONTENT_LENGTH}: {}\r\n\r\n", payload.len()).into_bytes();
    frame.extend_from_slice(payload.as_bytes());
    writer.write_all(&frame)?;
    writer.flush()
}

/// Append-only protocol transcript shared by the inbound loop and the transport.
#[derive(Debug, Clone)]
pub struct ProtocolLog {
    writer: Rc<RefCell<BufWriter<File>>>,
}

impl ProtocolLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Rc::new(RefCell::new(BufWriter::new(file))),
        })
    }

    pub fn inbound(&self, payload: &str) {
        self.write("<-", payload);
    }

    pub fn outbound(&self, payload: &str) {
        self.write("->", payload);
    }

    fn write(&self, direction: &str, payload: &str) {
        let mut writer = self.writer.borrow_mut();
        let _ = writeln!(writer, "{direction} {payload}").and_then(|()| writer.flush());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    #[test]
    fn framed_payload_roundtrip() {
        let payload = r#"{"seq":1,"type":"request","command":"setContents"}"#;
        let mut buffer = Vec::new();
        write_message(&mut buffer, payload).unwrap();

        let mut reader = BufReader::new(&buffer[..]);
        let read = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(read, payload);
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let raw = b"content-length: 2\r\nX-Other: 1\r\n\r\n{}";
        let mut reader = BufReader::new(&raw[..]);
        assert_eq!(read_message(&mut reader).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn blank_lines_between_frames_are_skipped() {
        let raw = b"Content-Length: 2\r\n\r\n{}\r\n\r\nContent-Length: 4\r\n\r\nnull";
        let mut reader = BufReader::new(&raw[..]);
        assert_eq!(read_message(&mut reader).unwrap().as_deref(), Some("{}"));
        assert_eq!(read_message(&mut reader).unwrap().as_deref(), Some("null"));
        assert!(read_message(&mut reader).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_skipped_whole() {
        let raw = b"Content-Length: 10\r\n\r\n0123456789Content-Length: 2\r\n\r\n{}";
        let mut reader = BufReader::new(&raw[..]);
        let err = read_message_limited(&mut reader, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(
            read_message_limited(&mut reader, 4).unwrap().as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn unparsable_length_is_invalid_data() {
        let raw = b"Content-Length: twelve\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let err = read_message(&mut reader).unwrap_err();
        assert!(err.to_string().contains("twelve"));
    }

    #[test]
    fn missing_length_is_invalid_data() {
        let raw = b"X-Other: 1\r\n\r\n{}";
        let mut reader = BufReader::new(&raw[..]);
        let err = read_message(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
