//! Connected host over a byte stream.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::error::TransportError;
use crate::protocol::Message;

use super::framing::{write_message, ProtocolLog};
use super::HostTransport;

/// Where a stream host keeps the view state it is asked to persist.
#[derive(Debug, Clone)]
pub enum HostStorage {
    /// Kept for the lifetime of the transport.
    Memory(Option<Value>),
    /// JSON document on disk; survives restarts of the host process.
    File(PathBuf),
}

impl Default for HostStorage {
    fn default() -> Self {
        Self::Memory(None)
    }
}

/// Host that receives framed JSON messages on `writer`.
#[derive(Debug)]
pub struct StreamTransport<W: Write> {
    writer: W,
    storage: HostStorage,
    log: Option<ProtocolLog>,
}

impl<W: Write> StreamTransport<W> {
    pub fn new(writer: W, storage: HostStorage) -> Self {
        Self {
            writer,
            storage,
            log: None,
        }
    }

    #[must_use]
    pub fn with_protocol_log(mut self, log: Option<ProtocolLog>) -> Self {
        self.log = log;
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<W: Write> HostTransport for StreamTransport<W> {
    fn is_hosted(&self) -> bool {
        true
    }

    fn post_message(&mut self, message: &Message) -> Result<(), TransportError> {
        let serialized = serde_json::to_string(message)?;
        if let Some(log) = &self.log {
            log.outbound(&serialized);
        }
        write_message(&mut self.writer, &serialized)?;
        Ok(())
    }

    fn get_state(&mut self) -> Option<Value> {
        match &self.storage {
            HostStorage::Memory(state) => state.clone(),
            HostStorage::File(path) => {
                let contents = fs::read_to_string(path).ok()?;
                match serde_json::from_str(&contents) {
                    Ok(state) => Some(state),
                    Err(err) => {
                        warn!("Ignoring unreadable view state at {}: {err}", path.display());
                        None
                    }
                }
            }
        }
    }

    fn set_state(&mut self, state: &Value) -> Result<(), TransportError> {
        match &mut self.storage {
            HostStorage::Memory(slot) => {
                *slot = Some(state.clone());
                Ok(())
            }
            HostStorage::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let payload = serde_json::to_string_pretty(state)?;
                fs::write(path, payload)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Event;
    use crate::transport::framing::read_message;
    use serde_json::json;
    use std::io::BufReader;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("outview-{prefix}-{stamp}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn posts_framed_messages() {
        let mut transport = StreamTransport::new(Vec::new(), HostStorage::default());
        let event = Message::Event(Event {
            seq: 3,
            event: "onClickReference".to_string(),
            data: Some(json!({"line": 4})),
        });
        transport.post_message(&event).unwrap();

        let written = transport.into_writer();
        let mut reader = BufReader::new(&written[..]);
        let payload = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(Message::parse(&payload).unwrap(), event);
    }

    #[test]
    fn file_storage_survives_a_new_transport() {
        let dir = temp_dir("stream-state");
        let path = dir.join("nested").join("state.json");
        let state = json!({"filterLevel": "FAIL", "runIdToTreeState": {}, "runIdLRU": []});

        let mut first = StreamTransport::new(Vec::new(), HostStorage::File(path.clone()));
        assert_eq!(first.get_state(), None);
        first.set_state(&state).unwrap();

        let mut second = StreamTransport::new(Vec::new(), HostStorage::File(path));
        assert_eq!(second.get_state(), Some(state));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn corrupt_state_file_reads_as_first_run() {
        let dir = temp_dir("stream-corrupt");
        let path = dir.join("state.json");
        fs::write(&path, "{not json").unwrap();
        let mut transport = StreamTransport::new(Vec::new(), HostStorage::File(path));
        assert_eq!(transport.get_state(), None);
        fs::remove_dir_all(dir).ok();
    }
}
