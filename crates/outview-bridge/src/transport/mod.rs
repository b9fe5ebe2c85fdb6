//! Host transport capability.
//! - HostTransport: postMessage/getState/setState seen from the view
//! - StandaloneTransport: no host bound; everything degrades locally
//! - stream: framed writer host with memory or file-backed storage
//! - framing: Content-Length framing + protocol transcript

pub mod framing;
mod stream;

use serde_json::Value;

use crate::error::TransportError;
use crate::protocol::Message;

pub use self::framing::ProtocolLog;
pub use self::stream::{HostStorage, StreamTransport};

/// What the view can ask of its host.
///
/// The choice between a connected host and standalone operation is made by
/// picking an implementation at construction; callers branch on
/// [`HostTransport::is_hosted`] only where the degraded behavior differs
/// (synthesized responses, in-memory state).
pub trait HostTransport {
    /// `true` when messages and state actually reach a host.
    fn is_hosted(&self) -> bool;

    /// Deliver one message to the host.
    fn post_message(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Read the host-persisted view state; `None` on first run.
    fn get_state(&mut self) -> Option<Value>;

    /// Hand the whole view state to the host for persistence.
    fn set_state(&mut self, state: &Value) -> Result<(), TransportError>;
}

/// Transport used when no host is bound (e.g. the view opened as a static page).
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneTransport;

impl HostTransport for StandaloneTransport {
    fn is_hosted(&self) -> bool {
        false
    }

    fn post_message(&mut self, _message: &Message) -> Result<(), TransportError> {
        Ok(())
    }

    fn get_state(&mut self) -> Option<Value> {
        None
    }

    fn set_state(&mut self, _state: &Value) -> Result<(), TransportError> {
        Ok(())
    }
}
