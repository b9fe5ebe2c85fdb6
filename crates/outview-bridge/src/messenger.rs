//! Outbound messaging over a [`HostTransport`].
//!
//! Owns the sequence counter and the in-flight table so that requests,
//! responses and events all draw from one counter.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::correlation::{PendingRequests, PendingResponse, SeqCounter};
use crate::error::RequestError;
use crate::protocol::{Event, Message, OutboundEvent, Request, Response};
use crate::transport::HostTransport;

pub struct Messenger {
    transport: Box<dyn HostTransport>,
    seq: SeqCounter,
    pending: PendingRequests,
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("hosted", &self.transport.is_hosted())
            .field("seq", &self.seq)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Messenger {
    pub fn new(transport: Box<dyn HostTransport>, pending: PendingRequests) -> Self {
        Self {
            transport,
            seq: SeqCounter::new(),
            pending,
        }
    }

    pub fn is_hosted(&self) -> bool {
        self.transport.is_hosted()
    }

    pub fn transport_mut(&mut self) -> &mut dyn HostTransport {
        self.transport.as_mut()
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingRequests {
        &mut self.pending
    }

    pub fn next_seq(&mut self) -> u64 {
        self.seq.next_seq()
    }

    /// Send a request and get a handle to its response.
    ///
    /// Without a host the handle is already resolved with a synthesized
    /// response (fresh seq, matching `request_seq`/`command`, no body).
    pub fn send_request(
        &mut self,
        command: &str,
        arguments: Map<String, Value>,
    ) -> Result<PendingResponse, RequestError> {
        let seq = self.next_seq();
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        if !self.transport.is_hosted() {
            let response = Response {
                seq: self.next_seq(),
                command: request.command,
                request_seq: seq,
                body: None,
            };
            return Ok(PendingResponse::ready(seq, response));
        }

        let handle = self.pending.register(seq, command, Instant::now())?;
        if let Err(source) = self.transport.post_message(&Message::Request(request)) {
            self.pending.cancel(seq);
            return Err(RequestError::Transport { seq, source });
        }
        Ok(handle)
    }

    /// Fire-and-forget notification. A silent no-op without a host.
    pub fn send_event(&mut self, event: OutboundEvent) {
        if !self.transport.is_hosted() {
            return;
        }
        let message = Message::Event(Event {
            seq: self.next_seq(),
            event: event.name().to_string(),
            data: event.into_data(),
        });
        if let Err(err) = self.transport.post_message(&message) {
            warn!("Failed to deliver event to host: {err}");
        }
    }

    /// Answer a host request.
    pub fn send_response(&mut self, request: &Request, body: Option<Value>) {
        if !self.transport.is_hosted() {
            return;
        }
        let message = Message::Response(Response {
            seq: self.next_seq(),
            command: request.command.clone(),
            request_seq: request.seq,
            body,
        });
        if let Err(err) = self.transport.post_message(&message) {
            warn!(
                command = %request.command,
                "Failed to deliver response to host: {err}"
            );
        }
    }

    /// Route an inbound response to its waiter; unmatched ones are dropped.
    pub fn resolve_response(&mut self, response: Response) -> bool {
        self.pending.resolve(response)
    }

    /// Expire overdue requests; run once per inbound message.
    pub fn sweep_expired(&mut self) {
        let expired = self.pending.sweep_expired(Instant::now());
        if expired > 0 {
            debug!(expired, "expired pending requests");
        }
    }

    pub fn cancel(&mut self, seq: u64) -> bool {
        self.pending.cancel(seq)
    }

    pub fn cancel_all(&mut self) -> usize {
        self.pending.cancel_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InboundRequest;
    use crate::transport::StandaloneTransport;
    use crate::TransportError;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default, Clone)]
    struct RecordingHost {
        sent: Rc<RefCell<Vec<Message>>>,
        fail: bool,
    }

    impl HostTransport for RecordingHost {
        fn is_hosted(&self) -> bool {
            true
        }

        fn post_message(&mut self, message: &Message) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Io(std::io::Error::other("host gone")));
            }
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }

        fn get_state(&mut self) -> Option<Value> {
            None
        }

        fn set_state(&mut self, _state: &Value) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn arguments(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn standalone_request_resolves_with_synthesized_response() {
        let mut messenger = Messenger::new(
            Box::new(StandaloneTransport),
            PendingRequests::new(8, None),
        );
        let handle = messenger
            .send_request(
                InboundRequest::SET_CONTENTS,
                arguments(json!({"initialContents": "x", "runId": "r1"})),
            )
            .unwrap();
        assert_eq!(handle.seq(), 1);
        let response = handle.wait().await.unwrap();
        assert_eq!(
            serde_json::to_value(Message::Response(response)).unwrap(),
            json!({"type": "response", "seq": 2, "command": "setContents", "request_seq": 1})
        );
        assert!(messenger.pending().is_empty());
    }

    #[tokio::test]
    async fn hosted_request_waits_for_matching_response() {
        let host = RecordingHost::default();
        let sent = Rc::clone(&host.sent);
        let mut messenger = Messenger::new(Box::new(host), PendingRequests::new(8, None));

        let mut handle = messenger.send_request("ping", Map::new()).unwrap();
        assert!(handle.try_response().is_none());
        assert_eq!(sent.borrow().len(), 1);

        assert!(messenger.resolve_response(Response {
            seq: 10,
            command: "ping".to_string(),
            request_seq: handle.seq(),
            body: Some(json!("pong")),
        }));
        assert_eq!(handle.wait().await.unwrap().body, Some(json!("pong")));
    }

    #[test]
    fn failed_post_releases_the_pending_slot() {
        let host = RecordingHost {
            fail: true,
            ..RecordingHost::default()
        };
        let mut messenger = Messenger::new(Box::new(host), PendingRequests::new(8, None));
        let err = messenger.send_request("ping", Map::new()).unwrap_err();
        assert!(matches!(err, RequestError::Transport { seq: 1, .. }));
        assert_eq!(err.seq(), Some(1));
        assert!(messenger.pending().is_empty());
    }

    #[test]
    fn events_share_the_request_counter() {
        let host = RecordingHost::default();
        let sent = Rc::clone(&host.sent);
        let mut messenger = Messenger::new(Box::new(host), PendingRequests::new(8, None));

        let _handle = messenger.send_request("ping", Map::new()).unwrap();
        messenger.send_event(OutboundEvent::click_reference(json!({"id": 1})));

        let sent = sent.borrow();
        let seqs: Vec<u64> = sent.iter().map(Message::seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        let Message::Event(event) = &sent[1] else {
            panic!("expected event");
        };
        assert_eq!(event.event, "onClickReference");
        assert_eq!(event.data, Some(json!({"id": 1})));
    }

    #[test]
    fn standalone_events_are_dropped() {
        let mut messenger = Messenger::new(
            Box::new(StandaloneTransport),
            PendingRequests::new(8, None),
        );
        messenger.send_event(OutboundEvent::click_reference(json!(null)));
        // No seq consumed by a dropped event.
        assert_eq!(messenger.next_seq(), 1);
    }
}
