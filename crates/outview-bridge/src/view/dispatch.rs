//! Inbound routing.
//! - handle_payload: transcript + decode raw JSON
//! - handle_message: sweep expired requests, then route by message type
//! - requests are acknowledged once handled (when enabled)

use tracing::{debug, warn};

use crate::ingest::TreeBuilder;
use crate::protocol::{Event, InboundEvent, InboundRequest, Message, Request, Response};

use super::{DispatchOutcome, ViewContext};

impl<T: TreeBuilder> ViewContext<T> {
    /// Decode and handle one raw inbound payload. Never fails: malformed
    /// payloads are logged and dropped.
    pub fn handle_payload(&mut self, payload: &str) -> DispatchOutcome {
        if let Some(log) = &self.protocol_log {
            log.inbound(payload);
        }
        match Message::parse(payload) {
            Ok(message) => self.handle_message(message),
            Err(err) => {
                warn!("Dropping malformed message: {err}");
                DispatchOutcome::Rejected
            }
        }
    }

    pub fn handle_message(&mut self, message: Message) -> DispatchOutcome {
        self.messenger.sweep_expired();
        match message {
            Message::Response(response) => self.handle_response(response),
            Message::Event(event) => self.handle_event(&event),
            Message::Request(request) => self.handle_request(request),
        }
    }

    fn handle_response(&mut self, response: Response) -> DispatchOutcome {
        if self.messenger.resolve_response(response) {
            DispatchOutcome::Resolved
        } else {
            DispatchOutcome::Unmatched
        }
    }

    fn handle_event(&mut self, event: &Event) -> DispatchOutcome {
        match InboundEvent::from_event(event) {
            InboundEvent::Output => {
                debug!(seq = event.seq, "no handler wired for output event");
                DispatchOutcome::Unhandled
            }
            InboundEvent::Unknown => {
                warn!(event = %event.event, seq = event.seq, "unhandled event");
                DispatchOutcome::Unhandled
            }
        }
    }

    fn handle_request(&mut self, request: Request) -> DispatchOutcome {
        let decoded = match InboundRequest::from_request(&request) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(seq = request.seq, "Rejecting request: {err}");
                return DispatchOutcome::Rejected;
            }
        };

        let outcome = match decoded {
            InboundRequest::SetContents(args) => {
                self.ingest
                    .set_contents(args, &mut self.store, self.messenger.transport_mut());
                DispatchOutcome::Handled
            }
            InboundRequest::AppendContents(args) => {
                if self.ingest.append_contents(args) {
                    DispatchOutcome::Handled
                } else {
                    DispatchOutcome::Stale
                }
            }
            InboundRequest::UpdateLabel(args) => {
                self.ingest.update_label(&args);
                DispatchOutcome::Handled
            }
            InboundRequest::Unknown => {
                warn!(command = %request.command, seq = request.seq, "unhandled request");
                return DispatchOutcome::Unhandled;
            }
        };

        if self.acknowledge_requests {
            self.messenger.send_response(&request, None);
        }
        outcome
    }
}
