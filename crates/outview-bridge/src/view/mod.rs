//! View context module map.
//! - core: construction, init/teardown, user actions, read loop
//! - dispatch: inbound message routing
//! - tests: view unit tests

mod core;
mod dispatch;


use crate::ingest::IngestionController;
use crate::messenger::Messenger;
use crate::state::StateStore;
use crate::transport::ProtocolLog;

/// Everything one view instance owns. Handlers borrow disjoint fields, so
/// there is no shared mutable state outside this struct.
#[derive(Debug)]
pub struct ViewContext<T> {
    messenger: Messenger,
    store: StateStore,
    ingest: IngestionController<T>,
    acknowledge_requests: bool,
    protocol_log: Option<ProtocolLog>,
    initialized: bool,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A response reached the request waiting on it.
    Resolved,
    /// A response matched no pending request and was dropped.
    Unmatched,
    /// A request or event was handled.
    Handled,
    /// A run-scoped request targeted a run that is no longer on display.
    Stale,
    /// No handler exists for the event or command.
    Unhandled,
    /// The payload or its arguments could not be decoded.
    Rejected,
}
