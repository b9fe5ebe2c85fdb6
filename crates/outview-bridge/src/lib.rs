//! Host bridge for an embedded run-output tree view.
//!
//! Carries request/response/event messages between the view and its host,
//! keeps per-run tree state in host storage under an LRU bound, and feeds
//! run contents to a [`TreeBuilder`].

pub mod config;
mod correlation;
mod error;
mod ingest;
pub mod journal;
mod messenger;
mod protocol;
mod state;
pub mod transport;
mod view;

pub use config::ViewConfig;
pub use correlation::{PendingRequests, PendingResponse, SeqCounter};
pub use error::{ProtocolError, RequestError, TransportError};
pub use ingest::{ActiveRunOptions, IngestionController, ReferenceCallback, RunPhase, TreeBuilder};
pub use journal::JournalTree;
pub use messenger::Messenger;
pub use protocol::{
    AppendContentsArguments, Event, InboundEvent, InboundRequest, Message, OutboundEvent, Request,
    Response, SetContentsArguments, SetCurrentRunIdBody, UpdateLabelArguments,
};
pub use state::{FilterLevel, PersistedState, StateStore, DEFAULT_LRU_CAPACITY};
pub use transport::{HostStorage, HostTransport, StandaloneTransport, StreamTransport};
pub use view::{DispatchOutcome, ViewContext};
