//! View core.
//! - ViewContext::new/accessors
//! - init/teardown: load and repair state, save on dispose
//! - user actions: change_run, click_reference, filter/toggles
//! - run: framed read loop

use std::io::{self, BufRead};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ViewConfig;
use crate::correlation::{PendingRequests, PendingResponse};
use crate::error::RequestError;
use crate::ingest::{IngestionController, TreeBuilder};
use crate::messenger::Messenger;
use crate::protocol::{OutboundEvent, SetCurrentRunIdBody};
use crate::state::{FilterLevel, PersistedState, StateStore};
use crate::transport::framing::read_message;
use crate::transport::{HostTransport, ProtocolLog};

use super::ViewContext;

impl<T: TreeBuilder> ViewContext<T> {
    pub fn new(transport: impl HostTransport + 'static, tree: T, config: &ViewConfig) -> Self {
        let pending = PendingRequests::new(config.requests.max_in_flight, config.requests.timeout());
        Self {
            messenger: Messenger::new(Box::new(transport), pending),
            store: StateStore::new(config.state.lru_capacity),
            ingest: IngestionController::new(tree),
            acknowledge_requests: config.protocol.acknowledge_requests,
            protocol_log: None,
            initialized: false,
        }
    }

    /// Transcript for inbound payloads; outbound ones are logged by the transport.
    #[must_use]
    pub fn with_protocol_log(mut self, log: Option<ProtocolLog>) -> Self {
        self.protocol_log = log;
        self
    }

    pub fn is_hosted(&self) -> bool {
        self.messenger.is_hosted()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub fn ingest(&self) -> &IngestionController<T> {
        &self.ingest
    }

    pub fn tree(&self) -> &T {
        self.ingest.tree()
    }

    pub fn tree_mut(&mut self) -> &mut T {
        self.ingest.tree_mut()
    }

    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    /// Current persisted state as the host (or memory) holds it.
    pub fn persisted_state(&mut self) -> PersistedState {
        self.store.get(self.messenger.transport_mut())
    }

    /// Load persisted state, repair it and write the repaired form back.
    pub fn init(&mut self) -> PersistedState {
        let state = self.store.load(self.messenger.transport_mut());
        info!(
            hosted = self.messenger.is_hosted(),
            filter_level = state.filter_level.as_str(),
            runs = state.run_id_lru.len(),
            "view initialized"
        );
        self.initialized = true;
        state
    }

    /// Save the run on display and drop every in-flight request.
    pub fn teardown(&mut self) {
        self.ingest
            .save_active(&mut self.store, self.messenger.transport_mut());
        let cancelled = self.messenger.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled in-flight requests on teardown");
        }
        self.initialized = false;
        info!("view disposed");
    }

    /// Send a request to the host. Without a host the handle resolves
    /// immediately with an empty response.
    pub fn send_request(
        &mut self,
        command: &str,
        arguments: Map<String, Value>,
    ) -> Result<PendingResponse, RequestError> {
        self.messenger.send_request(command, arguments)
    }

    pub fn cancel_request(&mut self, seq: u64) -> bool {
        self.messenger.cancel(seq)
    }

    /// The user picked `run_id` in the run selector; the host answers with
    /// `setContents` for that run.
    pub fn change_run(&mut self, run_id: &str) {
        self.messenger
            .send_event(OutboundEvent::SetCurrentRunId(SetCurrentRunIdBody {
                run_id: run_id.to_string(),
            }));
    }

    /// The user activated a cross-reference in the tree.
    pub fn click_reference(&mut self, reference: Value) {
        match self.ingest.activate_reference(reference) {
            Some(event) => self.messenger.send_event(event),
            None => debug!("reference activated without a host callback"),
        }
    }

    pub fn filter_level(&mut self) -> FilterLevel {
        self.store.filter_level(self.messenger.transport_mut())
    }

    pub fn set_filter_level(&mut self, level: FilterLevel) {
        debug!(level = level.as_str(), "filter level changed");
        self.store
            .set_filter_level(self.messenger.transport_mut(), level);
    }

    pub fn set_show_time(&mut self, show_time: bool) {
        self.ingest.set_show_time(show_time);
    }

    pub fn set_show_expand(&mut self, show_expand: bool) {
        self.ingest.set_show_expand(show_expand);
    }

    /// Persist the tree state of the run on display.
    pub fn save_tree_state(&mut self) {
        self.ingest
            .save_active(&mut self.store, self.messenger.transport_mut());
    }

    /// Process framed messages from `reader` until end of stream.
    pub fn run<R: BufRead>(&mut self, reader: &mut R) -> io::Result<()> {
        loop {
            let payload = match read_message(reader) {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    warn!("Skipping unreadable frame: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            self.handle_payload(&payload);
        }
        Ok(())
    }
}
