//! Content ingestion for the active run.
//! - ActiveRunOptions: what the tree is currently built from
//! - TreeBuilder: full rebuild / incremental append / state snapshot
//! - IngestionController: setContents, appendContents, updateLabel

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::protocol::{
    AppendContentsArguments, OutboundEvent, SetContentsArguments, UpdateLabelArguments,
};
use crate::state::StateStore;
use crate::transport::HostTransport;

/// Invoked with the reference payload when the user activates a
/// cross-reference inside the tree.
pub type ReferenceCallback = fn(Value) -> OutboundEvent;

/// Options for the run currently on display. Replaced on every
/// `setContents`, extended on every accepted `appendContents`.
#[derive(Debug, Clone)]
pub struct ActiveRunOptions {
    pub run_id: Option<String>,
    pub initial_contents: String,
    /// Chunks received since the last full rebuild, in arrival order.
    pub appended_contents: Vec<String>,
    pub all_run_ids_to_label: IndexMap<String, String>,
    pub show_time: bool,
    pub show_expand: bool,
    pub on_click_reference: Option<ReferenceCallback>,
}

impl Default for ActiveRunOptions {
    fn default() -> Self {
        Self {
            run_id: None,
            initial_contents: String::new(),
            appended_contents: Vec::new(),
            all_run_ids_to_label: IndexMap::new(),
            show_time: true,
            show_expand: true,
            on_click_reference: None,
        }
    }
}

/// Where a run stands relative to the one on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No run has been shown yet.
    Uninitialized,
    Active,
    /// Another run is on display; late messages for this one are stale.
    Superseded,
}

/// Builds the renderable tree from run contents.
pub trait TreeBuilder {
    /// Drop the current tree and prepare for `options`, reopening it from
    /// `saved` when this run was shown before.
    fn clear_and_initialize_tree(&mut self, options: &ActiveRunOptions, saved: Option<&Value>);

    /// Parse `options.initial_contents` into the fresh tree.
    fn add_initial_contents(&mut self, options: &ActiveRunOptions);

    /// Consume chunks of `options.appended_contents` not yet processed.
    fn on_appended_contents(&mut self, options: &ActiveRunOptions);

    /// Snapshot of the tree's view state (expanded nodes, scroll, ...).
    fn save_tree_state(&mut self) -> Option<Value>;
}

#[derive(Debug)]
pub struct IngestionController<T> {
    options: ActiveRunOptions,
    tree: T,
}

impl<T: TreeBuilder> IngestionController<T> {
    pub fn new(tree: T) -> Self {
        Self {
            options: ActiveRunOptions::default(),
            tree,
        }
    }

    pub fn options(&self) -> &ActiveRunOptions {
        &self.options
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut T {
        &mut self.tree
    }

    pub fn active_run_id(&self) -> Option<&str> {
        self.options.run_id.as_deref()
    }

    #[must_use]
    pub fn phase_of(&self, run_id: &str) -> RunPhase {
        match self.active_run_id() {
            None => RunPhase::Uninitialized,
            Some(active) if active == run_id => RunPhase::Active,
            Some(_) => RunPhase::Superseded,
        }
    }

    /// Persist the tree state of the run on display, if any.
    pub fn save_active(&mut self, store: &mut StateStore, host: &mut dyn HostTransport) {
        let Some(run_id) = self.options.run_id.as_deref() else {
            return;
        };
        if let Some(tree_state) = self.tree.save_tree_state() {
            store.save_tree_state(host, run_id, tree_state);
        }
    }

    /// Switch to a new run: save the old one, replace the options, rebuild.
    pub fn set_contents(
        &mut self,
        args: SetContentsArguments,
        store: &mut StateStore,
        host: &mut dyn HostTransport,
    ) {
        self.save_active(store, host);

        let on_click_reference = host
            .is_hosted()
            .then_some(OutboundEvent::click_reference as ReferenceCallback);
        let run_id = args.run_id;
        self.options = ActiveRunOptions {
            run_id: Some(run_id.clone()),
            initial_contents: args.initial_contents,
            appended_contents: Vec::new(),
            all_run_ids_to_label: args.all_run_ids_to_label,
            show_time: self.options.show_time,
            show_expand: self.options.show_expand,
            on_click_reference,
        };

        store.activate_run(host, &run_id);
        let saved = store.tree_state(host, &run_id);
        debug!(
            run_id = %run_id,
            initial_len = self.options.initial_contents.len(),
            restored = saved.is_some(),
            "rebuilding tree"
        );
        self.tree
            .clear_and_initialize_tree(&self.options, saved.as_ref());
        self.tree.add_initial_contents(&self.options);
    }

    /// Append a chunk to the active run. Returns `false` (and changes
    /// nothing) when `args.run_id` is not the run on display.
    pub fn append_contents(&mut self, args: AppendContentsArguments) -> bool {
        if self.phase_of(&args.run_id) != RunPhase::Active {
            debug!(
                run_id = %args.run_id,
                active = ?self.active_run_id(),
                "ignoring contents for inactive run"
            );
            return false;
        }
        self.options.appended_contents.push(args.append_contents);
        self.tree.on_appended_contents(&self.options);
        true
    }

    /// Label updates are accepted but not applied yet.
    pub fn update_label(&mut self, args: &UpdateLabelArguments) {
        // TODO: store the label in all_run_ids_to_label and refresh the run selector.
        debug!(run_id = %args.run_id, label = %args.label, "updateLabel ignored");
    }

    pub fn set_show_time(&mut self, show_time: bool) {
        self.options.show_time = show_time;
    }

    pub fn set_show_expand(&mut self, show_expand: bool) {
        self.options.show_expand = show_expand;
    }

    /// Run the cross-reference callback, if one is wired for this run.
    pub fn activate_reference(&self, reference: Value) -> Option<OutboundEvent> {
        self.options
            .on_click_reference
            .map(|callback| callback(reference))
    }
}
