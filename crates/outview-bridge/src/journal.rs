//! Line-counting tree builder used by the `outview-bridge` binary.
//!
//! The real tree renderer lives in the host's web view; the bridge only
//! keeps enough bookkeeping to persist a meaningful tree state per run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::ingest::{ActiveRunOptions, TreeBuilder};

/// Tree state persisted for each run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalState {
    pub lines: usize,
    pub appended_chunks: usize,
}

#[derive(Debug, Default)]
pub struct JournalTree {
    run_id: Option<String>,
    state: JournalState,
    restored: Option<JournalState>,
}

impl JournalTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn state(&self) -> &JournalState {
        &self.state
    }

    /// State the current run was reopened from, if it had been shown before.
    pub fn restored(&self) -> Option<&JournalState> {
        self.restored.as_ref()
    }
}

fn count_lines(contents: &str) -> usize {
    contents.lines().count()
}

impl TreeBuilder for JournalTree {
    fn clear_and_initialize_tree(&mut self, options: &ActiveRunOptions, saved: Option<&Value>) {
        self.run_id = options.run_id.clone();
        self.state = JournalState::default();
        self.restored = saved.and_then(|value| serde_json::from_value(value.clone()).ok());
        debug!(
            run_id = ?self.run_id,
            restored = self.restored.is_some(),
            "tree cleared"
        );
    }

    fn add_initial_contents(&mut self, options: &ActiveRunOptions) {
        self.state.lines = count_lines(&options.initial_contents);
        info!(
            run_id = ?self.run_id,
            lines = self.state.lines,
            runs = options.all_run_ids_to_label.len(),
            "run loaded"
        );
    }

    fn on_appended_contents(&mut self, options: &ActiveRunOptions) {
        let pending = options
            .appended_contents
            .get(self.state.appended_chunks..)
            .unwrap_or_default();
        let added: usize = pending.iter().map(|chunk| count_lines(chunk)).sum();
        self.state.appended_chunks = options.appended_contents.len();
        self.state.lines += added;
        debug!(
            run_id = ?self.run_id,
            added,
            lines = self.state.lines,
            "appended contents"
        );
    }

    fn save_tree_state(&mut self) -> Option<Value> {
        self.run_id.as_ref()?;
        serde_json::to_value(&self.state).ok()
    }
}
