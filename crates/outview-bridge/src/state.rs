//! Persisted view state.
//!
//! One document per view: the active filter level plus the saved tree state
//! of recently shown runs. `runIdLRU` is ordered most-recently-used first
//! and always holds exactly the keys of `runIdToTreeState`.

use indexmap::{IndexMap, IndexSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::transport::HostTransport;

pub const DEFAULT_LRU_CAPACITY: usize = 32;

/// Severity filter applied to the tree (e.g. `PASS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterLevel(SmolStr);

impl FilterLevel {
    pub const PASS: &'static str = "PASS";

    pub fn new(level: impl AsRef<str>) -> Self {
        Self(SmolStr::new(level.as_ref()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for FilterLevel {
    fn default() -> Self {
        Self(SmolStr::new_inline(Self::PASS))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub filter_level: FilterLevel,
    #[serde(default)]
    pub run_id_to_tree_state: IndexMap<String, Value>,
    #[serde(default, rename = "runIdLRU")]
    pub run_id_lru: Vec<String>,
}

impl PersistedState {
    /// Decode host-provided state, keeping every field that parses and
    /// defaulting the rest, then repair the map/LRU pairing.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut state = match serde_json::from_value::<PersistedState>(value.clone()) {
            Ok(state) => state,
            Err(err) => {
                debug!("Falling back to per-field view state decoding: {err}");
                Self::from_fields(&value)
            }
        };
        state.normalize();
        state
    }

    fn from_fields(value: &Value) -> Self {
        fn field<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
            value
                .get(key)
                .cloned()
                .and_then(|raw| serde_json::from_value(raw).ok())
                .unwrap_or_default()
        }
        Self {
            filter_level: field(value, "filterLevel"),
            run_id_to_tree_state: field(value, "runIdToTreeState"),
            run_id_lru: field(value, "runIdLRU"),
        }
    }

    /// Saved tree state for `run_id`; placeholders for runs never saved read as `None`.
    #[must_use]
    pub fn tree_state(&self, run_id: &str) -> Option<&Value> {
        self.run_id_to_tree_state
            .get(run_id)
            .filter(|state| !state.is_null())
    }

    /// Move `run_id` to the most-recently-used slot, inserting it if absent.
    pub fn touch(&mut self, run_id: &str) {
        if let Some(index) = self.run_id_lru.iter().position(|id| id == run_id) {
            let id = self.run_id_lru.remove(index);
            self.run_id_lru.insert(0, id);
        } else {
            self.run_id_lru.insert(0, run_id.to_string());
        }
        self.run_id_to_tree_state
            .entry(run_id.to_string())
            .or_insert(Value::Null);
    }

    /// Evict least-recently-used runs beyond `capacity`, never `active`.
    /// Returns the evicted ids, oldest first.
    pub fn enforce_capacity(&mut self, capacity: usize, active: Option<&str>) -> Vec<String> {
        let capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.run_id_lru.len() > capacity {
            let Some(index) = self
                .run_id_lru
                .iter()
                .rposition(|id| Some(id.as_str()) != active)
            else {
                break;
            };
            let id = self.run_id_lru.remove(index);
            self.run_id_to_tree_state.shift_remove(&id);
            evicted.push(id);
        }
        evicted
    }

    /// Restore the one-to-one pairing between the LRU list and the map:
    /// duplicates and ids without an entry leave the list, entries missing
    /// from the list are appended as least recent.
    pub fn normalize(&mut self) {
        let mut seen = IndexSet::with_capacity(self.run_id_lru.len());
        for id in self.run_id_lru.drain(..) {
            if self.run_id_to_tree_state.contains_key(&id) {
                seen.insert(id);
            }
        }
        for id in self.run_id_to_tree_state.keys() {
            if !seen.contains(id) {
                seen.insert(id.clone());
            }
        }
        self.run_id_lru = seen.into_iter().collect();
    }

    /// Whether every LRU id has a map entry and vice versa, without duplicates.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let unique: IndexSet<&String> = self.run_id_lru.iter().collect();
        unique.len() == self.run_id_lru.len()
            && unique.len() == self.run_id_to_tree_state.len()
            && unique
                .iter()
                .all(|id| self.run_id_to_tree_state.contains_key(*id))
    }
}

/// Reads and writes [`PersistedState`] through the host, or keeps it in
/// memory when standalone.
#[derive(Debug)]
pub struct StateStore {
    memory: PersistedState,
    capacity: usize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY)
    }
}

impl StateStore {
    /// `capacity` bounds the number of runs retained; clamped to at least one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            memory: PersistedState::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, host: &mut dyn HostTransport) -> PersistedState {
        if !host.is_hosted() {
            return self.memory.clone();
        }
        match host.get_state() {
            Some(value) => PersistedState::from_value(value),
            None => self.memory.clone(),
        }
    }

    /// Store `state` in its repaired form, so a later `get` returns the
    /// same value whether or not a host is bound.
    pub fn set(&mut self, host: &mut dyn HostTransport, mut state: PersistedState) {
        state.normalize();
        if !host.is_hosted() {
            self.memory = state;
            return;
        }
        let value = match serde_json::to_value(&state) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to encode view state: {err}");
                return;
            }
        };
        if let Err(err) = host.set_state(&value) {
            warn!("Failed to persist view state: {err}");
        }
    }

    /// Mark `run_id` most recently used and apply the capacity bound.
    /// Returns evicted run ids.
    pub fn activate_run(&mut self, host: &mut dyn HostTransport, run_id: &str) -> Vec<String> {
        let mut state = self.get(host);
        state.touch(run_id);
        let evicted = state.enforce_capacity(self.capacity, Some(run_id));
        if !evicted.is_empty() {
            debug!(?evicted, active = run_id, "evicted run tree states");
        }
        self.set(host, state);
        evicted
    }

    /// Record the tree state of `run_id`.
    pub fn save_tree_state(&mut self, host: &mut dyn HostTransport, run_id: &str, tree: Value) {
        let mut state = self.get(host);
        state.touch(run_id);
        state.run_id_to_tree_state.insert(run_id.to_string(), tree);
        state.enforce_capacity(self.capacity, Some(run_id));
        self.set(host, state);
    }

    pub fn tree_state(&self, host: &mut dyn HostTransport, run_id: &str) -> Option<Value> {
        self.get(host).tree_state(run_id).cloned()
    }

    pub fn filter_level(&self, host: &mut dyn HostTransport) -> FilterLevel {
        self.get(host).filter_level
    }

    pub fn set_filter_level(&mut self, host: &mut dyn HostTransport, level: FilterLevel) {
        let mut state = self.get(host);
        state.filter_level = level;
        self.set(host, state);
    }

    /// Re-read the state and write back its repaired form; used at startup.
    pub fn load(&mut self, host: &mut dyn HostTransport) -> PersistedState {
        let mut state = self.get(host);
        state.enforce_capacity(self.capacity, state.run_id_lru.first().cloned().as_deref());
        debug_assert!(state.is_consistent(), "repaired state keeps LRU and map paired");
        self.set(host, state.clone());
        state
    }
}
