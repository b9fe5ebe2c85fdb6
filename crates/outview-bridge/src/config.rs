//! Bridge configuration loaded from `outview.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::state::DEFAULT_LRU_CAPACITY;

pub const CONFIG_FILES: &[&str] = &["outview.toml", ".outview.toml"];

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
    /// Directory relative paths are resolved against.
    pub root: PathBuf,
    /// Config file path (if found).
    pub config_path: Option<PathBuf>,
    pub state: StateConfig,
    pub requests: RequestConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    /// Maximum number of runs whose tree state is retained (at least 1).
    pub lru_capacity: usize,
    /// Host storage file used by the stream host; `None` keeps state in memory.
    pub state_file: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            lru_capacity: DEFAULT_LRU_CAPACITY,
            state_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Per-request deadline in milliseconds; 0 disables it.
    pub timeout_ms: u64,
    pub max_in_flight: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl RequestConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Transcript of every message in and out.
    pub log_path: Option<PathBuf>,
    /// Answer handled host requests with a response.
    pub acknowledge_requests: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            acknowledge_requests: true,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self::base(Path::new("."), None)
    }
}

impl ViewConfig {
    /// Load configuration for `root`, falling back to defaults.
    pub fn load(root: &Path) -> Self {
        let config_path = find_config_file(root);
        let Some(path) = config_path.clone() else {
            return Self::base(root, None);
        };
        Self::load_file(root, &path).unwrap_or_else(|| Self::base(root, config_path))
    }

    /// Load an explicit config file; `None` when it cannot be read.
    pub fn load_file(root: &Path, path: &Path) -> Option<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Some(Self::from_contents(
                root,
                Some(path.to_path_buf()),
                &contents,
            )),
            Err(err) => {
                warn!("Failed to read outview config at {}: {err}", path.display());
                None
            }
        }
    }

    pub fn from_contents(root: &Path, config_path: Option<PathBuf>, contents: &str) -> Self {
        let mut config = Self::base(root, config_path);
        let parsed: ConfigFile = match toml::from_str(contents) {
            Ok(parsed) => parsed,
            Err(err) => {
                if let Some(path) = &config.config_path {
                    warn!("Failed to parse outview config at {}: {err}", path.display());
                } else {
                    warn!("Failed to parse outview config: {err}");
                }
                return config;
            }
        };

        if let Some(capacity) = parsed.state.lru_capacity {
            config.state.lru_capacity = capacity.max(1);
        }
        config.state.state_file = parsed
            .state
            .state_file
            .map(|path| resolve_path(root, &path));
        if let Some(timeout_ms) = parsed.requests.timeout_ms {
            config.requests.timeout_ms = timeout_ms;
        }
        if let Some(max_in_flight) = parsed.requests.max_in_flight {
            config.requests.max_in_flight = max_in_flight.max(1);
        }
        config.protocol.log_path = parsed
            .protocol
            .log_path
            .map(|path| resolve_path(root, &path));
        if let Some(acknowledge) = parsed.protocol.acknowledge_requests {
            config.protocol.acknowledge_requests = acknowledge;
        }
        config
    }

    fn base(root: &Path, config_path: Option<PathBuf>) -> Self {
        Self {
            root: root.to_path_buf(),
            config_path,
            state: StateConfig::default(),
            requests: RequestConfig::default(),
            protocol: ProtocolConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    state: StateSection,
    #[serde(default)]
    requests: RequestSection,
    #[serde(default)]
    protocol: ProtocolSection,
}

#[derive(Debug, Default, Deserialize)]
struct StateSection {
    lru_capacity: Option<usize>,
    state_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestSection {
    timeout_ms: Option<u64>,
    max_in_flight: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ProtocolSection {
    log_path: Option<String>,
    acknowledge_requests: Option<bool>,
}

fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

pub(crate) fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
