use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use outview_bridge::transport::ProtocolLog;
use outview_bridge::{
    HostStorage, JournalTree, StandaloneTransport, StreamTransport, ViewConfig, ViewContext,
};

/// Bridge between a host process and the run-output tree view.
#[derive(Debug, Parser)]
#[command(name = "outview-bridge", version)]
struct Cli {
    /// Directory searched for `outview.toml`.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Explicit config file (overrides discovery under --root).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run without a host: no messages are written, state stays in memory.
    #[arg(long)]
    standalone: bool,
    /// Persist view state to this JSON file.
    #[arg(long)]
    state_file: Option<PathBuf>,
    /// Number of runs whose tree state is retained.
    #[arg(long)]
    lru_capacity: Option<usize>,
    /// Write a `<-`/`->` transcript of every message.
    #[arg(long)]
    protocol_log: Option<PathBuf>,
}

impl Cli {
    fn resolve_config(&self) -> ViewConfig {
        let mut config = match &self.config {
            Some(path) => ViewConfig::load_file(&self.root, path)
                .unwrap_or_else(|| ViewConfig::load(&self.root)),
            None => ViewConfig::load(&self.root),
        };
        if let Some(path) = &self.state_file {
            config.state.state_file = Some(path.clone());
        }
        if let Some(capacity) = self.lru_capacity {
            config.state.lru_capacity = capacity.max(1);
        }
        if let Some(path) = &self.protocol_log {
            config.protocol.log_path = Some(path.clone());
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config();
    if let Some(path) = &config.config_path {
        info!("Using config {}", path.display());
    }

    let protocol_log = config
        .protocol
        .log_path
        .as_deref()
        .map(|path| {
            ProtocolLog::open(path)
                .with_context(|| format!("failed to open protocol log {}", path.display()))
        })
        .transpose()?;

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    if cli.standalone {
        info!("Starting outview-bridge (standalone)");
        let mut view = ViewContext::new(StandaloneTransport, JournalTree::new(), &config)
            .with_protocol_log(protocol_log);
        view.init();
        let result = view.run(&mut reader);
        view.teardown();
        return result.context("reading host messages");
    }

    let storage = match &config.state.state_file {
        Some(path) => HostStorage::File(path.clone()),
        None => HostStorage::default(),
    };
    let transport =
        StreamTransport::new(io::stdout(), storage).with_protocol_log(protocol_log.clone());
    info!("Starting outview-bridge");
    let mut view =
        ViewContext::new(transport, JournalTree::new(), &config).with_protocol_log(protocol_log);
    view.init();
    let result = view.run(&mut reader);
    view.teardown();
    result.context("reading host messages")
}
