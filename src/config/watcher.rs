//! Configuration file watcher for hot reload.
//!
//! A single save usually produces several filesystem events (truncate, write,
//! metadata). The watcher fingerprints the file and only forwards a config
//! when the bytes actually differ from the last ones it saw.

use std::fs;
use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::EdgeConfig;

/// SHA-256 of the last config file contents considered for reload.
#[derive(Debug, Default)]
struct Fingerprint {
    last: Option<Vec<u8>>,
}

impl Fingerprint {
    fn of_file(path: &Path) -> Self {
        Self {
            last: fs::read(path).ok().map(|bytes| Sha256::digest(&bytes).to_vec()),
        }
    }

    /// Record `contents`; true when they differ from the previous record.
    fn update(&mut self, contents: &[u8]) -> bool {
        let digest = Sha256::digest(contents).to_vec();
        if self.last.as_ref() == Some(&digest) {
            return false;
        }
        self.last = Some(digest);
        true
    }
}

/// Monitors the configuration file and emits every changed config that parses and validates.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<EdgeConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<EdgeConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. The returned handle must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        // Seeded from disk so the first touch after startup is not a reload.
        let mut fingerprint = Fingerprint::of_file(&self.path);
        let path = self.path.clone();
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = ?e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                if let Some(config) = reload(&path, &mut fingerprint) {
                    if tx.send(config).is_err() {
                        tracing::warn!("Config update receiver dropped");
                    }
                }
            },
            Config::default(),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Re-read `path`, returning a validated config only when the contents changed.
fn reload(path: &Path, fingerprint: &mut Fingerprint) -> Option<EdgeConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Config file unreadable, keeping current configuration");
            return None;
        }
    };
    if !fingerprint.update(contents.as_bytes()) {
        tracing::debug!(path = ?path, "Config file event without content change");
        return None;
    }

    match parse_config(&contents) {
        Ok(config) => {
            tracing::info!(path = ?path, "Config file changed, reloading");
            Some(config)
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded config, keeping current configuration");
            None
        }
    }
}
