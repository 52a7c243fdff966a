//! Policy file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by rename-and-replace are still picked up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::PolicyGateConfig;

/// Keeps the underlying watcher alive; dropping it stops reloads.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ConfigWatcher {
    /// Start watching `path`. Every change that loads and validates is sent
    /// on the returned channel; failures are logged and skipped.
    pub fn start(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PolicyGateConfig>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = path.to_path_buf();
        let file_name = path.file_name().map(|n| n.to_os_string());
        let target = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        reload(&target, &tx);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Policy watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Policy watcher started");
        Ok((
            Self {
                _watcher: watcher,
                path,
            },
            rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Load `path` and forward it. Returns whether a configuration was sent.
pub fn reload(path: &Path, tx: &mpsc::UnboundedSender<PolicyGateConfig>) -> bool {
    tracing::info!(path = %path.display(), "Policy file change detected, reloading");
    match load_config(path) {
        Ok(config) => tx.send(config).is_ok(),
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to reload policy file. Keeping current policy."
            );
            false
        }
    }
}
