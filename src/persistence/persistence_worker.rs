use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc::{channel, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::{AppConfig, ConfigStore};

// Actions for the persistence worker
#[derive(Debug)]
pub enum ConfigAction {
    Save(AppConfig),
    Flush {
        response_tx: oneshot::Sender<Result<()>>,
    },
}

/// Background writer for the config file.
///
/// Saves are fire-and-forget from the UI thread. When several saves are queued
/// only the newest one is written.
pub struct PersistenceManager {
    tx: Sender<ConfigAction>,
    worker_handle: tokio::task::JoinHandle<()>,
}

impl PersistenceManager {
    pub fn new(store: ConfigStore) -> Self {
        let (tx, mut rx) = channel::<ConfigAction>(32);
        info!("Persistence worker writing to {}", store.path().display());

        let worker_handle = tokio::spawn(async move {
            let mut pending: Option<AppConfig> = None;
            while let Some(action) = rx.recv().await {
                match action {
                    ConfigAction::Save(config) => {
                        pending = Some(config);
                        // Coalesce whatever else is already queued
                        while let Ok(next) = rx.try_recv() {
                            match next {
                                ConfigAction::Save(config) => pending = Some(config),
                                ConfigAction::Flush { response_tx } => {
                                    let result = write_pending(&store, &mut pending).await;
                                    if response_tx.send(result).is_err() {
                                        error!("Failed to send flush response");
                                    }
                                }
                            }
                        }
                        if let Err(e) = write_pending(&store, &mut pending).await {
                            error!("Failed to save config: {}", e);
                        }
                    }
                    ConfigAction::Flush { response_tx } => {
                        let result = write_pending(&store, &mut pending).await;
                        if response_tx.send(result).is_err() {
                            error!("Failed to send flush response");
                        }
                    }
                }
            }
            debug!("Persistence worker stopped");
        });

        Self { tx, worker_handle }
    }

    pub fn get_sender(&self) -> Sender<ConfigAction> {
        self.tx.clone()
    }

    /// Waits until every queued save is on disk
    pub async fn flush(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ConfigAction::Flush { response_tx })
            .await
            .map_err(|e| eyre!("Persistence worker gone: {}", e))?;
        response_rx
            .await
            .map_err(|e| eyre!("Persistence worker dropped flush: {}", e))?
    }

    /// Flushes pending saves and stops the worker, even if senders are still around
    pub async fn shutdown(self) -> Result<()> {
        let flushed = self.flush().await;
        self.worker_handle.abort();
        info!("Persistence worker shut down");
        flushed
    }
}

async fn write_pending(store: &ConfigStore, pending: &mut Option<AppConfig>) -> Result<()> {
    match pending.take() {
        Some(config) => store.save(&config).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::DisplayMode;

    #[tokio::test]
    async fn latest_save_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("config.toml"));
        let manager = PersistenceManager::new(store.clone());
        let tx = manager.get_sender();

        for scale in [50, 75, 125] {
            tx.try_send(ConfigAction::Save(AppConfig {
                scale,
                ..AppConfig::default()
            }))
            .unwrap();
        }
        tx.try_send(ConfigAction::Save(AppConfig {
            scale: 150,
            display_mode: DisplayMode::Keyboard,
            ..AppConfig::default()
        }))
        .unwrap();
        manager.shutdown().await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.scale, 150);
        assert_eq!(loaded.display_mode, DisplayMode::Keyboard);
    }

    #[tokio::test]
    async fn flush_without_saves_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let manager = PersistenceManager::new(ConfigStore::at(&path));

        manager.flush().await.unwrap();
        assert!(!path.exists());
    }
}
