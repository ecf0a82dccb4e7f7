use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a TOML file.
///
/// Uses `ArcSwap` for lock-free reads, providing high performance for
/// frequent configuration access in hot paths (the registry consults
/// `streams` on every `play()` call).
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    cache: Arc<ArcSwap<AppConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event, broadcast after every successful `set`/`update`.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    /// Load (or create, with defaults) the config file at `path`.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let config = Self::load_from_disk(path).await?;
        let cache = Arc::new(ArcSwap::from_pointee(config));
        let (change_tx, _) = broadcast::channel(16);

        Ok(Self {
            path: path.to_path_buf(),
            cache,
            change_tx,
        })
    }

    async fn load_from_disk(path: &Path) -> Result<AppConfig> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => toml::from_str(&contents).map_err(|e| AppError::Config(e.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let config = AppConfig::default();
                Self::save_to_disk(path, &config).await?;
                Ok(config)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save_to_disk(path: &Path, config: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(config).map_err(|e| AppError::Config(e.to_string()))?;
        tokio::fs::write(path, toml).await?;
        Ok(())
    }

    /// Current configuration, lock-free and zero-copy.
    pub fn get(&self) -> Arc<AppConfig> {
        self.cache.load_full()
    }

    /// Replace the whole configuration, persisting to disk first.
    pub async fn set(&self, config: AppConfig) -> Result<()> {
        Self::save_to_disk(&self.path, &config).await?;
        self.cache.store(Arc::new(config));
        let _ = self.change_tx.send(ConfigChange {
            key: "config".to_string(),
        });
        Ok(())
    }

    /// Read-modify-write update. Concurrent updates last-write-wins, which is
    /// acceptable for admin-API-driven changes.
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = (**self.cache.load()).clone();
        f(&mut config);
        self.set(config).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediahub.toml");

        let store = ConfigStore::new(&path).await.unwrap();
        assert!(path.exists());
        assert!(store.get().streams.is_empty());
    }

    #[tokio::test]
    async fn update_persists_across_store_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediahub.toml");

        let store = ConfigStore::new(&path).await.unwrap();
        store
            .update(|c| {
                c.api.listen = "0.0.0.0:1984".to_string();
            })
            .await
            .unwrap();

        let reloaded = ConfigStore::new(&path).await.unwrap();
        assert_eq!(reloaded.get().api.listen, "0.0.0.0:1984");
    }

    #[tokio::test]
    async fn subscribers_are_notified_on_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediahub.toml");
        let store = ConfigStore::new(&path).await.unwrap();
        let mut rx = store.subscribe();

        store.update(|c| c.log.level = "debug".to_string()).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "config");
    }
}
