//! Populates a fresh [`ContentSnapshot`] from the content directory on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::content_store::{ContentSnapshot, ContentStore};
use crate::error::LoaderError;
use crate::p2p::{P2pClient, Value};

const ADVERTISE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Walks the content directory to depth two (`<website>/<asset>`), skipping anything whose
/// path contains the substring `temp`, and builds a brand new snapshot in memory.
#[derive(Debug, Clone)]
pub struct DiskLoader {
    content_directory: PathBuf,
    store: ContentStore,
    p2p: Arc<P2pClient>,
}

impl DiskLoader {
    pub fn new(content_directory: PathBuf, store: ContentStore, p2p: Arc<P2pClient>) -> Self {
        Self {
            content_directory,
            store,
            p2p,
        }
    }

    /// Rebuilds the snapshot from disk and swaps it into the [`ContentStore`]. Advertising
    /// the resulting inventory is handed off to a background task that waits for p2p join
    /// before publishing, so callers (including the initial load at startup) never block on
    /// join completion here — only the fatal, disk-level error is propagated.
    pub async fn reload(&self) -> Result<(), LoaderError> {
        let snapshot = self.scan().await?;
        self.store.replace(snapshot).await;
        self.spawn_advertise();
        Ok(())
    }

    /// Waits for p2p join, then advertises the current inventory, retrying once after a
    /// short delay on failure.
    fn spawn_advertise(&self) {
        let store = self.store.clone();
        let p2p = self.p2p.clone();
        tokio::spawn(async move {
            p2p.wait_joined().await;
            let inventory = store.inventory().await;
            if let Err(err) = p2p
                .update_field("disk_content", Value::List(inventory.clone()))
                .await
            {
                warn!(error = %err, "failed to advertise disk content, retrying once");
                tokio::time::sleep(ADVERTISE_RETRY_DELAY).await;
                if let Err(err) = p2p
                    .update_field("disk_content", Value::List(inventory))
                    .await
                {
                    warn!(error = %err, "failed to advertise disk content after retry, giving up");
                }
            }
        });
    }

    async fn scan(&self) -> Result<ContentSnapshot, LoaderError> {
        let mut snapshot = ContentSnapshot::new();

        let mut websites = tokio::fs::read_dir(&self.content_directory).await?;
        while let Some(website_entry) = websites.next_entry().await? {
            let website_path = website_entry.path();
            if is_temp_path(&website_path) {
                continue;
            }
            let file_type = match website_entry.file_type().await {
                Ok(ft) => ft,
                Err(err) => {
                    warn!(path = %website_path.display(), error = %err, "failed to stat entry, skipping");
                    continue;
                }
            };
            if !file_type.is_dir() {
                continue;
            }

            let website_name = website_entry.file_name().to_string_lossy().into_owned();
            let mut assets = std::collections::HashMap::new();

            let mut asset_entries = match tokio::fs::read_dir(&website_path).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %website_path.display(), error = %err, "failed to read website directory, skipping");
                    continue;
                }
            };

            while let Some(asset_entry) = asset_entries.next_entry().await? {
                let asset_path = asset_entry.path();
                if is_temp_path(&asset_path) {
                    continue;
                }
                match asset_entry.file_type().await {
                    Ok(ft) if ft.is_file() => {}
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(path = %asset_path.display(), error = %err, "failed to stat asset, skipping");
                        continue;
                    }
                }

                match tokio::fs::read(&asset_path).await {
                    Ok(bytes) => {
                        let asset_name =
                            asset_entry.file_name().to_string_lossy().to_uppercase();
                        assets.insert(asset_name, bytes::Bytes::from(bytes));
                    }
                    Err(err) => {
                        warn!(path = %asset_path.display(), error = %err, "failed to read asset, skipping");
                    }
                }
            }

            snapshot.insert(website_name, assets);
        }

        Ok(snapshot)
    }
}

fn is_temp_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("temp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgedConfig;

    fn test_config(content_directory: PathBuf) -> Arc<EdgedConfig> {
        Arc::new(EdgedConfig {
            content_directory,
            content_port: 8080,
            control_protocol: "http".to_string(),
            control_hostname: "localhost".to_string(),
            control_port: 3001,
            p2p_seed_node_address: "127.0.0.1".to_string(),
            p2p_seed_node_port: 7947,
            override_ip: None,
            disable_auto_join: true,
            disable_heartbeat: true,
            disable_ip_discovery: true,
            log_level: "info".to_string(),
            log_pretty: false,
            tls_cert_path: None,
            tls_key_path: None,
        })
    }

    #[tokio::test]
    async fn reload_populates_store_and_skips_temp_entries() {
        let dir = tempfile::tempdir().unwrap();
        let website_dir = dir.path().join("example.com");
        tokio::fs::create_dir_all(&website_dir).await.unwrap();
        tokio::fs::write(website_dir.join("DEADBEEF"), b"hello")
            .await
            .unwrap();
        tokio::fs::write(website_dir.join("partial_temp"), b"ignore me")
            .await
            .unwrap();

        let store = ContentStore::new();
        let p2p = Arc::new(P2pClient::new(test_config(dir.path().to_path_buf())));
        p2p.clone().connect().await;
        let loader = DiskLoader::new(dir.path().to_path_buf(), store.clone(), p2p);

        loader.reload().await.expect("reload should succeed");

        assert_eq!(
            store.get("example.com", "DEADBEEF").await,
            Some(bytes::Bytes::from_static(b"hello"))
        );
        let inventory = store.inventory().await;
        assert_eq!(inventory.len(), 1);
    }
}
