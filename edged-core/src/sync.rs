//! Periodically reconciles the local content store against the fleet-wide desired
//! inventory, fetching missing assets from peers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::config::EdgedConfig;
use crate::content_store::ContentStore;
use crate::downloader::Downloader;
use crate::p2p::{jitter_delay, P2pClient};

const LOOP_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct ContentDiffResponse {
    response: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ContentLinksResponse {
    response: HashMap<String, Vec<String>>,
}

/// Owns the periodic diff/fetch cycle. Runs forever in its own task; never exits on error.
pub struct SyncLoop {
    config: Arc<EdgedConfig>,
    store: ContentStore,
    p2p: Arc<P2pClient>,
    downloader: Downloader,
    http: Client,
}

impl SyncLoop {
    pub fn new(config: Arc<EdgedConfig>, store: ContentStore, p2p: Arc<P2pClient>) -> Self {
        Self {
            config,
            store,
            p2p,
            downloader: Downloader::new(),
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client with static configuration must build"),
        }
    }

    /// Spawns the loop as a background task.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            self.p2p.wait_joined().await;
            loop {
                tokio::time::sleep(LOOP_DELAY).await;
                self.run_once().await;
            }
        });
    }

    async fn run_once(&self) {
        let inventory = self.store.inventory().await;

        let needed = match self.fetch_content_diff(&inventory).await {
            Ok(needed) => needed,
            Err(err) => {
                warn!(error = %err, "failed to fetch content diff from control daemon");
                return;
            }
        };

        if needed.is_empty() {
            return;
        }

        tokio::time::sleep(jitter_delay()).await;

        let links = match self.fetch_content_links(&needed).await {
            Ok(links) => links,
            Err(err) => {
                warn!(error = %err, "failed to fetch content links from control daemon");
                return;
            }
        };

        for asset_name in needed {
            let Some(candidates) = links.get(&asset_name) else {
                continue;
            };
            let Some(url) = candidates.choose(&mut rand::rng()) else {
                continue;
            };

            let Some(dest) = self.destination_for(&asset_name) else {
                warn!(asset = %asset_name, "needed asset name has unexpected shape, skipping");
                continue;
            };
            let Some(expected_hash) = asset_name.rsplit('/').next() else {
                continue;
            };

            if let Err(err) = self.downloader.download(&dest, url, expected_hash).await {
                warn!(asset = %asset_name, error = %err, "download failed");
            }
        }
    }

    fn destination_for(&self, asset_name: &str) -> Option<PathBuf> {
        let mut path = self.config.content_directory.clone();
        let segments: Vec<&str> = asset_name.split('/').collect();
        if segments.len() < 2 {
            return None;
        }
        for segment in segments {
            path.push(segment);
        }
        Some(path)
    }

    async fn fetch_content_diff(&self, inventory: &[String]) -> reqwest::Result<Vec<String>> {
        let url = format!(
            "{}/p2p/state/content_diff",
            self.config.control_state_base()
        );
        let resp: ContentDiffResponse = self
            .http
            .post(url)
            .json(&json!({ "content": inventory }))
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.response)
    }

    async fn fetch_content_links(
        &self,
        needed: &[String],
    ) -> reqwest::Result<HashMap<String, Vec<String>>> {
        let url = format!(
            "{}/p2p/state/content_links",
            self.config.control_state_base()
        );
        let resp: ContentLinksResponse = self
            .http
            .post(url)
            .json(&json!({ "content": needed }))
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgedConfig;

    fn test_config(content_directory: PathBuf, base: &str) -> Arc<EdgedConfig> {
        let rest = base.strip_prefix("http://").unwrap();
        let (host, port) = rest.split_once(':').unwrap();
        Arc::new(EdgedConfig {
            content_directory,
            content_port: 8080,
            control_protocol: "http".to_string(),
            control_hostname: host.to_string(),
            control_port: port.parse().unwrap(),
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

    #[test]
    fn destination_for_joins_website_and_hash() {
        let config = Arc::new(EdgedConfig {
            content_directory: PathBuf::from("/content"),
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
        });
        let store = ContentStore::new();
        let p2p = Arc::new(P2pClient::new(config.clone()));
        let sync = SyncLoop::new(config, store, p2p);

        assert_eq!(
            sync.destination_for("example.com/DEADBEEF"),
            Some(PathBuf::from("/content/example.com/DEADBEEF"))
        );
        assert_eq!(sync.destination_for("malformed"), None);
    }

    #[tokio::test]
    async fn run_once_downloads_needed_assets_from_chosen_peer() {
        use sha2::Digest;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let control = MockServer::start().await;
        let peer = MockServer::start().await;
        let asset_body = b"peer asset contents";
        let expected_hash = hex::encode_upper(sha2::Sha256::digest(asset_body));
        let asset_name = format!("example.com/{expected_hash}");

        Mock::given(method("POST"))
            .and(path("/api/p2p/state/content_diff"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": [asset_name] })),
            )
            .mount(&control)
            .await;

        let mut links_map = HashMap::new();
        links_map.insert(asset_name.clone(), vec![format!("{}/asset", peer.uri())]);
        Mock::given(method("POST"))
            .and(path("/api/p2p/state/content_links"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": links_map })),
            )
            .mount(&control)
            .await;

        Mock::given(method("GET"))
            .and(path("/asset"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(asset_body.to_vec()))
            .mount(&peer)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf(), &control.uri());
        let store = ContentStore::new();
        let p2p = Arc::new(P2pClient::new(config.clone()));
        let sync = SyncLoop::new(config, store, p2p);

        sync.run_once().await;

        let written = tokio::fs::read(dir.path().join("example.com").join(&expected_hash))
            .await
            .unwrap();
        assert_eq!(written, asset_body);
    }
}
