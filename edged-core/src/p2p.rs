//! Client for the control daemon's membership and signed-message protocol.
//!
//! This is close to a direct port of the original `gladius-edged` p2p handler: join once
//! (retrying forever on a flat interval rather than recursing), heartbeat forever, discover
//! and propagate our public IP when it changes, and leave on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::EdgedConfig;
use crate::error::P2pError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const JOIN_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// A single value to be advertised under a signed field. `disk_content` always serializes
/// as a JSON array, even for zero or one entries; every other field is a single string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    success: bool,
    response: serde_json::Value,
}

/// Client for the control daemon's `/api/p2p` membership surface.
#[derive(Debug, Clone)]
pub struct P2pClient {
    config: Arc<EdgedConfig>,
    http: Client,
    joined: Arc<AtomicBool>,
    join_notify: Arc<Notify>,
    last_advertised_ip: Arc<Mutex<String>>,
}

impl P2pClient {
    pub fn new(config: Arc<EdgedConfig>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client with static configuration must build");

        Self {
            config,
            http,
            joined: Arc::new(AtomicBool::new(false)),
            join_notify: Arc::new(Notify::new()),
            last_advertised_ip: Arc::new(Mutex::new(String::new())),
        }
    }

    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }

    /// Resolves once join has completed. Calls made after join already completed return
    /// immediately without awaiting anything.
    pub async fn wait_joined(&self) {
        if self.is_joined() {
            return;
        }
        let notified = self.join_notify.notified();
        if self.is_joined() {
            return;
        }
        notified.await;
    }

    fn mark_joined(&self) {
        if self
            .joined
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.join_notify.notify_waiters();
        }
    }

    /// Joins the overlay, retrying every [`JOIN_RETRY_INTERVAL`] until the control daemon
    /// accepts us (flattened from the original's recursive retry goroutine into a loop).
    /// Always spawns the heartbeat loop once joined, or immediately when auto-join is
    /// disabled (matching the original, which still heartbeats a manually-joined node).
    pub async fn connect(self: Arc<Self>) {
        if !self.config.disable_auto_join {
            loop {
                match self.post_join().await {
                    Ok(true) => break,
                    Ok(false) => {
                        warn!("control daemon rejected network join, retrying");
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to reach control daemon to join, retrying");
                    }
                }
                tokio::time::sleep(JOIN_RETRY_INTERVAL).await;
            }
        }
        self.mark_joined();

        let heartbeat_self = Arc::clone(&self);
        tokio::spawn(async move { heartbeat_self.heartbeat_loop().await });
    }

    async fn post_join(&self) -> Result<bool, P2pError> {
        let url = format!("{}/network/join", self.config.control_p2p_base());
        let ip = format!(
            "{}:{}",
            self.config.p2p_seed_node_address, self.config.p2p_seed_node_port
        );
        let resp = self
            .http
            .post(url)
            .json(&json!({ "ip": ip }))
            .send()
            .await?
            .json::<SuccessResponse>()
            .await
            .unwrap_or(SuccessResponse { success: false });
        Ok(resp.success)
    }

    /// Leaves the overlay if we had joined. Best-effort: failures are logged, never returned.
    pub async fn leave_if_joined(&self) {
        if !self.is_joined() {
            return;
        }
        let url = format!("{}/network/leave", self.config.control_p2p_base());
        if let Err(err) = self.http.post(url).send().await {
            debug!(error = %err, "failed to notify control daemon of network leave");
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;

            if !self.config.disable_heartbeat {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                if let Err(err) = self
                    .update_field("heartbeat", Value::String(now.to_string()))
                    .await
                {
                    warn!(error = %err, "heartbeat update failed");
                }
            }

            if !self.config.disable_ip_discovery {
                self.discover_and_advertise_ip().await;
            }
        }
    }

    async fn discover_and_advertise_ip(&self) {
        let ip = match self.resolve_public_ip().await {
            Ok(ip) => ip,
            Err(err) => {
                warn!(error = %err, "failed to resolve public ip");
                return;
            }
        };
        if ip.is_empty() {
            return;
        }

        let mut last = self.last_advertised_ip.lock().await;
        if *last == ip {
            return;
        }

        let mut fields = HashMap::new();
        fields.insert("ip_address".to_string(), Value::String(ip.clone()));
        fields.insert(
            "content_port".to_string(),
            Value::String(self.config.content_port.to_string()),
        );
        match self.sign_and_push(fields).await {
            Ok(()) => *last = ip,
            Err(err) => warn!(error = %err, "failed to advertise ip change"),
        }
    }

    async fn resolve_public_ip(&self) -> Result<String, P2pError> {
        if let Some(override_ip) = &self.config.override_ip {
            return Ok(override_ip.clone());
        }
        let body = self
            .http
            .get("https://api.ipify.org")
            .send()
            .await?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }

    /// Advertises a single field, wrapping it as the appropriate [`Value`] variant
    /// (`disk_content` is always a list, everything else is a string).
    pub async fn update_field(&self, key: &str, value: Value) -> Result<(), P2pError> {
        let mut fields = HashMap::new();
        fields.insert(key.to_string(), value);
        self.sign_and_push(fields).await
    }

    pub async fn update_fields(&self, fields: HashMap<String, Value>) -> Result<(), P2pError> {
        if fields.is_empty() {
            return Err(P2pError::NoValue);
        }
        self.sign_and_push(fields).await
    }

    /// Asks the control daemon to sign `{"node": fields}`, then pushes the resulting opaque
    /// blob unmodified to the state-push endpoint.
    async fn sign_and_push(&self, fields: HashMap<String, Value>) -> Result<(), P2pError> {
        if fields.is_empty() {
            return Err(P2pError::NoValue);
        }

        let sign_url = format!("{}/message/sign", self.config.control_p2p_base());
        let sign_resp: SignResponse = self
            .http
            .post(sign_url)
            .json(&json!({ "message": { "node": fields } }))
            .send()
            .await?
            .json()
            .await?;

        if !sign_resp.success {
            return Err(P2pError::SignRejected);
        }

        let push_url = format!("{}/state/push_message", self.config.control_state_base());
        let push_resp: SuccessResponse = self
            .http
            .post(push_url)
            .json(&sign_resp.response)
            .send()
            .await?
            .json()
            .await?;

        if !push_resp.success {
            return Err(P2pError::PushRejected);
        }

        Ok(())
    }
}

/// Uniform random delay in `0..=9` seconds, used by the sync loop to avoid every edge node
/// hitting peers at the same instant.
pub fn jitter_delay() -> Duration {
    Duration::from_secs(rand::rng().random_range(0..=9))
}
