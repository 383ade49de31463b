//! In-memory, two-level content index: website name -> asset hash -> bytes.
//!
//! Reloads replace the whole snapshot under one lock acquisition rather than mutating
//! entries in place, so a reader never observes a half-populated store.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

/// A single, immutable point-in-time view of the content directory.
pub type ContentSnapshot = HashMap<String, HashMap<String, Bytes>>;

/// Shared, swappable handle to the current content snapshot.
#[derive(Debug, Clone)]
pub struct ContentStore {
    inner: Arc<Mutex<Arc<ContentSnapshot>>>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arc::new(HashMap::new()))),
        }
    }

    /// Looks up a single asset. The asset name is matched case-insensitively since asset
    /// names are hex digests and the original node mixes case when referring to them.
    pub async fn get(&self, website: &str, asset: &str) -> Option<Bytes> {
        let snapshot = self.inner.lock().await.clone();
        let asset = asset.to_uppercase();
        snapshot.get(website)?.get(&asset).cloned()
    }

    /// Flattens the current snapshot into `"website/asset"` entries. The returned list is
    /// consistent with a single snapshot generation, never a mix of two.
    pub async fn inventory(&self) -> Vec<String> {
        let snapshot = self.inner.lock().await.clone();
        snapshot
            .iter()
            .flat_map(|(website, assets)| {
                assets
                    .keys()
                    .map(move |asset| format!("{website}/{asset}"))
            })
            .collect()
    }

    /// Atomically swaps in a freshly loaded snapshot. The critical section is only a
    /// pointer assignment; no I/O happens while the lock is held.
    pub async fn replace(&self, new_store: ContentSnapshot) {
        let mut guard = self.inner.lock().await;
        *guard = Arc::new(new_store);
    }
}
