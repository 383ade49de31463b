//! Core subsystems for `edged`: the content cache, disk/watch loaders, the peer downloader,
//! the sync loop, and the p2p membership client. The HTTP/TLS surface lives in the
//! `edged-server` binary crate, which wires these pieces together.

pub mod config;
pub mod content_store;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod p2p;
pub mod sync;
pub mod watcher;

pub use config::{load as load_config, Args, EdgedConfig};
pub use content_store::{ContentSnapshot, ContentStore};
pub use downloader::Downloader;
pub use loader::DiskLoader;
pub use p2p::{P2pClient, Value};
pub use sync::SyncLoop;
