use thiserror::Error;

/// Errors raised while loading the content directory into memory.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("content directory is unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced from the filesystem watcher. These are always logged and
/// never terminate the watcher task.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watch subsystem error: {0}")]
    Notify(#[from] notify::Error),
}

/// Errors from a single peer download attempt.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("downloaded content hash did not match, expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// Errors from the signed-message / membership protocol spoken to the control daemon.
#[derive(Error, Debug)]
pub enum P2pError {
    #[error("control daemon rejected network join")]
    JoinRejected,

    #[error("control daemon refused to sign message, wallet could be locked")]
    SignRejected,

    #[error("control daemon rejected signed message push")]
    PushRejected,

    #[error("update_field/update_fields called with zero values")]
    NoValue,

    #[error("http error talking to control daemon: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors building the node's configuration snapshot.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("content directory not configured")]
    MissingContentDirectory,
}
