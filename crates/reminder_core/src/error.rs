use thiserror::Error;

/// Failure reported by a host collaborator (block source, settings store, sinks).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host unavailable: {0}")]
    Unavailable(String),
    #[error("host rejected request: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("both block queries failed (content: {content}; property: {property})")]
    QueriesFailed { content: HostError, property: HostError },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("banner sink failed: {0}")]
    Banner(HostError),
    #[error("desktop notifier failed: {0}")]
    Desktop(HostError),
}
