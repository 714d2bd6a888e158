/// Core error type for the relay.
///
/// Adapter crates map their client errors into this type so the cascade can tell a
/// permission problem apart from a plain transport failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
