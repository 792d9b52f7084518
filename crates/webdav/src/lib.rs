mod client;
mod multistatus;
mod walk;

use async_trait::async_trait;
use bytes::Bytes;

pub use client::{WebDavClient, WebDavSettings, BROWSER_USER_AGENT};
pub use multistatus::parse_multistatus;
pub use walk::{has_extension, walk, WalkResult};

/// One entry of a remote directory listing. `path` is decoded, relative to
/// the base URL's path and has no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
}

#[derive(Debug)]
pub enum WebDavError {
    Http(reqwest::Error),
    Status { status: u16, url: String, body: String },
    InvalidRequest(String),
    Xml(String),
}

impl std::fmt::Display for WebDavError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebDavError::Http(err) => {
                if err.is_timeout() {
                    write!(f, "request timeout: {}", err)
                } else if err.is_redirect() {
                    write!(f, "too many redirects: {}", err)
                } else {
                    write!(f, "http error: {}", err)
                }
            }
            WebDavError::Status { status, url, body } => {
                write!(f, "unexpected status {} for {}: {}", status, url, body)
            }
            WebDavError::InvalidRequest(message) => write!(f, "invalid request: {}", message),
            WebDavError::Xml(message) => write!(f, "invalid multistatus: {}", message),
        }
    }
}

impl std::error::Error for WebDavError {}

impl From<reqwest::Error> for WebDavError {
    fn from(err: reqwest::Error) -> Self {
        WebDavError::Http(err)
    }
}

/// Read-only view of a remote file tree.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteFile>, WebDavError>;
    async fn fetch_file(&self, path: &str) -> Result<Bytes, WebDavError>;

    /// Checks that `root` can be listed.
    async fn probe(&self, root: &str) -> Result<(), WebDavError> {
        self.list_dir(root).await.map(|_| ())
    }
}
