//! Client error types.
//!
//! Every capability set in this crate reports failures through
//! [`ClientError`]. Decorators never construct one themselves; they only
//! observe the errors produced by the client they wrap.

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Error returned by the Kubernetes API or its transport.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    /// Failed to encode a request body.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to build a raw HTTP request.
    #[error("request error: {0}")]
    Request(#[from] http::Error),

    /// Group version string was empty or malformed.
    #[error("invalid group version: {0:?}")]
    InvalidGroupVersion(String),
}

impl ClientError {
    /// HTTP status code reported by the API server, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Kube(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }

    /// True when the API server answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}
