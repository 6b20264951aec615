use thiserror::Error;

pub type RetrieverResult<T> = Result<T, RetrieverError>;
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("connecting to origin: {0}")]
    Connect(std::io::Error),

    #[error("origin request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("origin request rejected: {0}")]
    Request(#[from] http::Error),

    #[error("origin response ETag {origin:?} does not match expected {expected:?}")]
    EntityChanged { expected: String, origin: Option<String> },

    #[error("hashing cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("encoding hasher request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("connecting to hasher: {0}")]
    Connect(std::io::Error),

    #[error("hasher request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("hasher request rejected: {0}")]
    Request(#[from] http::Error),

    #[error("hasher returned {0}")]
    Status(http::StatusCode),

    #[error("hasher sent a malformed header record")]
    MalformedHeader,

    #[error("hasher reported an error: {0}")]
    Remote(String),

    #[error("hashing cancelled")]
    Cancelled,
}
