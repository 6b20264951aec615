use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("connecting to origin: {0}")]
    Connect(std::io::Error),

    #[error("origin request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("origin request rejected: {0}")]
    Request(#[from] http::Error),

    #[error("hasher request failed: {0}")]
    Hasher(#[from] hproxy_hasher::RetrieverError),

    #[error("hasher client error: {0}")]
    Client(#[from] hproxy_hasher::ClientError),

    #[error("cache error: {0}")]
    Cache(#[from] hproxy_cache::CacheError),

    #[error("request cannot be deduplicated: {0}")]
    Ineligible(&'static str),
}
