use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("blob absent from cache")]
    Absent,

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}
