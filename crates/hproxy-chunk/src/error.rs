use thiserror::Error;

pub type ChunkResult<T> = Result<T, ChunkError>;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("read error while chunking: {0}")]
    Read(#[from] std::io::Error),
}
