use hproxy_proto::{Chunk, Header};
use tokio::sync::mpsc;

/// One event published while a response body is being chunked.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    Chunk(Chunk),
    /// Terminal event. `Some(msg)` if chunking failed or was cancelled
    /// partway through; `None` on a clean end-of-body.
    Done(Option<String>),
}

/// A resolved [`Header`] plus the chunk events that follow it.
///
/// The header is always available synchronously (it comes from the
/// first origin/hasher response line); the chunks trickle in as the
/// body is read and split.
pub struct ChunkStream {
    pub header: Header,
    rx: mpsc::Receiver<ChunkEvent>,
}

impl ChunkStream {
    pub fn new(header: Header, rx: mpsc::Receiver<ChunkEvent>) -> Self {
        Self { header, rx }
    }

    /// Receive the next event, or `None` once the terminal [`ChunkEvent::Done`]
    /// has already been observed.
    pub async fn next_event(&mut self) -> Option<ChunkEvent> {
        self.rx.recv().await
    }
}
