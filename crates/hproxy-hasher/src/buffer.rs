//! Replays one producer's chunk stream to any number of independent
//! consumers.
//!
//! A `tokio::sync::Mutex<BufferState>` guards a growing `Vec<Chunk>`,
//! paired with a `tokio::sync::Notify` that wakes every waiting reader
//! after each append. The last reader to drop before the source has
//! ended cancels the source.

use std::sync::Arc;

use hproxy_proto::{Chunk, Header};
use tokio::sync::{watch, Mutex, Notify};

use crate::stream::{ChunkEvent, ChunkStream};

struct BufferState {
    chunks: Vec<Chunk>,
    ended: bool,
    terminal_err: Option<String>,
    subscribers: usize,
}

/// Owns a single producer [`ChunkStream`] and lets many readers replay
/// it independently, each walking the shared `chunks` vector from its
/// own index.
pub struct Buffer {
    header: Header,
    state: Arc<Mutex<BufferState>>,
    notify: Arc<Notify>,
    source_cancel: watch::Sender<bool>,
    on_idle: Arc<dyn Fn() + Send + Sync>,
}

impl Buffer {
    /// Spawns a background task that drains `source` into the shared
    /// buffer. `source_cancel` is the same sender the source's own fetch
    /// was given — dropping the last reader flips it.
    pub fn new(mut source: ChunkStream, source_cancel: watch::Sender<bool>) -> Self {
        let header = source.header.clone();
        let state = Arc::new(Mutex::new(BufferState {
            chunks: Vec::new(),
            ended: false,
            terminal_err: None,
            subscribers: 0,
        }));
        let notify = Arc::new(Notify::new());

        let task_state = state.clone();
        let task_notify = notify.clone();
        tokio::spawn(async move {
            loop {
                match source.next_event().await {
                    Some(ChunkEvent::Chunk(chunk)) => {
                        task_state.lock().await.chunks.push(chunk);
                        task_notify.notify_waiters();
                    }
                    Some(ChunkEvent::Done(err)) | None => {
                        let mut st = task_state.lock().await;
                        st.ended = true;
                        st.terminal_err = err;
                        drop(st);
                        task_notify.notify_waiters();
                        break;
                    }
                }
            }
        });

        Self {
            header,
            state,
            notify,
            source_cancel,
            on_idle: Arc::new(|| {}),
        }
    }

    /// Attaches a callback invoked (possibly more than once) whenever the
    /// subscriber count returns to zero — used by the hasher server to
    /// evict this buffer's inflight-table entry once nobody is reading it.
    pub fn with_on_idle(mut self, on_idle: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_idle = Arc::new(on_idle);
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns a fresh reader that starts at chunk index 0 regardless of
    /// how far the underlying source has progressed.
    pub async fn new_reader(&self) -> BufferReader {
        self.state.lock().await.subscribers += 1;
        BufferReader {
            state: self.state.clone(),
            notify: self.notify.clone(),
            source_cancel: self.source_cancel.clone(),
            on_idle: self.on_idle.clone(),
            next_index: 0,
            finished: false,
        }
    }
}

/// One independent view over a [`Buffer`]'s replayed chunk stream.
pub struct BufferReader {
    state: Arc<Mutex<BufferState>>,
    notify: Arc<Notify>,
    source_cancel: watch::Sender<bool>,
    on_idle: Arc<dyn Fn() + Send + Sync>,
    next_index: usize,
    finished: bool,
}

impl BufferReader {
    /// Await the next chunk, or the terminal error (if any) once the
    /// source has ended and every buffered chunk has been delivered.
    pub async fn next(&mut self) -> Option<Result<Chunk, Option<String>>> {
        if self.finished {
            return None;
        }
        loop {
            {
                let state = self.state.lock().await;
                if self.next_index < state.chunks.len() {
                    let chunk = state.chunks[self.next_index].clone();
                    drop(state);
                    self.next_index += 1;
                    return Some(Ok(chunk));
                }
                if state.ended {
                    let err = state.terminal_err.clone();
                    drop(state);
                    self.finished = true;
                    return Some(Err(err));
                }
            }
            self.notify.notified().await;
        }
    }
}

impl Drop for BufferReader {
    fn drop(&mut self) {
        let state = self.state.clone();
        let source_cancel = self.source_cancel.clone();
        let on_idle = self.on_idle.clone();
        tokio::spawn(async move {
            let mut st = state.lock().await;
            if st.subscribers > 0 {
                st.subscribers -= 1;
            }
            let idle = st.subscribers == 0;
            let ended = st.ended;
            drop(st);
            // Last subscriber leaving while production is still running
            // stops wasted work; leaving after it ended just frees the
            // inflight-table slot via `on_idle` below.
            if idle && !ended {
                let _ = source_cancel.send(true);
            }
            if idle {
                on_idle();
            }
        });
    }
}
