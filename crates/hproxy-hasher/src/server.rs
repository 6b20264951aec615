//! Hasher HTTP server: an `axum::serve` listener whose single route
//! streams a header record, then chunk records, then a terminal record
//! carrying the error (if any).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use hproxy_proto::HasherRequest;
use tracing::{info, warn};

use crate::buffer::Buffer;
use crate::inflight::{cancel_pair, InflightTable};
use crate::retriever;

#[derive(Clone)]
pub struct HasherState {
    inflight: InflightTable,
}

impl HasherState {
    pub fn new() -> Self {
        Self {
            inflight: InflightTable::new(),
        }
    }
}

impl Default for HasherState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_router(state: HasherState) -> Router {
    Router::new()
        .route("/", post(handle_request))
        .with_state(Arc::new(state))
}

async fn handle_request(
    State(state): State<Arc<HasherState>>,
    Json(req): Json<HasherRequest>,
) -> Response {
    let key = req.inflight_key();

    // `get_or_try_init` holds the table's write lock only long enough to
    // claim (or find) this key's slot; the origin fetch itself runs
    // outside that lock, and any concurrent caller for the same key
    // awaits the same slot instead of starting a second fetch.
    let inflight_table = state.inflight.clone();
    let evict_key = key.clone();
    let fetch_outcome = state
        .inflight
        .get_or_try_init(&key, move || async move {
            let (cancel_tx, cancel_rx) = cancel_pair();
            match retriever::fetch(&req.request, &req.etag, cancel_rx).await {
                Ok(chunk_stream) => {
                    let table = inflight_table.clone();
                    let evict_key = evict_key.clone();
                    let buffer = Buffer::new(chunk_stream, cancel_tx).with_on_idle(move || {
                        let table = table.clone();
                        let key = evict_key.clone();
                        tokio::spawn(async move { table.remove(&key).await });
                    });
                    Ok(Arc::new(buffer))
                }
                Err(e) => Err(e.to_string()),
            }
        })
        .await;

    match fetch_outcome {
        Ok(buffer) => {
            info!(key = %key, "hasher streaming inflight entry");
            stream_buffer(buffer).await
        }
        Err(e) => {
            warn!(key = %key, error = %e, "hasher fetch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

async fn stream_buffer(buffer: Arc<Buffer>) -> Response {
    let header = buffer.header().clone();
    let mut reader = buffer.new_reader().await;

    let body_stream = async_stream::stream! {
        let header_bytes = match serde_json::to_vec(&header) {
            Ok(b) => b,
            Err(e) => {
                yield Err::<Bytes, std::io::Error>(std::io::Error::new(std::io::ErrorKind::Other, e));
                return;
            }
        };
        yield Ok(Bytes::from(header_bytes));

        loop {
            match reader.next().await {
                Some(Ok(chunk)) => {
                    let record = hproxy_proto::wire::ChunkRecord::chunk(chunk);
                    match serde_json::to_vec(&record) {
                        Ok(bytes) => yield Ok(Bytes::from(bytes)),
                        Err(e) => {
                            yield Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                            return;
                        }
                    }
                }
                Some(Err(terminal_err)) => {
                    let record = hproxy_proto::wire::ChunkRecord::terminal(terminal_err);
                    if let Ok(bytes) = serde_json::to_vec(&record) {
                        yield Ok(Bytes::from(bytes));
                    }
                    return;
                }
                None => return,
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(body_stream))
        .expect("static response builder never fails")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_has_empty_inflight_table() {
        let _state = HasherState::new();
    }
}
