//! Client for the hasher HTTP server: POST the request, decode the
//! header eagerly, then decode the trailing chunk records as they
//! arrive.

use bytes::Bytes;
use http_body_util::Full;
use hproxy_proto::wire::{ChunkRecord, JsonRecordReader};
use hproxy_proto::{Header, HasherRequest};
use tokio::sync::{mpsc, watch};

use crate::connect::{connect, split_authority};
use crate::error::{ClientError, ClientResult};
use crate::stream::{ChunkEvent, ChunkStream};

const CHUNK_EVENT_BUFFER: usize = 20;

/// POSTs `req` to the hasher at `hasher_addr` and returns a
/// [`ChunkStream`] whose header is already resolved.
pub async fn get_chunked(
    hasher_addr: &str,
    req: &HasherRequest,
    cancel: watch::Receiver<bool>,
) -> ClientResult<ChunkStream> {
    if *cancel.borrow() {
        return Err(ClientError::Cancelled);
    }

    let body = serde_json::to_vec(req)?;
    let (addr, host_header) = split_authority(hasher_addr);
    let mut sender = connect(&host_header, &addr).await.map_err(ClientError::Connect)?;

    let http_req = http::Request::builder()
        .method("POST")
        .uri("/")
        .header("host", &host_header)
        .header("content-type", "application/json")
        .body(Full::<Bytes>::new(Bytes::from(body)))?;

    let resp = sender.send_request(http_req).await?;
    if resp.status() != http::StatusCode::OK {
        return Err(ClientError::Status(resp.status()));
    }

    let mut body = resp.into_body();
    let mut json_reader = JsonRecordReader::new();

    let header = read_header(&mut body, &mut json_reader, &cancel).await?;

    let (tx, rx) = mpsc::channel(CHUNK_EVENT_BUFFER);
    tokio::spawn(relay_chunks(body, json_reader, tx, cancel));

    Ok(ChunkStream::new(header, rx))
}

async fn read_header(
    body: &mut hyper::body::Incoming,
    json_reader: &mut JsonRecordReader,
    cancel: &watch::Receiver<bool>,
) -> ClientResult<Header> {
    use http_body_util::BodyExt;

    loop {
        if let Some(header) = json_reader.next_value::<Header>().map_err(|_| ClientError::MalformedHeader)? {
            return Ok(header);
        }
        if *cancel.borrow() {
            return Err(ClientError::Cancelled);
        }
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    json_reader.feed(data);
                }
            }
            Some(Err(e)) => return Err(ClientError::Http(e)),
            None => return Err(ClientError::MalformedHeader),
        }
    }
}

async fn relay_chunks(
    mut body: hyper::body::Incoming,
    mut json_reader: JsonRecordReader,
    tx: mpsc::Sender<ChunkEvent>,
    mut cancel: watch::Receiver<bool>,
) {
    use http_body_util::BodyExt;

    loop {
        match json_reader.next_value::<ChunkRecord>() {
            Ok(Some(record)) => {
                if record.is_terminal() {
                    let _ = tx.send(ChunkEvent::Done(record.err)).await;
                    return;
                }
                let chunk = record.chunk.expect("non-terminal record always carries a chunk");
                tokio::select! {
                    res = tx.send(ChunkEvent::Chunk(chunk)) => {
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = cancel.changed() => {
                        let _ = tx.send(ChunkEvent::Done(Some("hashing cancelled".to_string()))).await;
                        return;
                    }
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(ChunkEvent::Done(Some(e.to_string()))).await;
                return;
            }
        }

        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    json_reader.feed(data);
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(ChunkEvent::Done(Some(e.to_string()))).await;
                return;
            }
            None => {
                let _ = tx.send(ChunkEvent::Done(Some("connection closed before trailer".to_string()))).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_record_terminal_detection() {
        let terminal = ChunkRecord::terminal(Some("boom".into()));
        assert!(terminal.is_terminal());
    }
}
