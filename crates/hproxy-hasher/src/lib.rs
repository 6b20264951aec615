//! Origin retriever, fan-out buffer, and the hasher server/client pair.
//!
//! [`retriever::fetch`] pulls and chunks an origin response;
//! [`buffer::Buffer`] replays one fetch to any number of readers;
//! [`server`] exposes that over HTTP with inflight coalescing
//! ([`inflight::InflightTable`]); [`client::get_chunked`] is the proxy's
//! view of that HTTP endpoint.

mod buffer;
mod error;
mod inflight;
mod retriever;
mod server;
mod stream;

pub mod client;
pub mod connect;

pub use buffer::{Buffer, BufferReader};
pub use error::{ClientError, ClientResult, RetrieverError, RetrieverResult};
pub use inflight::{cancel_pair, InflightTable};
pub use retriever::fetch;
pub use server::{build_router, HasherState};
pub use stream::{ChunkEvent, ChunkStream};
