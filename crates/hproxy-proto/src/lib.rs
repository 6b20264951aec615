//! Wire types shared between the hasher and the proxy.
//!
//! Everything here is pure data — no I/O, no async. [`chunk`] and
//! [`header`] describe the content-addressed chunk model and the ordered
//! header collection; [`request`] describes what a hasher client sends;
//! [`response`] describes the header the hasher resolves before its first
//! chunk; [`wire`] describes how a [`response::Header`] and a stream of
//! [`chunk::Chunk`]s are serialized back-to-back over one HTTP body.

mod chunk;
mod header;
mod request;
mod response;
pub mod wire;

pub use chunk::Chunk;
pub use header::{Header as HeaderEntry, HeaderMap};
pub use request::{HasherRequest, Request};
pub use response::Header;
