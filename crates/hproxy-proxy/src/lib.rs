//! Eligibility check, direct-forward path, bounded-parallel reassembly,
//! and request/response sanitization for the dedup-aware proxy.

mod eligibility;
mod error;
mod forward;
mod reassemble;
mod sanitize;

pub use eligibility::{check as check_eligibility, Eligibility};
pub use error::{ProxyError, ProxyResult};
pub use forward::{forward, ForwardedResponse};
pub use reassemble::{reassemble, ReassembledBody};
pub use sanitize::{is_loop, sanitize_headers, validate_no_body};
