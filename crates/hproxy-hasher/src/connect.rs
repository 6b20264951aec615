//! One-shot HTTP/1 client connections, built the same way
//! `warpgrid-health::checker::http_probe` builds its probe connections:
//! a raw `TcpStream`, a `hyper::client::conn::http1` handshake, and the
//! connection driver spawned in the background.

use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;

pub async fn connect(host: &str, addr: &str) -> std::io::Result<SendRequest<http_body_util::Full<bytes::Bytes>>> {
    let _ = host;
    let stream = tokio::net::TcpStream::connect(addr).await?;
    let io = TokioIo::new(stream);
    let (sender, conn) = http1::handshake(io)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "hasher/origin connection closed");
        }
    });

    Ok(sender)
}

/// Splits a `host[:port]` or bare-host authority into `(connect_addr, host_header)`,
/// defaulting to port 80.
pub fn split_authority(host: &str) -> (String, String) {
    if host.contains(':') {
        (host.to_string(), host.to_string())
    } else {
        (format!("{host}:80"), host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_authority_adds_default_port() {
        assert_eq!(
            split_authority("example.com"),
            ("example.com:80".to_string(), "example.com".to_string())
        );
    }

    #[test]
    fn split_authority_keeps_explicit_port() {
        assert_eq!(
            split_authority("example.com:9000"),
            ("example.com:9000".to_string(), "example.com:9000".to_string())
        );
    }
}
