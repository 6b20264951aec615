//! proxyd — the content-deduplicating HTTP forward proxy.
//!
//! A raw `TcpListener` accept loop spawns one task per connection
//! running `hyper::server::conn::http1`, with a `tokio::sync::watch`
//! shutdown signal raced against `Ctrl-C`.
//!
//! # Usage
//!
//! ```text
//! proxyd --addr :8000 --hasher 127.0.0.1:9000 --cache_dir /var/cache/hproxy
//! ```

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_stream::stream;
use bytes::Bytes;
use clap::Parser;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hproxy_cache::{BlobCache, DiskCache, NullCache};
use hproxy_proto::{Header as ResponseHeader, HeaderMap as ProtoHeaderMap, Request as ProtoRequest};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request as HyperRequest, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

type ResponseBody = BoxBody<Bytes, std::io::Error>;

#[derive(Parser)]
#[command(name = "proxyd", about = "Content-deduplicating HTTP forward proxy")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = ":8000")]
    addr: String,

    /// Address (`host:port`) of the hasher server this proxy delegates
    /// chunking to.
    #[arg(long, default_value = "127.0.0.1:9000")]
    hasher: String,

    /// On-disk cache root. Absent means the null cache: every chunk is
    /// treated as a miss and nothing is persisted.
    #[arg(long = "cache_dir")]
    cache_dir: Option<PathBuf>,

    /// Minimum origin `Content-Length`, in bytes, for a response to be
    /// routed through the hasher instead of forwarded byte-for-byte.
    #[arg(long = "size-cutoff", default_value_t = 1_048_576)]
    size_cutoff: u64,
}

struct ProxyConfig {
    hasher_addr: String,
    size_cutoff: u64,
    cache: Arc<dyn BlobCache>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,proxyd=debug,hproxy_proxy=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let addr = normalize_addr(&cli.addr);

    let cache: Arc<dyn BlobCache> = match &cli.cache_dir {
        Some(dir) => {
            info!(?dir, "proxyd using on-disk cache");
            Arc::new(DiskCache::new(dir.clone()))
        }
        None => {
            info!("no --cache_dir given, proxyd using null cache");
            Arc::new(NullCache)
        }
    };

    let config = Arc::new(ProxyConfig {
        hasher_addr: cli.hasher.clone(),
        size_cutoff: cli.size_cutoff,
        cache,
    });

    let listener = TcpListener::bind(&addr).await.context("failed to bind proxyd")?;
    info!(%addr, hasher = %cli.hasher, size_cutoff = cli.size_cutoff, "proxyd listening");

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, peer_addr) = accept_result.context("accept failed")?;
                let config = config.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let svc = service_fn(move |req: HyperRequest<Incoming>| {
                        let config = config.clone();
                        async move { Ok::<_, Infallible>(handle(req, config).await) }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                        debug!(%peer_addr, error = %e, "proxyd connection error");
                    }
                });
            }
            _ = shutdown_rx.changed() => {
                info!("proxyd shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// `:8000` means "all interfaces, port 8000" — the Go CLI's shorthand.
fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

async fn handle(req: HyperRequest<Incoming>, config: Arc<ProxyConfig>) -> Response<ResponseBody> {
    let transportable = match to_transportable(&req) {
        Ok(r) => r,
        Err(reason) => {
            warn!(reason, "could not marshal inbound request");
            return error_response(400, "Bad Request");
        }
    };

    if hproxy_proxy::is_loop(&transportable.header) {
        debug!(url = %transportable.url, "Via loop detected, forwarding direct");
        return forward_direct(&transportable).await;
    }

    if hproxy_proxy::validate_no_body(&transportable).is_err() {
        debug!(url = %transportable.url, "request carries a body, forwarding direct");
        return forward_direct(&transportable).await;
    }

    let eligibility = match hproxy_proxy::check_eligibility(&transportable, config.size_cutoff).await {
        Ok(e) => e,
        Err(e) => {
            warn!(url = %transportable.url, error = %e, "eligibility probe failed, forwarding direct");
            None
        }
    };

    let Some(eligibility) = eligibility else {
        return forward_direct(&transportable).await;
    };

    match hproxy_proxy::reassemble(
        transportable.clone(),
        &config.hasher_addr,
        eligibility.etag,
        config.cache.clone(),
    )
    .await
    {
        Ok((header, body)) => hashed_response(header, body),
        Err(e) => {
            warn!(url = %transportable.url, error = %e, "hasher unavailable, falling back to direct forward");
            forward_direct(&transportable).await
        }
    }
}

/// Builds the transportable request form the rest of the pipeline works
/// with from the raw hyper request. Forward-proxy clients send an
/// absolute-form request target (`GET http://host/path HTTP/1.1`); if
/// the target is origin-form instead, the `Host` header supplies the
/// authority.
fn to_transportable(req: &HyperRequest<Incoming>) -> Result<ProtoRequest, &'static str> {
    let method = req.method().to_string();
    let uri = req.uri();

    let host_header = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let host = uri
        .authority()
        .map(|a| a.to_string())
        .or(host_header)
        .ok_or("missing Host")?;

    let url = if uri.scheme().is_some() {
        uri.to_string()
    } else {
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("http://{host}{path}")
    };

    let mut header = ProtoHeaderMap::new();
    for (name, value) in req.headers().iter() {
        if let Ok(v) = value.to_str() {
            header.insert(name.as_str(), v);
        }
    }

    Ok(ProtoRequest { method, url, host, header })
}

async fn forward_direct(req: &ProtoRequest) -> Response<ResponseBody> {
    match hproxy_proxy::forward(req).await {
        Ok(resp) => {
            let mut builder = Response::builder().status(resp.status);
            for h in resp.header.iter() {
                builder = builder.header(h.name.as_str(), h.value.as_str());
            }
            let body: ResponseBody = resp
                .body
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
                .boxed();
            builder.body(body).unwrap_or_else(|_| error_response(502, "Bad Gateway"))
        }
        Err(e) => {
            error!(url = %req.url, error = %e, "direct forward failed");
            error_response(502, "Bad Gateway")
        }
    }
}

fn hashed_response(header: ResponseHeader, mut body: hproxy_proxy::ReassembledBody) -> Response<ResponseBody> {
    let mut out_header = header.header;
    hproxy_proxy::sanitize_headers(&mut out_header);

    let mut builder = Response::builder().status(header.status_code);
    for h in out_header.iter() {
        builder = builder.header(h.name.as_str(), h.value.as_str());
    }

    let byte_stream = stream! {
        while let Some(next) = body.next().await {
            match next {
                Ok(bytes) => yield Ok::<_, std::io::Error>(Frame::data(bytes)),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    };

    let body: ResponseBody = StreamBody::new(byte_stream).boxed();
    builder.body(body).unwrap_or_else(|_| error_response(502, "Bad Gateway"))
}

fn error_response(status: u16, message: &str) -> Response<ResponseBody> {
    let body: ResponseBody = Full::new(Bytes::from(message.to_string()))
        .map_err(|never: Infallible| match never {})
        .boxed();
    Response::builder()
        .status(status)
        .body(body)
        .expect("static error response always builds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_port() {
        assert_eq!(normalize_addr(":8000"), "0.0.0.0:8000");
    }

    #[test]
    fn leaves_explicit_host_alone() {
        assert_eq!(normalize_addr("127.0.0.1:8000"), "127.0.0.1:8000");
    }
}
