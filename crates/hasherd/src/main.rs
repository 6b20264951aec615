//! hasherd — fetches origin responses, splits them into content-defined
//! chunks, and serves the chunk stream over HTTP.
//!
//! Clap parses flags, `tracing_subscriber` handles logs, and a
//! `tokio::sync::watch` shutdown signal races against `Ctrl-C` inside
//! `axum::serve`.
//!
//! # Usage
//!
//! ```text
//! hasherd --addr :9000
//! ```

use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(name = "hasherd", about = "Content-defined chunking hasher server")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = ":9000")]
    addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hasherd=debug,hproxy_hasher=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let addr = normalize_addr(&cli.addr);

    info!(%addr, "hasherd starting");

    let state = hproxy_hasher::HasherState::new();
    let router = hproxy_hasher::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("hasherd stopped");
    Ok(())
}

/// `:9000` means "all interfaces, port 9000" — the Go CLI's shorthand.
fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
