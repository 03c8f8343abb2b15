//! KCP echo over UDP
//!
//! ```text
//! cargo run -p kcp-session --example echo -- server 127.0.0.1:12345
//! cargo run -p kcp-session --example echo -- client 127.0.0.1:12345
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use bytes::Bytes;
use kcp_session::metrics::{format_metrics, global_metrics};
use kcp_session::{KcpSession, SessionConfig, UdpTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONV: u32 = 0x4543_484F;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <server|client> [address]", args[0]);
        eprintln!("Example: {} server 127.0.0.1:12345", args[0]);
        eprintln!("Example: {} client 127.0.0.1:12345", args[0]);
        return Ok(());
    }

    let addr: SocketAddr = if args.len() > 2 {
        args[2].parse()?
    } else {
        "127.0.0.1:12345".parse()?
    };

    let config = SessionConfig::new().fast_mode().window_size(128, 256);
    match args[1].as_str() {
        "server" => run_server(addr, config).await,
        "client" => run_client(addr, config).await,
        _ => {
            eprintln!("Mode must be 'server' or 'client'");
            Ok(())
        }
    }
}

async fn run_server(
    addr: SocketAddr,
    config: SessionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(UdpTransport::bind(addr).await?);
    info!("Echo server listening on {}", addr);

    let mut session = KcpSession::accept(transport, CONV, config).await?;
    info!("New session from {}", session.peer_addr());

    loop {
        match session.recv().await {
            Ok(message) => session.send(message).await?,
            Err(e) => {
                if e.is_lost() {
                    info!("Client went away");
                } else {
                    error!("Session error: {}", e);
                }
                break;
            }
        }
    }

    info!("{}", format_metrics(&global_metrics().snapshot()));
    Ok(())
}

async fn run_client(
    addr: SocketAddr,
    config: SessionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(UdpTransport::bind("0.0.0.0:0").await?);
    let mut session = KcpSession::connect(transport, addr, CONV, config).await?;
    info!("Connected to {}", addr);

    for i in 0..10 {
        let message = format!("echo message #{}", i);
        let started = Instant::now();
        session.send(Bytes::from(message.clone())).await?;

        let reply = tokio::time::timeout(Duration::from_secs(5), session.recv()).await??;
        info!(
            "Round trip {}: {:?} in {:?}",
            i,
            String::from_utf8_lossy(&reply),
            started.elapsed()
        );
        assert_eq!(reply, message.as_bytes());
    }

    let stats = session.stats().await?;
    info!(
        "rtt={}ms rto={}ms retransmissions={}",
        stats.rtt, stats.rto, stats.retransmissions
    );

    session.close().await?;
    info!("{}", format_metrics(&global_metrics().snapshot()));
    Ok(())
}
