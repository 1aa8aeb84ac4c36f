use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dns_cache_proxy::config::{resolve_listen, ProxyConfig, DEFAULT_LISTEN_PORT, DEFAULT_UPSTREAM_TIMEOUT};
use dns_cache_proxy::DnsServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dns-cache-proxy", about = "Caching DNS forwarder")]
struct Args {
    /// Address to listen on (e.g., localhost)
    #[arg(short, long)]
    ip: String,

    /// Port to listen on
    #[arg(short = 'l', long, default_value_t = DEFAULT_LISTEN_PORT)]
    port: u16,

    /// IP of the forwarder (e.g., 8.8.8.8)
    #[arg(short, long)]
    forwarder: IpAddr,

    /// Port of the forwarder (e.g., 53)
    #[arg(short = 'p', long)]
    forwarder_port: u16,

    /// Seconds to wait for the forwarder before dropping a query
    #[arg(short, long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT.as_secs())]
    timeout: u64,

    /// Maximum number of queries handled at once (unbounded if omitted)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let listen = resolve_listen(&args.ip, args.port).await?;
    let config = ProxyConfig::new(listen, SocketAddr::new(args.forwarder, args.forwarder_port))
        .with_upstream_timeout(Duration::from_secs(args.timeout))?
        .with_max_in_flight(args.workers)?;

    info!(
        listen = %config.listen,
        upstream = %config.upstream,
        timeout = ?config.upstream_timeout,
        workers = ?config.max_in_flight,
        "starting DNS cache proxy"
    );

    let server = DnsServer::bind(&config)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    server.run().await?;

    Ok(())
}
