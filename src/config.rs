use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{bail, Context};

pub const DEFAULT_LISTEN_PORT: u16 = 53;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime settings for the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub listen: SocketAddr,
    pub upstream: SocketAddr,
    pub upstream_timeout: Duration,
    /// Cap on concurrently running handlers; `None` spawns one task per datagram without limit.
    pub max_in_flight: Option<usize>,
}

impl ProxyConfig {
    pub fn new(listen: SocketAddr, upstream: SocketAddr) -> Self {
        Self {
            listen,
            upstream,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            max_in_flight: None,
        }
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        if timeout.is_zero() {
            bail!("upstream timeout must be greater than zero");
        }
        self.upstream_timeout = timeout;
        Ok(self)
    }

    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> anyhow::Result<Self> {
        if limit == Some(0) {
            bail!("worker limit must be at least 1");
        }
        self.max_in_flight = limit;
        Ok(self)
    }
}

/// Resolve a listen host such as `localhost` or `0.0.0.0` to a socket address.
pub async fn resolve_listen(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve listen address {}", host))?
        .next()
        .with_context(|| format!("listen address {} resolved to nothing", host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::new(
            "127.0.0.1:53".parse().unwrap(),
            "8.8.8.8:53".parse().unwrap(),
        );
        assert_eq!(config.upstream_timeout, Duration::from_secs(3));
        assert_eq!(config.max_in_flight, None);
    }

    #[test]
    fn test_rejects_zero_limits() {
        let config = ProxyConfig::new(
            "127.0.0.1:53".parse().unwrap(),
            "8.8.8.8:53".parse().unwrap(),
        );
        assert!(config.clone().with_upstream_timeout(Duration::ZERO).is_err());
        assert!(config.clone().with_max_in_flight(Some(0)).is_err());
        assert_eq!(config.with_max_in_flight(Some(8)).unwrap().max_in_flight, Some(8));
    }

    #[tokio::test]
    async fn test_resolve_listen() {
        let addr = resolve_listen("127.0.0.1", 5353).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5353".parse().unwrap());

        let addr = resolve_listen("localhost", 5353).await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 5353);
    }
}
