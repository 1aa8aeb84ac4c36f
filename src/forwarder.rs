use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::{ProxyError, Result};

/// Largest reply datagram accepted from the forwarder.
pub const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// One request/response exchange with the upstream resolver.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `query` as-is and return the raw reply.
    async fn exchange(&self, query: &[u8]) -> Result<Bytes>;
}

#[async_trait]
impl<T: Upstream + ?Sized> Upstream for Arc<T> {
    async fn exchange(&self, query: &[u8]) -> Result<Bytes> {
        (**self).exchange(query).await
    }
}

/// Forwards queries over UDP, one fresh socket per query.
#[derive(Debug, Clone)]
pub struct UdpForwarder {
    upstream: SocketAddr,
    timeout: Duration,
}

impl UdpForwarder {
    pub fn new(upstream: SocketAddr, timeout: Duration) -> Self {
        Self { upstream, timeout }
    }

    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    async fn exchange_inner(&self, socket: &UdpSocket, query: &[u8]) -> Result<Bytes> {
        socket.send_to(query, self.upstream).await?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (len, from) = socket.recv_from(&mut recv_buf).await?;
            if from != self.upstream {
                warn!(expected = %self.upstream, received_from = %from, "ignoring datagram from unexpected source");
                continue;
            }

            recv_buf.truncate(len);
            debug!(upstream = %self.upstream, bytes = len, "upstream reply received");
            return Ok(Bytes::from(recv_buf));
        }
    }
}

#[async_trait]
impl Upstream for UdpForwarder {
    async fn exchange(&self, query: &[u8]) -> Result<Bytes> {
        let bind_addr: SocketAddr = if self.upstream.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        tokio::time::timeout(self.timeout, self.exchange_inner(&socket, query))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.timeout))?
    }
}
