use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::cache::AnswerCache;
use crate::config::ProxyConfig;
use crate::forwarder::{UdpForwarder, Upstream, MAX_UDP_RESPONSE_SIZE};
use crate::proxy::ForwardingProxy;

/// UDP front end: one task per inbound datagram.
pub struct DnsServer<U> {
    socket: Arc<UdpSocket>,
    proxy: Arc<ForwardingProxy<U>>,
    limit: Option<Arc<Semaphore>>,
}

impl DnsServer<UdpForwarder> {
    /// Bind the listener and wire up a fresh cache and UDP forwarder.
    pub async fn bind(config: &ProxyConfig) -> std::io::Result<Self> {
        let forwarder = UdpForwarder::new(config.upstream, config.upstream_timeout);
        let proxy = ForwardingProxy::new(Arc::new(AnswerCache::new()), forwarder);
        Self::with_proxy(config, proxy).await
    }
}

impl<U: Upstream + 'static> DnsServer<U> {
    pub async fn with_proxy(config: &ProxyConfig, proxy: ForwardingProxy<U>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(config.listen).await?;

        Ok(Self {
            socket: Arc::new(socket),
            proxy: Arc::new(proxy),
            limit: config.max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn cache(&self) -> &Arc<AnswerCache> {
        self.proxy.cache()
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await
    }

    /// Serve until `shutdown` completes. Handlers already spawned run to completion.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        info!(listen = %self.local_addr()?, "DNS cache proxy running");
        tokio::pin!(shutdown);

        let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (size, source) = tokio::select! {
                _ = &mut shutdown => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP port-unreachable from an earlier reply shows up here on some platforms.
                        warn!(error = %e, "error receiving datagram");
                        continue;
                    }
                },
            };
            debug!(client = %source, bytes = size, "received datagram");

            let permit = match &self.limit {
                Some(limit) => match Arc::clone(limit).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            let datagram = Bytes::copy_from_slice(&buf[..size]);
            let socket = Arc::clone(&self.socket);
            let proxy = Arc::clone(&self.proxy);
            tokio::spawn(async move {
                let _permit = permit;
                if let Some(reply) = proxy.handle(datagram, Instant::now()).await.into_reply() {
                    if let Err(e) = socket.send_to(&reply, source).await {
                        warn!(client = %source, error = %e, "failed to send response");
                    }
                }
            });
        }

        info!("exiting");
        Ok(())
    }
}
