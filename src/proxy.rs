//! Per-query forward-or-serve decision.
//!
//! A query is decoded, looked up in the [`AnswerCache`], and either answered
//! from the cache (id and TTLs rewritten) or forwarded unmodified to the
//! upstream resolver. Upstream replies are relayed byte-for-byte; they are
//! cached only if they decode.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{AnswerCache, CacheEntry};
use crate::dns_header::Direction;
use crate::dns_message::Message;
use crate::error::{ProxyError, Result};
use crate::forwarder::Upstream;

/// What became of one inbound datagram.
#[derive(Debug)]
pub enum Outcome {
    /// Served from cache.
    Cached(Bytes),
    /// Relayed from the forwarder.
    Forwarded(Bytes),
    /// Nothing is sent back to the client.
    Dropped(ProxyError),
}

impl Outcome {
    /// Bytes to send to the client, if any.
    pub fn into_reply(self) -> Option<Bytes> {
        match self {
            Outcome::Cached(bytes) | Outcome::Forwarded(bytes) => Some(bytes),
            Outcome::Dropped(_) => None,
        }
    }
}

pub struct ForwardingProxy<U> {
    cache: Arc<AnswerCache>,
    upstream: U,
}

impl<U: Upstream> ForwardingProxy<U> {
    pub fn new(cache: Arc<AnswerCache>, upstream: U) -> Self {
        Self { cache, upstream }
    }

    pub fn cache(&self) -> &Arc<AnswerCache> {
        &self.cache
    }

    /// Handle one datagram received at `now`.
    pub async fn handle(&self, datagram: Bytes, now: Instant) -> Outcome {
        let request = match Message::decode(datagram) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "dropping undecodable datagram");
                return Outcome::Dropped(e);
            }
        };

        if request.direction() != Direction::Query {
            let e = ProxyError::malformed("inbound datagram is not a query");
            debug!(name = %request.question.name, "dropping response-direction datagram");
            return Outcome::Dropped(e);
        }

        let key = request.question_key();

        if let Some(entry) = self.cache.lookup(&key).filter(|entry| entry.is_fresh(now)) {
            match serve_cached(&request, &entry, now) {
                Ok(reply) => return Outcome::Cached(reply),
                Err(e) => warn!(error = %e, "cached answer unusable, forwarding instead"),
            }
        }

        self.forward(request, key, now).await
    }

    async fn forward(&self, request: Message, key: Bytes, now: Instant) -> Outcome {
        let reply = match self.upstream.exchange(request.as_bytes()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(name = %request.question.name, error = %e, "no answer from forwarder");
                return Outcome::Dropped(e);
            }
        };

        match Message::decode(reply.clone()) {
            Ok(response) => {
                if let Err(e) = self.cache.store(key, response, now) {
                    debug!(name = %request.question.name, error = %e, "forwarder reply not cached");
                }
            }
            Err(e) => debug!(name = %request.question.name, error = %e, "forwarder reply not decodable, relaying uncached"),
        }

        debug!(name = %request.question.name, bytes = reply.len(), "response from forwarder");
        Outcome::Forwarded(reply)
    }
}

/// The cached answer, re-addressed to `request` and aged to `now`.
fn serve_cached(request: &Message, entry: &CacheEntry, now: Instant) -> Result<Bytes> {
    let reply = entry
        .response
        .rewrite_id(request.id())
        .rewrite_ttl(entry.inserted_at, entry.original_ttl, now)?;

    debug!(
        name = %request.question.name,
        qtype = %request.question.qtype,
        ttl = entry.remaining_ttl(now),
        "response from cache"
    );
    Ok(reply.to_bytes())
}
