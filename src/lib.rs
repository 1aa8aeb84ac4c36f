//! Caching DNS forwarding proxy.
//!
//! Queries arrive over UDP, are answered from an in-memory cache while the
//! cached answer's TTL holds, and are otherwise forwarded to a single upstream
//! resolver whose reply is relayed and cached.

pub mod cache;
pub mod config;
pub mod dns_header;
pub mod dns_message;
pub mod dns_question_and_answer;
pub mod error;
pub mod forwarder;
pub mod proxy;
pub mod server;

pub use cache::{AnswerCache, CacheEntry};
pub use config::ProxyConfig;
pub use dns_message::{CacheKey, Message};
pub use error::ProxyError;
pub use forwarder::{UdpForwarder, Upstream};
pub use proxy::{ForwardingProxy, Outcome};
pub use server::DnsServer;
