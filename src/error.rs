use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while handling a single datagram.
///
/// None of these end the process; the server logs them and drops the request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("message is a query, not a response")]
    NotAResponse,

    #[error("upstream did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ProxyError::MalformedPacket(reason.into())
    }
}

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
