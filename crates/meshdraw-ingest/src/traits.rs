//! Packet source abstraction.
//!
//! A packet source is whatever sits between the radio and meshdraw: a
//! bridge process piping JSON lines, a TCP feed, or an in-process channel.

use async_trait::async_trait;
use bytes::Bytes;
use meshdraw_core::LinkStatus;
use thiserror::Error;

use crate::codec::DecodeError;

/// Something a packet source produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// One raw packet, undecoded.
    Packet(Bytes),
    /// The link to the radio changed state.
    Link(LinkStatus),
}

/// Ingest errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The radio or its bridge cannot be reached.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Framing or decoding failed.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the source can keep producing after this error.
    ///
    /// Decode errors only spoil one packet; transport and I/O errors end
    /// the source.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// A source of raw mesh packets.
#[async_trait]
pub trait PacketSource: Send {
    /// Wait for the next event.
    ///
    /// Returns `None` once the source is exhausted.
    async fn next_event(&mut self) -> Result<Option<SourceEvent>, IngestError>;

    /// Get the source name (e.g., "stdin", "tcp").
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recoverability() {
        assert!(IngestError::Decode(DecodeError::MissingField("user.id")).is_recoverable());
        assert!(!IngestError::TransportUnavailable("down".into()).is_recoverable());
        assert!(!IngestError::Io(std::io::Error::other("boom")).is_recoverable());
    }
}
