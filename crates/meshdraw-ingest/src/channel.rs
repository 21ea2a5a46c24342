//! In-process packet source.
//!
//! Lets an embedded radio client push packets straight into the ingest
//! pipeline through a bounded channel.

use async_trait::async_trait;
use bytes::Bytes;
use meshdraw_core::LinkStatus;
use tokio::sync::mpsc;

use crate::traits::{IngestError, PacketSource, SourceEvent};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Producer half of a channel source.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<SourceEvent>,
}

impl ChannelSender {
    /// Push a raw packet.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::TransportUnavailable`] if the source was dropped.
    pub async fn send_packet(&self, data: impl Into<Bytes>) -> Result<(), IngestError> {
        self.send(SourceEvent::Packet(data.into())).await
    }

    /// Report a link transition.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::TransportUnavailable`] if the source was dropped.
    pub async fn send_link(&self, status: LinkStatus) -> Result<(), IngestError> {
        self.send(SourceEvent::Link(status)).await
    }

    async fn send(&self, event: SourceEvent) -> Result<(), IngestError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| IngestError::TransportUnavailable("ingest channel closed".into()))
    }
}

/// Consumer half of a channel source.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<SourceEvent>,
}

impl ChannelSource {
    /// Create a connected sender/source pair.
    #[must_use]
    pub fn channel(capacity: usize) -> (ChannelSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelSender { tx }, Self { rx })
    }
}

#[async_trait]
impl PacketSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<SourceEvent>, IngestError> {
        Ok(self.rx.recv().await)
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
