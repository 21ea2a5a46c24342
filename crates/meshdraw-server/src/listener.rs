//! Mesh listener.
//!
//! Pulls raw packets from a packet source, decodes them, and applies the
//! resulting events to the session. Undecodable packets are logged and
//! dropped; they never reach the session.

use crate::config::{IngestConfig, SourceKind};
use crate::metrics;
use meshdraw_core::{EventOutcome, LinkStatus, MeshEvent, Session};
use meshdraw_ingest::{codec, IngestError, LineSource, PacketSource, SourceEvent};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a source stopped producing.
#[derive(Debug)]
pub enum SourceExit {
    /// The source reached end of stream.
    Ended,
    /// The source failed.
    Failed(IngestError),
}

/// Spawn the listener task for the configured source.
///
/// Returns `None` when ingest is disabled.
pub fn spawn(config: IngestConfig, session: Session) -> Option<JoinHandle<()>> {
    match config.source {
        SourceKind::Disabled => {
            info!("Mesh ingest disabled");
            None
        }
        SourceKind::Stdin => Some(tokio::spawn(async move {
            info!("Mesh listener reading packets from stdin");
            match run(LineSource::stdin(), &session).await {
                SourceExit::Ended => info!("Mesh listener reached end of input"),
                SourceExit::Failed(e) => error!(error = %e, "Mesh listener stopped"),
            }
        })),
        SourceKind::Tcp => Some(tokio::spawn(run_tcp(config, session))),
    }
}

/// Keep a TCP bridge connection alive, reconnecting after failures.
async fn run_tcp(config: IngestConfig, session: Session) {
    let Some(addr) = config.address else {
        error!("TCP ingest configured without an address");
        return;
    };
    let delay = Duration::from_millis(config.reconnect_delay_ms);

    loop {
        match LineSource::connect(addr).await {
            Ok(source) => {
                let exit = run(source, &session).await;
                warn!(?exit, "Packet bridge disconnected");
            }
            Err(e) => {
                warn!(error = %e, "Packet bridge unavailable");
                metrics::set_link_up(false);
            }
        }

        debug!(delay_ms = config.reconnect_delay_ms, "Reconnecting to packet bridge");
        tokio::time::sleep(delay).await;
    }
}

/// Drain a source into the session until it ends or fails.
pub async fn run<S: PacketSource>(mut source: S, session: &Session) -> SourceExit {
    loop {
        match source.next_event().await {
            Ok(Some(SourceEvent::Packet(data))) => handle_packet(&data, session),
            Ok(Some(SourceEvent::Link(status))) => handle_link(status, source.name()),
            Ok(None) => return SourceExit::Ended,
            Err(e) if e.is_recoverable() => {
                warn!(source = source.name(), error = %e, "Dropping unreadable input");
                metrics::record_decode_error();
            }
            Err(e) => {
                error!(source = source.name(), error = %e, "Packet source failed");
                metrics::set_link_up(false);
                return SourceExit::Failed(e);
            }
        }
    }
}

fn handle_packet(data: &[u8], session: &Session) {
    let event = match codec::decode(data) {
        Ok(Some(event)) => event,
        Ok(None) => {
            metrics::record_packet("other");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Dropping malformed packet");
            metrics::record_decode_error();
            return;
        }
    };

    metrics::record_packet(match &event {
        MeshEvent::TextMessage { .. } => "text",
        MeshEvent::NodeInfo { .. } => "nodeinfo",
    });

    match session.handle_event(event) {
        EventOutcome::Registered => {
            metrics::record_registration();
            metrics::set_participants(session.participant_count());
        }
        EventOutcome::NodeUpdated => metrics::record_node_update(),
        EventOutcome::Ignored => {}
    }
}

fn handle_link(status: LinkStatus, source: &str) {
    match status {
        LinkStatus::Established => {
            info!(source, "Mesh link established");
            metrics::set_link_up(true);
        }
        LinkStatus::Lost => {
            warn!(source, "Mesh link lost");
            metrics::set_link_up(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshdraw_core::SessionConfig;
    use meshdraw_ingest::ChannelSource;

    #[tokio::test]
    async fn test_listener_applies_events() {
        let session = Session::new(SessionConfig::default());
        let (tx, source) = ChannelSource::channel(16);

        let packets = [
            r#"{"fromId":"!a1","decoded":{"portnum":"NODEINFO_APP","user":{"id":"!a1","longName":"Alice"}}}"#,
            r#"{"fromId":"!a1","decoded":{"portnum":"TEXT_MESSAGE_APP","text":"我要抽奖"}}"#,
            "garbage",
            r#"{"fromId":"!b2","decoded":{"portnum":"TEXT_MESSAGE_APP","text":"just chatting"}}"#,
            r#"{"fromId":"!c3","decoded":{"portnum":"TEXT_MESSAGE_APP","text":"please 我要抽奖 thanks"}}"#,
        ];

        tx.send_link(LinkStatus::Established).await.unwrap();
        for packet in packets {
            tx.send_packet(packet.as_bytes()).await.unwrap();
        }
        drop(tx);

        assert!(matches!(run(source, &session).await, SourceExit::Ended));

        let status = session.status();
        assert_eq!(status.participant_count, 2);
        assert_eq!(status.participants[0].id, "!a1");
        assert_eq!(status.participants[0].name, "Alice");
        assert_eq!(status.participants[1].id, "!c3");
    }

    #[tokio::test]
    async fn test_listener_over_line_source() {
        let session = Session::new(SessionConfig::default());
        let input: &[u8] = b"{\"fromId\":\"!z\",\"decoded\":{\"portnum\":1,\"text\":\"\xe6\x88\x91\xe8\xa6\x81\xe6\x8a\xbd\xe5\xa5\x96\"}}\n";

        let exit = run(LineSource::new(input, "test"), &session).await;

        assert!(matches!(exit, SourceExit::Ended));
        assert_eq!(session.participant_count(), 1);
    }
}
