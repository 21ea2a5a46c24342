//! Normalized ingest events.
//!
//! The ingest adapter decodes raw mesh packets into these events; the
//! session only ever sees well-formed values.

use crate::roster::ParticipantId;

/// An event decoded from the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    /// A text message broadcast by a node.
    TextMessage {
        /// Sending node.
        sender_id: ParticipantId,
        /// Message body.
        text: String,
    },
    /// A node announcing its user info.
    NodeInfo {
        /// Announcing node.
        node_id: ParticipantId,
        /// Long name of the node's user.
        display_name: String,
    },
}

impl MeshEvent {
    /// Create a text message event.
    #[must_use]
    pub fn text(sender_id: impl Into<ParticipantId>, text: impl Into<String>) -> Self {
        Self::TextMessage {
            sender_id: sender_id.into(),
            text: text.into(),
        }
    }

    /// Create a node info event.
    #[must_use]
    pub fn node_info(node_id: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self::NodeInfo {
            node_id: node_id.into(),
            display_name: display_name.into(),
        }
    }

    /// The node this event originated from.
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::TextMessage { sender_id, .. } => sender_id,
            Self::NodeInfo { node_id, .. } => node_id,
        }
    }
}

/// Radio link transitions reported by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Link to the radio came up.
    Established,
    /// Link to the radio went down.
    Lost,
}

/// What applying an event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Sender joined the roster.
    Registered,
    /// Registry name added or changed.
    NodeUpdated,
    /// Nothing changed.
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_node() {
        assert_eq!(MeshEvent::text("!a1", "hi").node(), "!a1");
        assert_eq!(MeshEvent::node_info("!b2", "Bob").node(), "!b2");
    }
}
