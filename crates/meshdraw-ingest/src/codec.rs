//! Packet codec.
//!
//! Packets arrive as newline-delimited JSON objects in the shape the
//! Meshtastic client libraries produce:
//!
//! ```json
//! {"fromId":"!a1b2c3d4","decoded":{"portnum":"TEXT_MESSAGE_APP","text":"hello"}}
//! {"fromId":"!a1b2c3d4","decoded":{"portnum":"NODEINFO_APP","user":{"id":"!a1b2c3d4","longName":"Alice"}}}
//! ```
//!
//! Packets that carry nothing the draw cares about decode to `Ok(None)`.

use bytes::{Buf, Bytes, BytesMut};
use meshdraw_core::MeshEvent;
use serde::Deserialize;
use thiserror::Error;

/// Maximum line size (64 KiB).
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Packet decoding errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line is not a valid packet object.
    #[error("Invalid packet JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is missing or empty.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A line exceeded the maximum size without a terminator.
    #[error("Line size {0} exceeds maximum {MAX_LINE_SIZE}")]
    LineTooLong(usize),
}

/// Application port of a decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortNum {
    /// Plain text chat.
    TextMessage,
    /// Node user info broadcast.
    NodeInfo,
    /// Anything else (position, telemetry, routing...).
    Other,
}

impl PortNum {
    fn from_value(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(serde_json::Value::String(name)) => match name.as_str() {
                "TEXT_MESSAGE_APP" => Self::TextMessage,
                "NODEINFO_APP" => Self::NodeInfo,
                _ => Self::Other,
            },
            Some(serde_json::Value::Number(n)) => match n.as_u64() {
                Some(1) => Self::TextMessage,
                Some(4) => Self::NodeInfo,
                _ => Self::Other,
            },
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPacket {
    from_id: Option<String>,
    decoded: Option<RawDecoded>,
}

#[derive(Debug, Deserialize)]
struct RawDecoded {
    portnum: Option<serde_json::Value>,
    text: Option<String>,
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    id: Option<String>,
    long_name: Option<String>,
}

/// Decode a single packet.
///
/// Returns `Ok(None)` for packets without a sender, without a decoded
/// payload, or on ports other than text and node info.
///
/// # Errors
///
/// Returns an error if the data is not a JSON packet object, or if a node
/// info packet lacks the user's id or long name.
pub fn decode(data: &[u8]) -> Result<Option<MeshEvent>, DecodeError> {
    let packet: RawPacket = serde_json::from_slice(data)?;

    let sender = match packet.from_id {
        Some(id) if !id.is_empty() => id,
        _ => return Ok(None),
    };
    let Some(decoded) = packet.decoded else {
        return Ok(None);
    };

    let port = PortNum::from_value(decoded.portnum.as_ref());

    if port == PortNum::TextMessage {
        let text = decoded.text.unwrap_or_default();
        return Ok(Some(MeshEvent::text(sender, text)));
    }

    // Some firmware sends user info on other ports; the user block wins.
    if port == PortNum::NodeInfo || decoded.user.is_some() {
        let Some(user) = decoded.user else {
            return Ok(None);
        };
        let node_id = user
            .id
            .filter(|id| !id.is_empty())
            .ok_or(DecodeError::MissingField("user.id"))?;
        let long_name = user
            .long_name
            .filter(|name| !name.is_empty())
            .ok_or(DecodeError::MissingField("user.longName"))?;
        return Ok(Some(MeshEvent::node_info(node_id, long_name)));
    }

    Ok(None)
}

/// Splits a byte stream into lines.
///
/// A line that grows past [`MAX_LINE_SIZE`] is reported once and then
/// skipped through its terminator, so the stream resynchronizes on the
/// next newline.
#[derive(Debug, Default)]
pub struct LineCodec {
    discarding: bool,
}

impl LineCodec {
    /// Create a new codec instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to split one line off a buffer, advancing it if successful.
    ///
    /// Returns `Ok(Some(line))` without its terminator (`\n` or `\r\n`),
    /// or `Ok(None)` if more data is needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a line exceeds the maximum size.
    pub fn decode_from(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, DecodeError> {
        loop {
            let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
                if self.discarding {
                    buf.clear();
                } else if buf.len() > MAX_LINE_SIZE {
                    let len = buf.len();
                    buf.clear();
                    self.discarding = true;
                    return Err(DecodeError::LineTooLong(len));
                }
                return Ok(None);
            };

            if self.discarding {
                buf.advance(pos + 1);
                self.discarding = false;
                continue;
            }

            if pos > MAX_LINE_SIZE {
                buf.advance(pos + 1);
                return Err(DecodeError::LineTooLong(pos));
            }

            let mut line = buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            return Ok(Some(line.freeze()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_message() {
        let data = br#"{"fromId":"!a1","decoded":{"portnum":"TEXT_MESSAGE_APP","text":"hello"}}"#;
        assert_eq!(decode(data).unwrap(), Some(MeshEvent::text("!a1", "hello")));
    }

    #[test]
    fn test_decode_text_numeric_port() {
        let data = br#"{"fromId":"!a1","decoded":{"portnum":1,"text":"hi"}}"#;
        assert_eq!(decode(data).unwrap(), Some(MeshEvent::text("!a1", "hi")));
    }

    #[test]
    fn test_decode_node_info() {
        let data = br#"{"fromId":"!a1","decoded":{"portnum":"NODEINFO_APP","user":{"id":"!a1","longName":"Alice","shortName":"AL"}}}"#;
        assert_eq!(
            decode(data).unwrap(),
            Some(MeshEvent::node_info("!a1", "Alice"))
        );
    }

    #[test]
    fn test_decode_user_on_other_port() {
        let data = br#"{"fromId":"!a1","decoded":{"portnum":"ROUTING_APP","user":{"id":"!b2","longName":"Bob"}}}"#;
        assert_eq!(decode(data).unwrap(), Some(MeshEvent::node_info("!b2", "Bob")));
    }

    #[test]
    fn test_decode_ignored_packets() {
        let cases: [&[u8]; 5] = [
            br#"{"decoded":{"portnum":"TEXT_MESSAGE_APP","text":"no sender"}}"#,
            br#"{"fromId":null,"decoded":{"portnum":"TEXT_MESSAGE_APP","text":"x"}}"#,
            br#"{"fromId":"!a1"}"#,
            br#"{"fromId":"!a1","decoded":{"portnum":"POSITION_APP"}}"#,
            br#"{"fromId":"!a1","decoded":{"portnum":"NODEINFO_APP"}}"#,
        ];

        for data in cases {
            assert_eq!(decode(data).unwrap(), None);
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(b"[1,2,3]"), Err(DecodeError::Json(_))));

        let missing_name = br#"{"fromId":"!a1","decoded":{"portnum":"NODEINFO_APP","user":{"id":"!a1"}}}"#;
        assert!(matches!(
            decode(missing_name),
            Err(DecodeError::MissingField("user.longName"))
        ));
    }

    #[test]
    fn test_line_framing() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"first\r\nsecond\npart"[..]);

        assert_eq!(codec.decode_from(&mut buf).unwrap().unwrap(), &b"first"[..]);
        assert_eq!(codec.decode_from(&mut buf).unwrap().unwrap(), &b"second"[..]);
        assert!(codec.decode_from(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"part");
    }

    #[test]
    fn test_line_too_long_recovers() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_SIZE + 10]);
        buf.extend_from_slice(b"\nnext\n");

        assert!(matches!(
            codec.decode_from(&mut buf),
            Err(DecodeError::LineTooLong(_))
        ));
        assert_eq!(codec.decode_from(&mut buf).unwrap().unwrap(), &b"next"[..]);
    }

    #[test]
    fn test_line_too_long_split_across_reads() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_LINE_SIZE + 1]);

        assert!(matches!(
            codec.decode_from(&mut buf),
            Err(DecodeError::LineTooLong(_))
        ));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"xxxx");
        assert!(codec.decode_from(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"xx\nnext\n");
        assert_eq!(codec.decode_from(&mut buf).unwrap().unwrap(), &b"next"[..]);
    }
}
