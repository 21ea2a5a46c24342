//! Newline-delimited JSON packet source.
//!
//! Reads packets from any async byte stream, one JSON object per line.
//! The stream being open counts as the radio link being up: the source
//! reports `Established` before the first packet and `Lost` at end of
//! stream.

use async_trait::async_trait;
use bytes::BytesMut;
use meshdraw_core::LinkStatus;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, Stdin};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::codec::LineCodec;
use crate::traits::{IngestError, PacketSource, SourceEvent};

/// Initial read buffer capacity.
const READ_BUFFER_CAPACITY: usize = 4096;

/// A packet source over a line-oriented byte stream.
pub struct LineSource<R> {
    reader: R,
    buffer: BytesMut,
    codec: LineCodec,
    name: &'static str,
    established: bool,
    eof: bool,
    lost_reported: bool,
}

impl<R> LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Wrap a reader.
    #[must_use]
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            codec: LineCodec::new(),
            name,
            established: false,
            eof: false,
            lost_reported: false,
        }
    }
}

impl LineSource<Stdin> {
    /// Read packets from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), "stdin")
    }
}

impl LineSource<TcpStream> {
    /// Connect to a bridge serving packets over TCP.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::TransportUnavailable`] if the bridge cannot
    /// be reached.
    pub async fn connect(addr: SocketAddr) -> Result<Self, IngestError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| IngestError::TransportUnavailable(format!("{addr}: {e}")))?;

        info!(%addr, "Connected to packet bridge");
        Ok(Self::new(stream, "tcp"))
    }
}

#[async_trait]
impl<R> PacketSource for LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<SourceEvent>, IngestError> {
        if !self.established {
            self.established = true;
            return Ok(Some(SourceEvent::Link(LinkStatus::Established)));
        }

        loop {
            if self.eof {
                // Flush a final line that had no terminator.
                let rest = self.buffer.split().freeze();
                if !is_blank(&rest) {
                    return Ok(Some(SourceEvent::Packet(rest)));
                }
                if !self.lost_reported {
                    self.lost_reported = true;
                    return Ok(Some(SourceEvent::Link(LinkStatus::Lost)));
                }
                return Ok(None);
            }

            if let Some(line) = self.codec.decode_from(&mut self.buffer)? {
                if is_blank(&line) {
                    continue;
                }
                return Ok(Some(SourceEvent::Packet(line)));
            }

            let read = self.reader.read_buf(&mut self.buffer).await?;
            if read == 0 {
                debug!(source = self.name, "Packet stream ended");
                self.eof = true;
            }
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(data: &'static [u8]) -> Option<SourceEvent> {
        Some(SourceEvent::Packet(bytes::Bytes::from_static(data)))
    }

    #[tokio::test]
    async fn test_line_source_sequence() {
        let input: &[u8] = b"{\"a\":1}\n\n{\"b\":2}\r\n{\"c\":3}";
        let mut source = LineSource::new(input, "test");

        assert_eq!(
            source.next_event().await.unwrap(),
            Some(SourceEvent::Link(LinkStatus::Established))
        );
        assert_eq!(source.next_event().await.unwrap(), packet(b"{\"a\":1}"));
        assert_eq!(source.next_event().await.unwrap(), packet(b"{\"b\":2}"));
        assert_eq!(source.next_event().await.unwrap(), packet(b"{\"c\":3}"));
        assert_eq!(
            source.next_event().await.unwrap(),
            Some(SourceEvent::Link(LinkStatus::Lost))
        );
        assert_eq!(source.next_event().await.unwrap(), None);
        assert_eq!(source.name(), "test");
    }

    #[tokio::test]
    async fn test_line_source_oversized_line_is_recoverable() {
        let mut input = vec![b'x'; crate::codec::MAX_LINE_SIZE + 1];
        input.extend_from_slice(b"\n{\"ok\":true}\n");
        let mut source = LineSource::new(input.as_slice(), "test");

        source.next_event().await.unwrap(); // Established
        let err = source.next_event().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(source.next_event().await.unwrap(), packet(b"{\"ok\":true}"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            LineSource::connect(addr).await,
            Err(IngestError::TransportUnavailable(_))
        ));
    }
}
