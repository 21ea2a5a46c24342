//! # meshdraw-ingest
//!
//! Ingest adapter for meshdraw: turns raw mesh packets into
//! normalized [`MeshEvent`](meshdraw_core::MeshEvent)s.
//!
//! A radio bridge (for example a Meshtastic serial client) writes one JSON
//! packet per line. This crate provides:
//!
//! - **codec** - Line framing and packet decoding
//! - **PacketSource** - Trait for anything that yields packets and link transitions
//! - **LineSource** - Newline-delimited JSON over stdin or TCP
//! - **ChannelSource** - In-process source fed through a bounded channel
//!
//! ```rust,ignore
//! use meshdraw_ingest::{codec, PacketSource, SourceEvent};
//!
//! async fn pump(mut source: impl PacketSource) {
//!     while let Ok(Some(event)) = source.next_event().await {
//!         if let SourceEvent::Packet(data) = event {
//!             let _ = codec::decode(&data);
//!         }
//!     }
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod lines;
pub mod traits;

pub use channel::{ChannelSender, ChannelSource};
pub use codec::{decode, DecodeError, LineCodec, PortNum};
pub use lines::LineSource;
pub use traits::{IngestError, PacketSource, SourceEvent};
