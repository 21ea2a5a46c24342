//! # meshdraw-core
//!
//! Core state and draw logic for the meshdraw prize draw.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Node id to display name lookup
//! - **Roster** - Set of participants eligible for the next draw
//! - **Draw** - Tiered sampling without replacement
//! - **Session** - The draw state machine shared by ingest and the API
//! - **Event** - Normalized events delivered by the ingest adapter
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Ingest    │────▶│   Session   │────▶│    Draw     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │
//!                        ▼       ▼
//!               ┌──────────┐ ┌──────────┐
//!               │ Registry │ │  Roster  │
//!               └──────────┘ └──────────┘
//! ```

pub mod draw;
pub mod event;
pub mod registry;
pub mod roster;
pub mod session;

pub use draw::{draw, DrawResult, Participant, PrizeTier, Winner};
pub use event::{EventOutcome, LinkStatus, MeshEvent};
pub use registry::Registry;
pub use roster::{ParticipantId, Roster};
pub use session::{
    DrawHandle, DrawOutcome, DrawPhase, Session, SessionConfig, SessionError, StatusView,
};
