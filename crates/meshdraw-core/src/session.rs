//! The draw session state machine.
//!
//! A [`Session`] owns the registry, the roster, and the draw phase behind a
//! single mutex. Ingest callbacks and HTTP handlers share it by cloning the
//! handle; every public operation takes the lock exactly once, so readers
//! never observe a half-applied transition.
//!
//! ```text
//!            trigger_draw            completion
//!   Idle ─────────────────▶ Running ────────────▶ Completed
//!    ▲                        │                      │
//!    └──────── reset ─────────┴──────── reset ───────┘
//! ```
//!
//! The draw itself runs on a spawned task, outside the lock, over a snapshot
//! taken when the draw was triggered. Each trigger and each reset bumps a
//! generation counter; a completion whose generation is no longer current
//! is dropped.

use crate::draw::{draw, DrawResult, Participant, PrizeTier};
use crate::event::{EventOutcome, MeshEvent};
use crate::registry::Registry;
use crate::roster::{ParticipantId, Roster};
use dashmap::DashMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Default registration keyword ("I want to join the draw").
pub const DEFAULT_KEYWORD: &str = "我要抽奖";

/// Default cosmetic delay before a draw resolves.
pub const DEFAULT_DRAW_DELAY: Duration = Duration::from_secs(2);

/// Session errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// A draw is already running.
    #[error("A draw is already in progress")]
    AlreadyRunning,

    /// Nobody is registered.
    #[error("No participants registered")]
    NoParticipants,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Phrase a text message must contain to register its sender.
    pub keyword: String,
    /// Prize tiers in draw priority order.
    pub tiers: Vec<PrizeTier>,
    /// Delay between triggering and resolving a draw, so clients can
    /// show a drawing state.
    pub draw_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.to_string(),
            tiers: default_tiers(),
            draw_delay: DEFAULT_DRAW_DELAY,
        }
    }
}

/// The stock three-tier prize table.
#[must_use]
pub fn default_tiers() -> Vec<PrizeTier> {
    [("一等奖", 1), ("二等奖", 3), ("三等奖", 5)]
        .into_iter()
        .filter_map(|(name, count)| NonZeroU32::new(count).map(|c| PrizeTier::new(name, c)))
        .collect()
}

/// Draw phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawPhase {
    /// No draw has run since start or the last reset.
    Idle,
    /// A draw is being computed.
    Running,
    /// The last draw finished with this result.
    Completed(DrawResult),
}

/// What happened to a spawned draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The result was published.
    Published {
        /// Total winners across all tiers.
        winners: usize,
    },
    /// The session was reset while the draw ran; the result was dropped.
    Discarded,
}

/// Handle to a triggered draw.
///
/// Dropping the handle detaches the draw; it still completes.
#[derive(Debug)]
pub struct DrawHandle {
    generation: u64,
    join: JoinHandle<DrawOutcome>,
}

impl DrawHandle {
    /// Generation token of this draw.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the draw to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the draw task panicked or was aborted.
    pub async fn wait(self) -> Result<DrawOutcome, JoinError> {
        self.join.await
    }
}

/// A consistent view of the session at one instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    /// Registered participants, sorted by id.
    pub participants: Vec<Participant>,
    /// Number of registered participants.
    pub participant_count: usize,
    /// Registration keyword.
    pub keyword: String,
    /// Prize table, in priority order.
    #[serde(serialize_with = "serialize_prizes")]
    pub prizes: Vec<PrizeTier>,
    /// Whether a draw is running.
    pub in_progress: bool,
    /// Result of the last completed draw.
    pub results: Option<DrawResult>,
    /// Milliseconds since the epoch of the last visible change.
    pub last_update: u64,
}

fn serialize_prizes<S: Serializer>(tiers: &[PrizeTier], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(tiers.len()))?;
    for tier in tiers {
        map.serialize_entry(&tier.name, &tier.count)?;
    }
    map.end()
}

/// State guarded by the session lock.
#[derive(Debug)]
struct SessionState {
    registry: Registry,
    roster: Roster,
    /// Snapshot members of the running draw that have not registered again.
    /// Only these leave the roster when the draw completes.
    in_draw: HashSet<ParticipantId>,
    phase: DrawPhase,
    generation: u64,
    last_update: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
            roster: Roster::new(),
            in_draw: HashSet::new(),
            phase: DrawPhase::Idle,
            generation: 0,
            last_update: now_millis(),
        }
    }

    /// Bump the update timestamp; it strictly increases so pollers
    /// comparing it for equality never miss a change.
    fn touch(&mut self) {
        self.last_update = now_millis().max(self.last_update + 1);
    }
}

struct Shared {
    config: SessionConfig,
    state: Mutex<SessionState>,
    /// Text messages seen per sender. Statistics only, kept outside the lock.
    message_counts: DashMap<ParticipantId, u64>,
}

/// The process-wide draw session.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Create a session with the given configuration.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        info!(
            keyword = %config.keyword,
            tiers = config.tiers.len(),
            "Creating draw session"
        );
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(SessionState::new()),
                message_counts: DashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Registration keyword.
    #[must_use]
    pub fn keyword(&self) -> &str {
        &self.shared.config.keyword
    }

    /// Apply a normalized ingest event.
    pub fn handle_event(&self, event: MeshEvent) -> EventOutcome {
        match event {
            MeshEvent::TextMessage { sender_id, text } => {
                if !text.is_empty() {
                    *self
                        .shared
                        .message_counts
                        .entry(sender_id.clone())
                        .or_default() += 1;
                }

                if text.contains(self.keyword()) && self.register(sender_id) {
                    EventOutcome::Registered
                } else {
                    EventOutcome::Ignored
                }
            }
            MeshEvent::NodeInfo {
                node_id,
                display_name,
            } => {
                if self.upsert_node(node_id, display_name) {
                    EventOutcome::NodeUpdated
                } else {
                    EventOutcome::Ignored
                }
            }
        }
    }

    /// Register a participant for the next draw.
    ///
    /// Accepted while a draw is running; the running draw already holds
    /// its snapshot, so the newcomer joins the following one. A member of
    /// that snapshot who registers again is kept for the following one too.
    ///
    /// Returns `true` on a new registration.
    pub fn register(&self, id: impl Into<ParticipantId>) -> bool {
        let id = id.into();
        let mut state = self.lock();

        if !state.roster.register(id.clone()) {
            // A snapshot member sending the keyword again mid-draw stays on
            // for the next round.
            if state.phase != DrawPhase::Running || !state.in_draw.remove(&id) {
                return false;
            }
        }
        state.touch();

        info!(
            participant = %id,
            name = %state.registry.lookup(&id),
            total = state.roster.size(),
            "Participant registered"
        );
        true
    }

    /// Record a node's display name.
    ///
    /// Returns `true` if the name was new or changed.
    pub fn upsert_node(&self, id: impl Into<ParticipantId>, name: impl Into<String>) -> bool {
        let id = id.into();
        let name = name.into();
        let mut state = self.lock();

        if !state.registry.upsert(id.clone(), name.clone()) {
            return false;
        }
        state.touch();

        info!(node = %id, name = %name, "Node info updated");
        true
    }

    /// Start a draw over the current roster.
    ///
    /// Must be called from within a tokio runtime; the draw runs on a
    /// spawned task and the returned handle may be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyRunning`] if a draw is in progress
    /// and [`SessionError::NoParticipants`] if the roster is empty. Neither
    /// changes the session.
    pub fn trigger_draw(&self) -> Result<DrawHandle, SessionError> {
        let (generation, snapshot) = {
            let mut state = self.lock();

            if state.phase == DrawPhase::Running {
                return Err(SessionError::AlreadyRunning);
            }
            if state.roster.is_empty() {
                return Err(SessionError::NoParticipants);
            }

            let snapshot: Vec<Participant> = state
                .roster
                .snapshot()
                .into_iter()
                .map(|id| {
                    let name = state.registry.lookup(&id);
                    Participant::new(id, name)
                })
                .collect();

            state.in_draw = snapshot.iter().map(|p| p.id.clone()).collect();
            state.phase = DrawPhase::Running;
            state.generation += 1;
            state.touch();
            (state.generation, snapshot)
        };

        info!(
            generation,
            participants = snapshot.len(),
            "Draw started"
        );

        let session = self.clone();
        let join = tokio::spawn(async move { session.run_draw(generation, snapshot).await });

        Ok(DrawHandle { generation, join })
    }

    async fn run_draw(self, generation: u64, snapshot: Vec<Participant>) -> DrawOutcome {
        let delay = self.shared.config.draw_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = draw(&snapshot, &self.shared.config.tiers, &mut rand::thread_rng());
        self.complete(generation, result)
    }

    /// Publish a finished draw if it still belongs to the current round.
    fn complete(&self, generation: u64, result: DrawResult) -> DrawOutcome {
        let mut state = self.lock();

        if state.generation != generation || state.phase != DrawPhase::Running {
            warn!(
                generation,
                current = state.generation,
                "Session was reset during the draw, discarding result"
            );
            return DrawOutcome::Discarded;
        }

        let winners = result.winner_count();
        let tiers = result.len();
        let drawn = std::mem::take(&mut state.in_draw);
        state.roster.remove_all(drawn.iter().map(String::as_str));
        state.phase = DrawPhase::Completed(result);
        state.touch();

        info!(
            generation,
            winners,
            tiers,
            carried_over = state.roster.size(),
            "Draw completed"
        );

        DrawOutcome::Published { winners }
    }

    /// Clear the roster and any result, returning to idle.
    ///
    /// A draw still running when this is called will be discarded.
    pub fn reset(&self) {
        let mut state = self.lock();

        let was_running = state.phase == DrawPhase::Running;
        state.roster.clear();
        state.in_draw.clear();
        state.phase = DrawPhase::Idle;
        state.generation += 1;
        state.touch();

        info!(was_running, "Session reset");
    }

    /// Consistent snapshot of the session for display.
    #[must_use]
    pub fn status(&self) -> StatusView {
        let state = self.lock();

        let mut participants: Vec<Participant> = state
            .roster
            .snapshot()
            .into_iter()
            .map(|id| {
                let name = state.registry.lookup(&id);
                Participant::new(id, name)
            })
            .collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));

        let results = match &state.phase {
            DrawPhase::Completed(result) => Some(result.clone()),
            _ => None,
        };

        StatusView {
            participant_count: participants.len(),
            participants,
            keyword: self.shared.config.keyword.clone(),
            prizes: self.shared.config.tiers.clone(),
            in_progress: state.phase == DrawPhase::Running,
            results,
            last_update: state.last_update,
        }
    }

    /// Current draw phase.
    #[must_use]
    pub fn phase(&self) -> DrawPhase {
        self.lock().phase.clone()
    }

    /// Number of registered participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.lock().roster.size()
    }

    /// Number of nodes with a known display name.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Display name for a node.
    #[must_use]
    pub fn display_name(&self, id: &str) -> String {
        self.lock().registry.lookup(id)
    }

    /// Timestamp of the last visible change.
    #[must_use]
    pub fn last_update(&self) -> u64 {
        self.lock().last_update
    }

    /// Text messages seen per sender, busiest first.
    #[must_use]
    pub fn message_counts(&self) -> Vec<(ParticipantId, u64)> {
        let mut counts: Vec<(ParticipantId, u64)> = self
            .shared
            .message_counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        debug!(senders = counts.len(), "Collected message counts");
        counts
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
