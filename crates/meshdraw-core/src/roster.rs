//! Participant roster.
//!
//! The roster is the set of nodes that have asked to join the next draw.

use std::collections::HashSet;
use tracing::debug;

/// A participant identifier (mesh node address such as `!a1b2c3d4`).
pub type ParticipantId = String;

/// Set of participants registered for the next draw.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    members: HashSet<ParticipantId>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant.
    ///
    /// Returns `true` if this is a new registration, `false` if the
    /// participant was already on the roster.
    pub fn register(&mut self, id: impl Into<ParticipantId>) -> bool {
        let id = id.into();
        if self.members.contains(&id) {
            return false;
        }

        debug!(participant = %id, "Roster: registered");
        self.members.insert(id);
        true
    }

    /// Check if a participant is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Number of registered participants.
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Check if the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Copy of the current members. Order is unspecified.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ParticipantId> {
        self.members.iter().cloned().collect()
    }

    /// Remove the given participants, leaving everyone else registered.
    ///
    /// Returns the number of participants actually removed.
    pub fn remove_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        ids.into_iter()
            .filter(|id| self.members.remove(*id))
            .count()
    }

    /// Remove every participant.
    pub fn clear(&mut self) {
        self.members.clear();
    }
}
