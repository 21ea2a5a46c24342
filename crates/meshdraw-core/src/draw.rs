//! Tiered prize draw.
//!
//! The draw is a pure function over a roster snapshot. Participants are
//! shuffled once, then each tier in priority order samples its winners
//! uniformly without replacement from whoever is left in the pool.
//!
//! ## Algorithm
//!
//! ```text
//! pool = shuffle(participants)
//! for tier in tiers:
//!     if pool is empty: stop          (later tiers are absent)
//!     k = min(tier.count, len(pool))
//!     for i in 0..k:                  (partial Fisher-Yates)
//!         j = random integer in [i, len(pool))
//!         swap(pool[i], pool[j])
//!     winners[tier] = pool.drain(0..k)
//! ```

use crate::roster::ParticipantId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::num::NonZeroU32;
use tracing::{debug, info};

/// A named prize level with a fixed number of winner slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeTier {
    /// Tier name shown to users.
    pub name: String,
    /// Number of winners drawn for this tier.
    pub count: NonZeroU32,
}

impl PrizeTier {
    /// Create a new prize tier.
    #[must_use]
    pub fn new(name: impl Into<String>, count: NonZeroU32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// A participant paired with the display name resolved at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Node id.
    pub id: ParticipantId,
    /// Display name (the id itself when the node never announced one).
    pub name: String,
}

impl Participant {
    /// Create a participant entry.
    #[must_use]
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A drawn winner.
pub type Winner = Participant;

/// Outcome of a draw: winners per tier, in tier priority order.
///
/// Tiers that were never reached because the pool ran out are absent,
/// not present with an empty list. Serializes as a JSON object whose keys
/// keep the tier order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawResult {
    tiers: Vec<(String, Vec<Winner>)>,
}

impl DrawResult {
    /// Winners for a tier, if the tier was drawn.
    #[must_use]
    pub fn tier(&self, name: &str) -> Option<&[Winner]> {
        self.tiers
            .iter()
            .find(|(tier, _)| tier == name)
            .map(|(_, winners)| winners.as_slice())
    }

    /// Names of the drawn tiers, in priority order.
    #[must_use]
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Iterate over `(tier, winners)` in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Winner])> {
        self.tiers
            .iter()
            .map(|(name, winners)| (name.as_str(), winners.as_slice()))
    }

    /// Total number of winners across every tier.
    #[must_use]
    pub fn winner_count(&self) -> usize {
        self.tiers.iter().map(|(_, winners)| winners.len()).sum()
    }

    /// Number of tiers present in the result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Check if no tier was drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl Serialize for DrawResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tiers.len()))?;
        for (name, winners) in &self.tiers {
            map.serialize_entry(name, winners)?;
        }
        map.end()
    }
}

/// Run a tiered draw over a snapshot of participants.
///
/// Every participant wins at most once. A tier whose slot count exceeds
/// the remaining pool takes the whole pool. The caller is expected to
/// reject empty rosters before drawing; an empty snapshot yields an
/// empty result.
pub fn draw<R: Rng>(
    participants: &[Participant],
    tiers: &[PrizeTier],
    rng: &mut R,
) -> DrawResult {
    let mut pool: Vec<Participant> = participants.to_vec();
    pool.shuffle(rng);

    let mut result = DrawResult::default();

    for tier in tiers {
        if pool.is_empty() {
            info!(tier = %tier.name, "Every participant has already won, ending draw early");
            break;
        }

        let k = (tier.count.get() as usize).min(pool.len());
        let len = pool.len();
        for i in 0..k {
            let j = rng.gen_range(i..len);
            pool.swap(i, j);
        }

        let winners: Vec<Winner> = pool.drain(..k).collect();
        debug!(
            tier = %tier.name,
            winners = winners.len(),
            remaining = pool.len(),
            "Tier drawn"
        );
        result.tiers.push((tier.name.clone(), winners));
    }

    result
}
