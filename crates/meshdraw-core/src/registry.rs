//! Display name registry.
//!
//! Node info packets announce a human readable name for a mesh node.
//! The registry keeps the most recent name per node and is consulted
//! whenever a participant is shown to a user.

use crate::roster::ParticipantId;
use std::collections::HashMap;
use tracing::debug;

/// Mapping of participant id to display name.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    names: HashMap<ParticipantId, String>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display name for a node.
    ///
    /// Returns `true` if the stored name changed (new node or renamed),
    /// `false` if the name was already current.
    pub fn upsert(&mut self, id: impl Into<ParticipantId>, name: impl Into<String>) -> bool {
        let id = id.into();
        let name = name.into();

        if self.names.get(&id) == Some(&name) {
            return false;
        }

        debug!(node = %id, name = %name, "Registry: name updated");
        self.names.insert(id, name);
        true
    }

    /// Resolve the display name for a node, falling back to the id itself.
    #[must_use]
    pub fn lookup(&self, id: &str) -> String {
        self.names
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Check whether a node has a known name.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    /// Number of known nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if no node has announced itself yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_upsert() {
        let mut registry = Registry::new();

        assert!(registry.upsert("!a1", "Alice"));
        assert!(!registry.upsert("!a1", "Alice")); // Unchanged
        assert!(registry.upsert("!a1", "Alice Liddell"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("!a1"), "Alice Liddell");
    }

    #[test]
    fn test_registry_lookup_fallback() {
        let registry = Registry::new();
        assert_eq!(registry.lookup("!ffff"), "!ffff");
        assert!(!registry.contains("!ffff"));
        assert!(registry.is_empty());
    }
}
