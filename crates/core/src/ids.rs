//! The ID registry — a single namespace of globally unique identifiers.
//!
//! Every agent, artifact, principal, and genesis proxy lives in one flat
//! map from ID to [`IdCategory`]. No two live entities may share an ID,
//! which eliminates ambiguity between (e.g.) an agent and an artifact that
//! happen to share a name.

use dashmap::DashMap;

use crate::error::KernelError;

/// The category an identifier is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdCategory {
    Agent,
    Artifact,
    Principal,
    Genesis,
}

/// Global identifier namespace. Single-writer per logical tick; readers
/// tolerate brief inconsistency only across await points.
#[derive(Debug, Default)]
pub struct IdRegistry {
    entries: DashMap<String, IdCategory>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers `id` under `category`. Fails with `IdCollision` if the id
    /// is already present under any category — collisions are rejected
    /// regardless of whether the category matches.
    pub fn register(&self, id: impl Into<String>, category: IdCategory) -> Result<(), KernelError> {
        let id = id.into();
        match self.entries.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(KernelError::IdCollision { id }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(category);
                tracing::debug!(%id, ?category, "id registered");
                Ok(())
            }
        }
    }

    /// Soft-removes `id` from the registry. Used only on lifecycle-end
    /// paths (e.g. tombstoning does NOT unregister — the id stays reserved
    /// forever; this is for categories that can legitimately vanish, like
    /// a cancelled mint submission id).
    pub fn unregister(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn lookup(&self, id: &str) -> Option<IdCategory> {
        self.entries.get(id).map(|entry| *entry)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids_by_category(&self, category: IdCategory) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| *entry.value() == category)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_collision_across_categories() {
        let registry = IdRegistry::new();
        registry.register("alice", IdCategory::Agent).unwrap();
        let err = registry.register("alice", IdCategory::Artifact).unwrap_err();
        assert!(matches!(err, KernelError::IdCollision { .. }));
        assert_eq!(registry.lookup("alice"), Some(IdCategory::Agent));
    }

    #[test]
    fn unregister_then_reregister_is_allowed() {
        let registry = IdRegistry::new();
        registry.register("tmp", IdCategory::Genesis).unwrap();
        registry.unregister("tmp");
        assert!(!registry.exists("tmp"));
        registry.register("tmp", IdCategory::Artifact).unwrap();
        assert_eq!(registry.lookup("tmp"), Some(IdCategory::Artifact));
    }

    #[test]
    fn ids_by_category_enumerates_only_that_category() {
        let registry = IdRegistry::new();
        registry.register("a1", IdCategory::Agent).unwrap();
        registry.register("a2", IdCategory::Agent).unwrap();
        registry.register("art1", IdCategory::Artifact).unwrap();
        let mut agents = registry.ids_by_category(IdCategory::Agent);
        agents.sort();
        assert_eq!(agents, vec!["a1".to_string(), "a2".to_string()]);
    }
}
