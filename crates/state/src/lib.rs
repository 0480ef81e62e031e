use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

pub const FIRST_PERIOD: u32 = 1;

/// Last persisted position of a tracked match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub last_clock: u32,
    pub last_period: u32,
}

impl EntityState {
    /// Periods start at 1; a zero period coming from storage is clamped.
    pub fn new(last_clock: u32, last_period: u32) -> Self {
        Self {
            last_clock,
            last_period: last_period.max(FIRST_PERIOD),
        }
    }
}

/// In-memory map of entity id to [`EntityState`].
///
/// Handles are cheap to clone and share one map. The collector is the only
/// writer; status readers take a copy through [`StateStore::snapshot`].
#[derive(Clone, Default)]
pub struct StateStore {
    entries: Arc<RwLock<HashMap<String, EntityState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.entries
            .read()
            .ok()
            .and_then(|guard| guard.get(entity_id).copied())
    }

    pub fn set(&self, entity_id: &str, state: EntityState) {
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(entity_id.to_string(), state);
        }
    }

    pub fn remove(&self, entity_id: &str) -> Option<EntityState> {
        self.entries
            .write()
            .ok()
            .and_then(|mut guard| guard.remove(entity_id))
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.write() {
            guard.clear();
        }
    }

    /// Sorted copy of every tracked entity.
    pub fn snapshot(&self) -> BTreeMap<String, EntityState> {
        self.entries
            .read()
            .map(|guard| guard.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_roundtrip() {
        let store = StateStore::new();
        assert!(store.get("E1").is_none());

        store.set("E1", EntityState::new(10, 1));
        assert_eq!(store.get("E1"), Some(EntityState::new(10, 1)));

        store.set("E1", EntityState::new(23, 1));
        assert_eq!(store.len(), 1, "one entry per entity id");
        assert_eq!(store.get("E1").map(|s| s.last_clock), Some(23));

        assert_eq!(store.remove("E1"), Some(EntityState::new(23, 1)));
        assert!(store.is_empty());
        assert!(store.remove("E1").is_none());
    }

    #[test]
    fn clones_share_the_same_map() {
        let store = StateStore::new();
        let reader = store.clone();
        store.set("E2", EntityState::new(30, 2));
        assert_eq!(reader.get("E2"), Some(EntityState::new(30, 2)));

        reader.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_is_sorted_and_detached() {
        let store = StateStore::new();
        store.set("b", EntityState::new(5, 1));
        store.set("a", EntityState::new(44, 2));

        let snap = store.snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        store.remove("a");
        assert_eq!(snap.len(), 2);
        assert_eq!(store.tracked_ids(), vec!["b".to_string()]);
    }

    #[test]
    fn zero_period_is_clamped() {
        assert_eq!(EntityState::new(0, 0).last_period, FIRST_PERIOD);
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let json = serde_json::to_value(EntityState::new(31, 2)).expect("serialize");
        assert_eq!(json, serde_json::json!({"last_clock": 31, "last_period": 2}));
    }
}
