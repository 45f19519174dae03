//! Per-device change tracking.
//!
//! The store remembers the last summary reported by each device and whether it
//! changed since the last flush. It is a plain value owned by the reporter
//! loop, so it needs no locking.

use std::collections::BTreeMap;

/// Last known summary of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub summary: String,
    /// Set when the summary changed since the last flush
    pub changed: bool,
}

/// Outcome of applying a summary to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First summary for this device
    New,
    /// Summary differs from the stored one
    Changed,
    Unchanged,
}

/// Device id to last-known summary mapping.
///
/// Entries are kept ordered by device id so flushes come out in a stable order.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: BTreeMap<String, StateEntry>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest summary for a device.
    ///
    /// A new device is stored unflagged; the caller reports it immediately
    /// instead of waiting for the next flush.
    pub fn apply(&mut self, device_id: &str, summary: &str) -> Observation {
        match self.entries.get_mut(device_id) {
            Some(entry) if entry.summary == summary => Observation::Unchanged,
            Some(entry) => {
                entry.summary.clear();
                entry.summary.push_str(summary);
                entry.changed = true;
                Observation::Changed
            }
            None => {
                self.entries.insert(
                    device_id.to_string(),
                    StateEntry {
                        summary: summary.to_string(),
                        changed: false,
                    },
                );
                Observation::New
            }
        }
    }

    /// Take every flagged `(device_id, summary)` pair and clear the flags.
    pub fn drain_changed(&mut self) -> Vec<(String, String)> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.changed)
            .map(|(id, entry)| {
                entry.changed = false;
                (id.clone(), entry.summary.clone())
            })
            .collect()
    }

    pub fn get(&self, device_id: &str) -> Option<&StateEntry> {
        self.entries.get(device_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "AA:BB:CC:DD:EE:FF";

    #[test]
    fn test_first_apply_is_new_and_unflagged() {
        let mut store = StateStore::new();
        assert_eq!(store.apply(ID, "batt:50%"), Observation::New);
        assert_eq!(
            store.get(ID),
            Some(&StateEntry {
                summary: "batt:50%".to_string(),
                changed: false,
            })
        );
        assert!(store.drain_changed().is_empty());
    }

    #[test]
    fn test_same_summary_is_unchanged() {
        let mut store = StateStore::new();
        store.apply(ID, "batt:50%");
        assert_eq!(store.apply(ID, "batt:50%"), Observation::Unchanged);
        assert!(!store.get(ID).unwrap().changed);
    }

    #[test]
    fn test_change_then_drain_once() {
        let mut store = StateStore::new();
        store.apply(ID, "batt:50%");
        assert_eq!(store.apply(ID, "batt:49%"), Observation::Changed);

        assert_eq!(
            store.drain_changed(),
            vec![(ID.to_string(), "batt:49%".to_string())]
        );
        assert!(store.drain_changed().is_empty());
        assert_eq!(store.get(ID).unwrap().summary, "batt:49%");
    }

    #[test]
    fn test_multiple_changes_drain_latest() {
        let mut store = StateStore::new();
        store.apply(ID, "batt:50%");
        store.apply(ID, "batt:49%");
        store.apply(ID, "batt:48%");
        assert_eq!(
            store.drain_changed(),
            vec![(ID.to_string(), "batt:48%".to_string())]
        );
    }

    #[test]
    fn test_change_back_to_original_still_flagged() {
        let mut store = StateStore::new();
        store.apply(ID, "batt:50%");
        store.apply(ID, "batt:49%");
        assert_eq!(store.apply(ID, "batt:50%"), Observation::Changed);
        assert_eq!(store.drain_changed().len(), 1);
    }

    #[test]
    fn test_devices_tracked_independently() {
        let mut store = StateStore::new();
        let other = "11:22:33:44:55:66";

        store.apply(ID, "batt:50%");
        store.apply(other, "batt:90%");
        store.apply(other, "batt:89%");

        assert_eq!(store.get(ID).unwrap().summary, "batt:50%");
        assert!(!store.get(ID).unwrap().changed);
        assert_eq!(store.get(other).unwrap().summary, "batt:89%");
        assert_eq!(
            store.drain_changed(),
            vec![(other.to_string(), "batt:89%".to_string())]
        );
    }

    #[test]
    fn test_drain_ordered_by_device_id() {
        let mut store = StateStore::new();
        for id in ["cc", "aa", "bb"] {
            store.apply(id, "batt:50%");
            store.apply(id, "batt:49%");
        }
        let ids: Vec<String> = store.drain_changed().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["aa", "bb", "cc"]);
    }

    #[test]
    fn test_empty_store() {
        let mut store = StateStore::new();
        assert!(store.is_empty());
        assert!(store.get(ID).is_none());
        assert!(store.drain_changed().is_empty());
    }
}
