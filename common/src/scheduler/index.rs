use crate::models::{MissedFirePolicy, ScheduledItem};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory index of items waiting to fire
///
/// Only pending items live here. Claiming removes an item, so a claimed item
/// can never be selected again.
#[derive(Debug, Default)]
pub struct PendingIndex {
    items: HashMap<Uuid, ScheduledItem>,
}

impl PendingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from items loaded at startup; non-pending items are skipped
    pub fn from_items(items: impl IntoIterator<Item = ScheduledItem>) -> Self {
        let mut index = Self::new();
        for item in items {
            index.insert(item);
        }
        index
    }

    /// Add a pending item, returns false if it is not pending
    pub fn insert(&mut self, item: ScheduledItem) -> bool {
        if !item.is_pending() {
            return false;
        }
        self.items.insert(item.id, item);
        true
    }

    pub fn remove(&mut self, id: Uuid) -> Option<ScheduledItem> {
        self.items.remove(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove and return every item due at `now`
    ///
    /// Returned in a stable order: fire date/time, then creation time, then id.
    pub fn claim_due(&mut self, now: NaiveDateTime, policy: MissedFirePolicy) -> Vec<ScheduledItem> {
        let due_ids: Vec<Uuid> = self
            .items
            .values()
            .filter(|item| item.is_due(now, policy))
            .map(|item| item.id)
            .collect();

        let mut claimed: Vec<ScheduledItem> = due_ids
            .into_iter()
            .filter_map(|id| self.items.remove(&id))
            .collect();
        claimed.sort_by(|a, b| {
            a.fire_at()
                .cmp(&b.fire_at())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        claimed
    }

    /// Copy of all indexed items, ordered by fire date/time
    pub fn snapshot(&self) -> Vec<ScheduledItem> {
        let mut items: Vec<ScheduledItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.fire_at().cmp(&b.fire_at()).then(a.id.cmp(&b.id)));
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FireTime, ItemStatus, DEFAULT_CATEGORY};
    use chrono::{NaiveDate, Utc};

    fn item(hour: u32, minute: u32) -> ScheduledItem {
        ScheduledItem::new(
            "x@example.com",
            "subject",
            "body",
            NaiveDate::from_ymd_opt(2025, 7, 6).unwrap(),
            FireTime::from_hm(hour, minute).unwrap(),
            DEFAULT_CATEGORY,
            Vec::new(),
        )
    }

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 6)
            .unwrap()
            .and_hms_opt(hour, minute, 15)
            .unwrap()
    }

    #[test]
    fn test_claim_removes_due_items() {
        let mut index = PendingIndex::from_items(vec![item(10, 0), item(11, 0)]);
        let claimed = index.claim_due(at(10, 0), MissedFirePolicy::CatchUp);
        assert_eq!(claimed.len(), 1);
        assert_eq!(index.len(), 1);
        assert!(!index.contains(claimed[0].id));

        // Nothing left to claim for the same minute
        assert!(index.claim_due(at(10, 0), MissedFirePolicy::CatchUp).is_empty());
    }

    #[test]
    fn test_claim_order_is_stable() {
        let late = item(9, 30);
        let early = item(8, 0);
        let mut index = PendingIndex::from_items(vec![late.clone(), early.clone()]);
        let claimed = index.claim_due(at(10, 0), MissedFirePolicy::CatchUp);
        assert_eq!(
            claimed.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![early.id, late.id]
        );
    }

    #[test]
    fn test_exact_minute_leaves_missed_items() {
        let missed = item(9, 0);
        let mut index = PendingIndex::from_items(vec![missed.clone(), item(10, 0)]);
        let claimed = index.claim_due(at(10, 0), MissedFirePolicy::ExactMinute);
        assert_eq!(claimed.len(), 1);
        assert!(index.contains(missed.id));
    }

    #[test]
    fn test_non_pending_items_are_not_indexed() {
        let mut sent = item(10, 0);
        sent.complete(ItemStatus::Sent, Utc::now());
        let mut index = PendingIndex::new();
        assert!(!index.insert(sent));
        assert!(index.is_empty());
    }
}
