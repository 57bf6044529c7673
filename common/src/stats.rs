// Aggregates over scheduled items for reporting

use crate::models::{ItemStatus, ScheduledItem};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of upcoming items in a snapshot
pub const UPCOMING_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsOverview {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
    /// Percentage of all items that were sent, two decimals
    pub success_rate: f64,
}

/// Analytics snapshot of the schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStats {
    pub overview: StatsOverview,
    /// Item count per fire date, keyed `YYYY-MM-DD`
    pub by_date: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// Pending items firing after the snapshot time, soonest first
    pub upcoming: Vec<ScheduledItem>,
}

impl ScheduleStats {
    pub fn from_items(items: &[ScheduledItem], now: NaiveDateTime) -> Self {
        let mut stats = Self::default();

        for item in items {
            stats.overview.total += 1;
            match item.status {
                ItemStatus::Pending => stats.overview.pending += 1,
                ItemStatus::Sent => stats.overview.sent += 1,
                ItemStatus::Failed => stats.overview.failed += 1,
            }
            *stats
                .by_date
                .entry(item.fire_date.format("%Y-%m-%d").to_string())
                .or_insert(0) += 1;
            *stats.by_category.entry(item.category.clone()).or_insert(0) += 1;
        }

        stats.overview.success_rate = success_rate(stats.overview.sent, stats.overview.total);

        let mut upcoming: Vec<&ScheduledItem> = items
            .iter()
            .filter(|item| item.is_pending() && item.fire_at() > now)
            .collect();
        upcoming.sort_by(|a, b| a.fire_at().cmp(&b.fire_at()).then(a.id.cmp(&b.id)));
        stats.upcoming = upcoming.into_iter().take(UPCOMING_LIMIT).cloned().collect();

        stats
    }
}

fn success_rate(sent: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (sent as f64 / total as f64 * 10_000.0).round() / 100.0
}
