// Property-based tests for tick dispatch under simulated time

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use common::delivery::DeliveryGateway;
use common::errors::DeliveryError;
use common::models::{Envelope, MissedFirePolicy, ScheduleRequest};
use common::scheduler::{DispatchConfig, DispatchEngine, ManualClock, Scheduler};
use common::store::MemoryItemStore;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Gateway recording how often each recipient was delivered to
#[derive(Default)]
struct RecordingGateway {
    deliveries: Mutex<HashMap<String, usize>>,
}

impl RecordingGateway {
    fn count(&self, recipient: &str) -> usize {
        self.deliveries
            .lock()
            .unwrap()
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    async fn deliver(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        *self
            .deliveries
            .lock()
            .unwrap()
            .entry(envelope.recipient.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, 6)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

/// Minute offsets from 09:00 for each item and tick
fn schedule_strategy() -> impl Strategy<Value = (Vec<i64>, Vec<i64>)> {
    (
        prop::collection::vec(0i64..180, 1..20),
        prop::collection::vec(0i64..240, 1..30),
    )
}

fn run(policy: MissedFirePolicy, item_offsets: &[i64], mut tick_offsets: Vec<i64>) -> (Vec<usize>, Vec<i64>) {
    tick_offsets.sort_unstable();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let clock = ManualClock::at(base());
        let gateway = Arc::new(RecordingGateway::default());
        let engine = DispatchEngine::init(
            DispatchConfig {
                missed_fire_policy: policy,
                shutdown_grace: Duration::ZERO,
                immediate_send_pause: Duration::ZERO,
                ..DispatchConfig::default()
            },
            Arc::new(MemoryItemStore::new()),
            gateway.clone(),
            Arc::new(clock.clone()),
        )
        .await;

        for (i, offset) in item_offsets.iter().enumerate() {
            let fire_at = base() + ChronoDuration::minutes(*offset);
            engine
                .schedule(ScheduleRequest {
                    recipient: format!("user{}@example.com", i),
                    subject: "subject".to_string(),
                    body: "body".to_string(),
                    fire_date: fire_at.format("%Y-%m-%d").to_string(),
                    fire_time: fire_at.format("%H:%M").to_string(),
                    category: None,
                    attachments: Vec::new(),
                })
                .await
                .unwrap();
        }

        for offset in &tick_offsets {
            // Land somewhere inside the minute, as a real tick would
            clock.set(base() + ChronoDuration::minutes(*offset) + ChronoDuration::seconds(17));
            engine.tick().await;
            // A repeated tick in the same minute must be a no-op
            engine.tick().await;
        }

        let counts = (0..item_offsets.len())
            .map(|i| gateway.count(&format!("user{}@example.com", i)))
            .collect();
        (counts, tick_offsets)
    })
}

/// *For any* set of items and sequence of ticks, no item is delivered more
/// than once, and under catch-up every item whose minute has passed by the
/// last tick is delivered exactly once.
#[test]
fn property_catch_up_delivers_each_due_item_exactly_once() {
    proptest!(|((item_offsets, tick_offsets) in schedule_strategy())| {
        let (counts, ticks) = run(MissedFirePolicy::CatchUp, &item_offsets, tick_offsets);
        let last_tick = *ticks.last().unwrap();

        for (offset, count) in item_offsets.iter().zip(&counts) {
            prop_assert!(*count <= 1, "item at +{}m delivered {} times", offset, count);
            let expected = usize::from(*offset <= last_tick);
            prop_assert_eq!(*count, expected, "item at +{}m, last tick +{}m", offset, last_tick);
        }
    });
}

/// *For any* set of items and sequence of ticks, an item under the
/// exact-minute policy is delivered once if some tick observed its minute
/// and never otherwise.
#[test]
fn property_exact_minute_fires_only_on_observed_minute() {
    proptest!(|((item_offsets, tick_offsets) in schedule_strategy())| {
        let (counts, ticks) = run(MissedFirePolicy::ExactMinute, &item_offsets, tick_offsets);

        for (offset, count) in item_offsets.iter().zip(&counts) {
            let expected = usize::from(ticks.contains(offset));
            prop_assert_eq!(*count, expected, "item at +{}m", offset);
        }
    });
}
