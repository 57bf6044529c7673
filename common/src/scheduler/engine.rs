// Dispatch engine: owns the pending index and drives the periodic tick

use super::clock::Clock;
use super::index::PendingIndex;
use super::validation::{build_bulk_items, build_item};
use crate::config;
use crate::delivery::DeliveryGateway;
use crate::errors::{DeliveryError, ScheduleError, StoreError};
use crate::models::{
    BulkScheduleRequest, Envelope, ItemStatus, MissedFirePolicy, ScheduleRequest, ScheduledItem,
};
use crate::stats::ScheduleStats;
use crate::store::{ItemStore, MemoryItemStore};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Runtime knobs for the dispatch engine
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub tick_interval: Duration,
    pub missed_fire_policy: MissedFirePolicy,
    /// Upper bound on deliveries in flight within one tick
    pub max_concurrent_deliveries: usize,
    pub shutdown_grace: Duration,
    pub immediate_send_pause: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            missed_fire_policy: MissedFirePolicy::CatchUp,
            max_concurrent_deliveries: 8,
            shutdown_grace: Duration::from_secs(2),
            immediate_send_pause: Duration::from_millis(2000),
        }
    }
}

impl From<&config::SchedulerConfig> for DispatchConfig {
    fn from(config: &config::SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.tick_interval_seconds),
            missed_fire_policy: config.missed_fire_policy,
            max_concurrent_deliveries: config.max_concurrent_deliveries.max(1),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
            immediate_send_pause: Duration::from_millis(config.immediate_send_pause_ms),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Terminal status writes the store did not accept
    pub persist_failures: usize,
}

struct DispatchOutcome {
    status: ItemStatus,
    persisted: bool,
}

/// Lifecycle of the periodic tick
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run the tick loop until `stop` is called
    async fn start(&self);

    /// Signal the loop to exit and wait out the grace period
    async fn stop(&self);

    /// Claim every due item and deliver it once
    async fn tick(&self) -> TickReport;
}

pub struct DispatchEngine {
    config: DispatchConfig,
    store: Arc<dyn ItemStore>,
    /// Records of items whose durable insert failed
    unpersisted: MemoryItemStore,
    gateway: Arc<dyn DeliveryGateway>,
    clock: Arc<dyn Clock>,
    index: Mutex<PendingIndex>,
    tick_lock: Mutex<()>,
    stopping: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl DispatchEngine {
    /// Build the engine and load pending items from the store
    ///
    /// An unreachable store is not fatal: the engine starts with an empty
    /// index and newly scheduled items fall back to memory.
    pub async fn init(
        config: DispatchConfig,
        store: Arc<dyn ItemStore>,
        gateway: Arc<dyn DeliveryGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let index = match store.find_pending().await {
            Ok(items) => {
                info!(pending = items.len(), "Loaded pending items from store");
                PendingIndex::from_items(items)
            }
            Err(e) => {
                warn!(error = %e, "Item store unavailable at startup, starting with empty index");
                PendingIndex::new()
            }
        };
        telemetry::update_pending_count(index.len());

        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            store,
            unpersisted: MemoryItemStore::new(),
            gateway,
            clock,
            index: Mutex::new(index),
            tick_lock: Mutex::new(()),
            stopping: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Spawn the tick loop on the runtime
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.start().await })
    }

    pub async fn pending_count(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Validate and register one item, returning its id
    #[instrument(skip(self, request), fields(recipient = %request.recipient))]
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<Uuid, ScheduleError> {
        let item = build_item(request)?;
        let id = item.id;
        self.enqueue(item).await?;
        info!(item_id = %id, "Item scheduled");
        Ok(id)
    }

    /// Validate every recipient first, then register one item per recipient
    #[instrument(skip(self, request), fields(recipients = request.recipients.len()))]
    pub async fn schedule_bulk(
        &self,
        request: BulkScheduleRequest,
    ) -> Result<Vec<Uuid>, ScheduleError> {
        let items = build_bulk_items(request)?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = item.id;
            if let Err(e) = self.enqueue(item).await {
                warn!(enqueued = ids.len(), error = %e, "Bulk schedule failed, rolling back");
                for enqueued in &ids {
                    self.discard(*enqueued).await;
                }
                return Err(e);
            }
            ids.push(id);
        }
        info!(count = ids.len(), "Bulk items scheduled");
        Ok(ids)
    }

    // Drop an item registered by this call; it stays out of the index even if
    // the store cannot be reached
    async fn discard(&self, id: Uuid) {
        {
            let mut index = self.index.lock().await;
            index.remove(id);
            telemetry::update_pending_count(index.len());
        }

        if self.unpersisted.delete(id).await.is_ok() {
            return;
        }
        if let Err(e) = self.store.delete(id).await {
            error!(item_id = %id, error = %e, "Failed to remove rolled back item from store");
        }
    }

    async fn enqueue(&self, item: ScheduledItem) -> Result<(), ScheduleError> {
        match self.store.insert(&item).await {
            Ok(()) => {}
            Err(e) if e.is_unavailable() => {
                warn!(item_id = %item.id, error = %e, "Store unavailable, keeping item in memory only");
                telemetry::record_store_fallback();
                self.unpersisted.insert(&item).await?;
            }
            Err(e) => return Err(e.into()),
        }

        let mut index = self.index.lock().await;
        index.insert(item);
        telemetry::update_pending_count(index.len());
        Ok(())
    }

    /// Remove a pending item so it never fires
    ///
    /// Items that already fired keep their record and yield `NotFound`.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<(), ScheduleError> {
        let removed = {
            let mut index = self.index.lock().await;
            let removed = index.remove(id);
            telemetry::update_pending_count(index.len());
            removed
        };

        if self.unpersisted.delete(id).await.is_ok() {
            info!("Memory-only item cancelled");
            return Ok(());
        }

        match self.store.delete(id).await {
            Ok(()) => {
                info!("Item cancelled");
                Ok(())
            }
            // Indexed but never reached the store
            Err(StoreError::NotFound(_)) if removed.is_some() => Ok(()),
            Err(StoreError::NotFound(_)) => Err(ScheduleError::NotFound(id)),
            Err(e) => {
                if let Some(item) = removed {
                    let mut index = self.index.lock().await;
                    index.insert(item);
                    telemetry::update_pending_count(index.len());
                }
                warn!(error = %e, "Cancel failed, item left pending");
                Err(e.into())
            }
        }
    }

    /// Every known item ordered by fire date/time
    pub async fn list(&self) -> Vec<ScheduledItem> {
        let memory_only = self.unpersisted.list_all().await.unwrap_or_default();
        let known: HashSet<Uuid> = memory_only.iter().map(|item| item.id).collect();

        let primary = match self.store.list_all().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Store unavailable, listing from in-memory index");
                self.index.lock().await.snapshot()
            }
        };

        let mut items: Vec<ScheduledItem> = primary
            .into_iter()
            .filter(|item| !known.contains(&item.id))
            .chain(memory_only)
            .collect();
        items.sort_by(|a, b| {
            a.fire_at()
                .cmp(&b.fire_at())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        items
    }

    pub async fn stats(&self) -> ScheduleStats {
        let items = self.list().await;
        ScheduleStats::from_items(&items, self.clock.local_now())
    }

    /// Deliver right away without recording an item
    #[instrument(skip(self, envelope), fields(recipient = %envelope.recipient))]
    pub async fn send_now(&self, envelope: &Envelope) -> Result<(), DeliveryError> {
        let result = self.gateway.deliver(envelope).await;
        telemetry::record_immediate_send(result.is_ok());
        match &result {
            Ok(()) => info!("Immediate send delivered"),
            Err(e) => warn!(error = %e, "Immediate send failed"),
        }
        result
    }

    /// Send each envelope in order, pausing between sends
    pub async fn send_now_batch(&self, envelopes: &[Envelope]) -> Vec<Result<(), DeliveryError>> {
        let mut results = Vec::with_capacity(envelopes.len());
        for (i, envelope) in envelopes.iter().enumerate() {
            if i > 0 && !self.config.immediate_send_pause.is_zero() {
                sleep(self.config.immediate_send_pause).await;
            }
            results.push(self.send_now(envelope).await);
        }
        let delivered = results.iter().filter(|r| r.is_ok()).count();
        info!(
            total = envelopes.len(),
            delivered,
            "Immediate batch finished"
        );
        results
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, category = %item.category))]
    async fn dispatch(&self, item: ScheduledItem) -> DispatchOutcome {
        let started = Instant::now();
        let result = self.gateway.deliver(&item.envelope()).await;
        telemetry::record_delivery_duration(started.elapsed().as_secs_f64());

        let status = match result {
            Ok(()) => {
                info!(recipient = %item.recipient, "Scheduled item sent");
                telemetry::record_item_sent(&item.category);
                ItemStatus::Sent
            }
            Err(e) => {
                warn!(recipient = %item.recipient, error = %e, "Scheduled item delivery failed");
                telemetry::record_item_failed(&item.category, e.kind());
                ItemStatus::Failed
            }
        };

        let persisted = self.persist_status(item.id, status, self.clock.utc_now()).await;
        DispatchOutcome { status, persisted }
    }

    async fn persist_status(&self, id: Uuid, status: ItemStatus, sent_at: DateTime<Utc>) -> bool {
        let result = if self.unpersisted.contains(id).await {
            self.unpersisted.update_status(id, status, sent_at).await
        } else {
            self.store.update_status(id, status, sent_at).await
        };

        match result {
            Ok(()) => true,
            Err(StoreError::NotFound(_)) => {
                warn!(item_id = %id, %status, "Item record gone before status write, likely cancelled");
                false
            }
            Err(e) => {
                error!(item_id = %id, %status, error = %e, "Failed to persist item status");
                false
            }
        }
    }
}

#[async_trait]
impl Scheduler for DispatchEngine {
    #[instrument(skip(self))]
    async fn start(&self) {
        info!(
            tick_interval_seconds = self.config.tick_interval.as_secs(),
            policy = ?self.config.missed_fire_policy,
            "Starting dispatch engine"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            info!("Dispatch engine stopped before it started");
            return;
        }

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.claimed > 0 {
                        info!(
                            claimed = report.claimed,
                            sent = report.sent,
                            failed = report.failed,
                            persist_failures = report.persist_failures,
                            "Tick finished"
                        );
                    } else {
                        debug!("No items due");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping dispatch engine");
                    break;
                }
            }
        }

        info!("Dispatch engine stopped");
    }

    #[instrument(skip(self))]
    async fn stop(&self) {
        info!("Stopping dispatch engine");
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        if !self.config.shutdown_grace.is_zero() {
            sleep(self.config.shutdown_grace).await;
        }
        info!("Dispatch engine stopped gracefully");
    }

    async fn tick(&self) -> TickReport {
        let _serial = self.tick_lock.lock().await;
        let now = self.clock.local_now();

        let claimed = {
            let mut index = self.index.lock().await;
            let claimed = index.claim_due(now, self.config.missed_fire_policy);
            telemetry::update_pending_count(index.len());
            claimed
        };

        let mut report = TickReport {
            claimed: claimed.len(),
            ..TickReport::default()
        };
        if claimed.is_empty() {
            return report;
        }
        debug!(count = claimed.len(), %now, "Claimed due items");

        let outcomes: Vec<DispatchOutcome> = stream::iter(claimed)
            .map(|item| self.dispatch(item))
            .buffer_unordered(self.config.max_concurrent_deliveries.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome.status {
                ItemStatus::Sent => report.sent += 1,
                _ => report.failed += 1,
            }
            if !outcome.persisted {
                report.persist_failures += 1;
            }
        }
        report
    }
}
