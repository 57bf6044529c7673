use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::sync::{Arc, RwLock};

/// Source of local wall-clock time for the dispatch engine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Local wall-clock time without zone, which is what fire dates compare against
    fn local_now(&self) -> NaiveDateTime {
        self.now().naive_local()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// The real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Settable clock for simulated time
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Local>>>,
}

impl ManualClock {
    /// Start at the given local wall-clock time
    pub fn at(local: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(RwLock::new(to_local(local))),
        }
    }

    /// Jump to the given local wall-clock time
    pub fn set(&self, local: NaiveDateTime) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = to_local(local);
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

// Nonexistent local times (DST gaps) are read as UTC
fn to_local(local: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&local))
}
