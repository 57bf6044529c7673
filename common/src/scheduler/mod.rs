// Dispatch engine, its clock and pending index

pub mod clock;
pub mod engine;
pub mod index;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{DispatchConfig, DispatchEngine, Scheduler, TickReport};
pub use index::PendingIndex;
