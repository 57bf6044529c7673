// Shared library for the outreach scheduler: models, storage, delivery and dispatch

pub mod config;
pub mod db;
pub mod delivery;
pub mod errors;
pub mod models;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod telemetry;
