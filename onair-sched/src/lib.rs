//! # OnAir Scheduler (onair-sched)
//!
//! Keeps a single always-on broadcast timeline that any number of stateless
//! instances can serve. One committed anchor per channel records the active
//! track, its authoritative start and the next few tracks; every read resolves
//! the audible position from it and the wall clock, and advancement commits
//! through an optimistic concurrency token so racing instances agree.
//!
//! **Architecture:** SQLite (sqlx) for the catalog, anchor and play history;
//! axum for the listener-facing HTTP API; a tokio interval loop drives
//! advancement.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod schedule;

pub use config::SchedulerConfig;
pub use error::{Error, Result};
pub use schedule::Scheduler;
