//! REST API for listeners
//!
//! Read-only endpoints over the committed schedule.

pub mod handlers;
pub mod server;

pub use server::{create_router, run, AppContext};
