//! # OnAir Common Library
//!
//! Shared code for the OnAir broadcast services:
//! - Catalog track model
//! - Database bootstrap (schema + default settings)
//! - Root folder and configuration file resolution
//! - Millisecond timestamp helpers
//! - Equal-power crossfade curve

pub mod config;
pub mod crossfade;
pub mod db;
pub mod error;
pub mod time;

pub use crossfade::CrossfadeFrame;
pub use db::models::Track;
pub use error::{Error, Result};
