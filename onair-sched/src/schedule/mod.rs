//! Broadcast scheduling
//!
//! - `selection`: weighted, repeat-avoiding choice of the next track
//! - `anchor`: the committed play sequence and its concurrency token
//! - `resolver`: what is audible at a given instant
//! - `advance`: what a tick should commit
//! - `scheduler`: the above wired to the database

pub mod advance;
pub mod anchor;
pub mod resolver;
pub mod scheduler;
pub mod selection;

pub use anchor::{AnchorUpdate, CommitOutcome, ScheduleAnchor};
pub use resolver::{resolve, PlaybackState, WaitReason};
pub use scheduler::{run_advancement_loop, AdvanceOutcome, Scheduler, Snapshot};
pub use selection::{SelectionPolicy, SelectionWeights};
