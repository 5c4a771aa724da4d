//! Advancement planning
//!
//! Decides what a single advancement tick should write, given the anchor, the
//! catalog and the wall clock. Planning is pure; `Scheduler::tick` does the
//! reads and the conditional commit around it.
//!
//! A new active track always starts at the previous track's computed end
//! (`started_at_ms + duration_ms`), never at the time the tick happened to
//! run, so irregular tick intervals do not accumulate drift.

use super::anchor::{AnchorUpdate, ScheduleAnchor};
use super::selection::SelectionPolicy;
use crate::error::{Error, Result};
use onair_common::Track;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// A track that became active, for history and play counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub track_id: Uuid,
    pub started_at_ms: i64,
}

/// What a tick should commit
#[derive(Debug, Clone, PartialEq)]
pub enum AdvancePlan {
    /// Active track still playing and the queue is full
    Idle,
    /// Active track unchanged, queue topped up
    Refill { update: AnchorUpdate, added: usize },
    /// One or more tracks ended; `activated` lists every track that became
    /// active, the last one being the new active track
    Advance {
        update: AnchorUpdate,
        activated: Vec<Activation>,
        /// The new start could not be derived from a computed boundary
        reanchored: bool,
    },
}

/// Inputs shared by seeding and ticking
pub struct PlanContext<'a> {
    pub policy: &'a SelectionPolicy,
    /// Whole catalog, used both as candidate set and for duration lookups
    pub candidates: &'a [Track],
    /// Past activations, oldest first
    pub history: &'a [Uuid],
    pub lookahead_length: usize,
    pub max_catchup_tracks: usize,
    pub now_ms: i64,
}

/// Anchor contents for a channel that has never been scheduled
pub fn plan_seed<R: Rng + ?Sized>(ctx: &PlanContext<'_>, rng: &mut R) -> Result<AnchorUpdate> {
    let first = ctx
        .policy
        .select_next_with_rng(ctx.candidates, ctx.history, ctx.now_ms, rng)?;

    let mut recent = ctx.history.to_vec();
    recent.push(first);
    let mut queue = Vec::with_capacity(ctx.lookahead_length);
    ctx.policy.fill_queue(
        ctx.candidates,
        &recent,
        &mut queue,
        ctx.lookahead_length,
        ctx.now_ms,
        rng,
    )?;

    Ok(AnchorUpdate {
        active_track_id: first,
        started_at_ms: ctx.now_ms,
        committed_queue: queue,
    })
}

/// Plan one tick against a committed anchor
pub fn plan_tick<R: Rng + ?Sized>(
    anchor: &ScheduleAnchor,
    ctx: &PlanContext<'_>,
    rng: &mut R,
) -> Result<AdvancePlan> {
    let catalog: HashMap<Uuid, &Track> = ctx.candidates.iter().map(|t| (t.id, t)).collect();

    match catalog.get(&anchor.active_track_id) {
        Some(active) if ctx.now_ms < active.ends_at(anchor.started_at_ms) => {
            plan_refill(anchor, ctx, rng)
        }
        active => plan_advance(anchor, active.copied(), &catalog, ctx, rng),
    }
}

fn plan_refill<R: Rng + ?Sized>(
    anchor: &ScheduleAnchor,
    ctx: &PlanContext<'_>,
    rng: &mut R,
) -> Result<AdvancePlan> {
    if anchor.committed_queue.len() >= ctx.lookahead_length {
        return Ok(AdvancePlan::Idle);
    }

    let recent = recent_with(ctx.history, anchor.active_track_id);
    let mut queue = anchor.committed_queue.clone();
    let added = ctx.policy.fill_queue(
        ctx.candidates,
        &recent,
        &mut queue,
        ctx.lookahead_length,
        ctx.now_ms,
        rng,
    )?;

    Ok(AdvancePlan::Refill {
        update: AnchorUpdate {
            active_track_id: anchor.active_track_id,
            started_at_ms: anchor.started_at_ms,
            committed_queue: queue,
        },
        added,
    })
}

fn plan_advance<R: Rng + ?Sized>(
    anchor: &ScheduleAnchor,
    active: Option<&Track>,
    catalog: &HashMap<Uuid, &Track>,
    ctx: &PlanContext<'_>,
    rng: &mut R,
) -> Result<AdvancePlan> {
    let mut recent = recent_with(ctx.history, anchor.active_track_id);
    let mut queue: VecDeque<Uuid> = anchor.committed_queue.iter().copied().collect();
    let mut activated: Vec<Activation> = Vec::new();

    // A vanished active track has no known end, so its successor starts now
    let mut reanchored = active.is_none();
    let mut boundary = match active {
        Some(track) => track.ends_at(anchor.started_at_ms),
        None => ctx.now_ms,
    };

    let next_id = loop {
        let next = pop_available(&mut queue, catalog, recent.last().copied());
        let next = match next {
            Some(track) => track,
            None => {
                let id = ctx
                    .policy
                    .select_next_with_rng(ctx.candidates, &recent, ctx.now_ms, rng)?;
                catalog
                    .get(&id)
                    .copied()
                    .ok_or_else(|| Error::Internal(format!("selected unknown track {}", id)))?
            }
        };

        activated.push(Activation {
            track_id: next.id,
            started_at_ms: boundary,
        });
        recent.push(next.id);

        let next_end = next.ends_at(boundary);
        if ctx.now_ms < next_end {
            break next.id;
        }

        if activated.len() >= ctx.max_catchup_tracks.max(1) {
            // Too far behind to replay the missed tracks; restart the
            // timeline at the current instant.
            if let Some(last) = activated.last_mut() {
                last.started_at_ms = ctx.now_ms;
            }
            reanchored = true;
            break next.id;
        }

        boundary = next_end;
    };

    let started_at_ms = activated
        .last()
        .map(|a| a.started_at_ms)
        .unwrap_or(boundary);

    let mut committed_queue: Vec<Uuid> = queue.into_iter().collect();
    ctx.policy.fill_queue(
        ctx.candidates,
        &recent,
        &mut committed_queue,
        ctx.lookahead_length,
        ctx.now_ms,
        rng,
    )?;

    Ok(AdvancePlan::Advance {
        update: AnchorUpdate {
            active_track_id: next_id,
            started_at_ms,
            committed_queue,
        },
        activated,
        reanchored,
    })
}

/// Pop queue entries until one still exists in the catalog and differs
/// from the track that just played
///
/// Dropping a deleted entry can leave the previous track at the head of the
/// queue; it is dropped too so the same track never plays twice in a row.
fn pop_available<'a>(
    queue: &mut VecDeque<Uuid>,
    catalog: &HashMap<Uuid, &'a Track>,
    previous: Option<Uuid>,
) -> Option<&'a Track> {
    while let Some(id) = queue.pop_front() {
        if Some(id) == previous {
            continue;
        }
        if let Some(track) = catalog.get(&id) {
            return Some(*track);
        }
    }
    None
}

/// History ending with `active`, without duplicating it
fn recent_with(history: &[Uuid], active: Uuid) -> Vec<Uuid> {
    let mut recent = history.to_vec();
    if recent.last() != Some(&active) {
        recent.push(active);
    }
    recent
}
