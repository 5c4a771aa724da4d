//! Scheduler service
//!
//! Glues the pure planning and resolution code to the SQLite stores. Any
//! number of `Scheduler` instances may share one database: reads never
//! write, and ticks commit through the anchor's optimistic token, so racing
//! instances converge on a single committed sequence.

use super::advance::{plan_seed, plan_tick, Activation, AdvancePlan, PlanContext};
use super::anchor::{CommitOutcome, ScheduleAnchor};
use super::resolver::{resolve, PlaybackState, WaitReason};
use super::selection::SelectionPolicy;
use crate::config::SchedulerConfig;
use crate::db::{anchor as anchor_db, history, tracks};
use crate::error::{Error, Result};
use onair_common::time::{millis_to_duration, now_ms};
use onair_common::Track;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a single advancement tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// First anchor written for the channel
    Seeded { active_track_id: Uuid },
    /// Active track replaced
    Advanced {
        active_track_id: Uuid,
        started_at_ms: i64,
        /// Tracks activated by this tick, more than one when catching up
        activated: usize,
        reanchored: bool,
    },
    /// Queue topped up, active track unchanged
    Refilled { added: usize },
    /// Nothing to do
    Idle,
    /// Another instance committed first
    Conflict,
    /// Nothing to schedule
    EmptyCatalog,
}

/// Broadcast state plus the upcoming committed tracks
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: PlaybackState,
    /// Committed queue, next first, tracks no longer in the catalog omitted
    pub upcoming: Vec<Track>,
}

pub struct Scheduler {
    pool: Pool<Sqlite>,
    channel: String,
    config: SchedulerConfig,
    policy: SelectionPolicy,
}

impl Scheduler {
    pub fn new(pool: Pool<Sqlite>, channel: impl Into<String>, config: SchedulerConfig) -> Self {
        let policy = config.selection_policy();
        Self {
            pool,
            channel: channel.into(),
            config,
            policy,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run one advancement step against the committed anchor
    ///
    /// Seeds the channel when no anchor exists, advances through every track
    /// that has ended by `now_ms`, and keeps the queue at its target length.
    /// Losing the commit race is reported as `Conflict`, never retried here.
    pub async fn tick(&self, now_ms: i64) -> Result<AdvanceOutcome> {
        let candidates = tracks::list_candidates(&self.pool, &[]).await?;
        let history_len = self.policy.anti_repeat_window().max(1) as i64;
        let recent = history::recent_track_ids(&self.pool, &self.channel, history_len).await?;
        let anchor = anchor_db::read_anchor(&self.pool, &self.channel).await?;

        let ctx = PlanContext {
            policy: &self.policy,
            candidates: &candidates,
            history: &recent,
            lookahead_length: self.config.lookahead_length,
            max_catchup_tracks: self.config.max_catchup_tracks,
            now_ms,
        };

        match anchor {
            None => self.seed(&ctx).await,
            Some(anchor) => self.advance(&anchor, &ctx).await,
        }
    }

    async fn seed(&self, ctx: &PlanContext<'_>) -> Result<AdvanceOutcome> {
        let planned = plan_seed(ctx, &mut rand::thread_rng());
        let update = match planned {
            Ok(update) => update,
            Err(Error::EmptyCatalog) => {
                debug!("Channel '{}' has nothing to schedule", self.channel);
                return Ok(AdvanceOutcome::EmptyCatalog);
            }
            Err(e) => return Err(e),
        };

        match anchor_db::seed_anchor(&self.pool, &self.channel, &update, ctx.now_ms).await? {
            CommitOutcome::Committed { .. } => {
                info!(
                    "Seeded channel '{}' with track {} and {} queued",
                    self.channel,
                    update.active_track_id,
                    update.committed_queue.len()
                );
                self.record_activations(&[Activation {
                    track_id: update.active_track_id,
                    started_at_ms: update.started_at_ms,
                }])
                .await;
                Ok(AdvanceOutcome::Seeded {
                    active_track_id: update.active_track_id,
                })
            }
            CommitOutcome::Conflict => {
                debug!("Channel '{}' seeded concurrently", self.channel);
                Ok(AdvanceOutcome::Conflict)
            }
        }
    }

    async fn advance(
        &self,
        anchor: &ScheduleAnchor,
        ctx: &PlanContext<'_>,
    ) -> Result<AdvanceOutcome> {
        let planned = plan_tick(anchor, ctx, &mut rand::thread_rng());
        let plan = match planned {
            Ok(plan) => plan,
            Err(Error::EmptyCatalog) => {
                debug!(
                    "Channel '{}' needs a new track but the catalog is empty",
                    self.channel
                );
                return Ok(AdvanceOutcome::EmptyCatalog);
            }
            Err(e) => return Err(e),
        };

        let (update, activated, reanchored) = match plan {
            AdvancePlan::Idle => {
                debug!("Channel '{}' idle", self.channel);
                return Ok(AdvanceOutcome::Idle);
            }
            AdvancePlan::Refill { update, added } => {
                let outcome = anchor_db::commit_advance(
                    &self.pool,
                    &self.channel,
                    anchor.updated_at_ms,
                    &update,
                    ctx.now_ms,
                )
                .await?;
                return Ok(match outcome {
                    CommitOutcome::Committed { .. } => {
                        debug!("Refilled queue on '{}' with {} tracks", self.channel, added);
                        AdvanceOutcome::Refilled { added }
                    }
                    CommitOutcome::Conflict => {
                        debug!("Refill on '{}' lost to a concurrent commit", self.channel);
                        AdvanceOutcome::Conflict
                    }
                });
            }
            AdvancePlan::Advance {
                update,
                activated,
                reanchored,
            } => (update, activated, reanchored),
        };

        let outcome = anchor_db::commit_advance(
            &self.pool,
            &self.channel,
            anchor.updated_at_ms,
            &update,
            ctx.now_ms,
        )
        .await?;

        match outcome {
            CommitOutcome::Committed { .. } => {
                if reanchored {
                    warn!(
                        "Re-anchored channel '{}' at {}: schedule could not be continued from computed boundaries",
                        self.channel, update.started_at_ms
                    );
                }
                info!(
                    "Advanced channel '{}' to track {} starting at {} ({} activated)",
                    self.channel,
                    update.active_track_id,
                    update.started_at_ms,
                    activated.len()
                );
                self.record_activations(&activated).await;
                Ok(AdvanceOutcome::Advanced {
                    active_track_id: update.active_track_id,
                    started_at_ms: update.started_at_ms,
                    activated: activated.len(),
                    reanchored,
                })
            }
            CommitOutcome::Conflict => {
                debug!("Advance on '{}' lost to a concurrent commit", self.channel);
                Ok(AdvanceOutcome::Conflict)
            }
        }
    }

    /// History and play counts follow a committed anchor; failures here are
    /// logged and do not undo the commit.
    async fn record_activations(&self, activated: &[Activation]) {
        for activation in activated {
            if let Err(e) = history::append_play(
                &self.pool,
                &self.channel,
                activation.track_id,
                activation.started_at_ms,
            )
            .await
            {
                warn!("Failed to record play of {}: {}", activation.track_id, e);
            }
            if let Err(e) = tracks::increment_play_count(&self.pool, activation.track_id).await {
                warn!(
                    "Failed to increment play count of {}: {}",
                    activation.track_id, e
                );
            }
        }

        if let Err(e) =
            history::prune_history(&self.pool, &self.channel, self.config.history_retention).await
        {
            warn!("Failed to prune play history: {}", e);
        }
    }

    /// Resolve the committed schedule without writing anything
    pub async fn read_snapshot(&self, now_ms: i64) -> Result<Snapshot> {
        let Some(anchor) = anchor_db::read_anchor(&self.pool, &self.channel).await? else {
            let reason = if tracks::count_tracks(&self.pool).await? == 0 {
                WaitReason::EmptyCatalog
            } else {
                WaitReason::Unscheduled
            };
            return Ok(Snapshot {
                state: PlaybackState::waiting(reason),
                upcoming: Vec::new(),
            });
        };

        let ids: Vec<Uuid> = anchor.sequence().collect();
        let known = tracks::get_tracks(&self.pool, &ids).await?;
        let state = resolve(&anchor, &known, now_ms, self.config.crossfade_lead_ms);
        let upcoming = anchor
            .committed_queue
            .iter()
            .filter_map(|id| known.get(id).cloned())
            .collect();

        Ok(Snapshot { state, upcoming })
    }

    /// Resolve the schedule, advancing first when it is stale and
    /// advance-on-read is enabled
    pub async fn snapshot(&self, now_ms: i64) -> Result<Snapshot> {
        let snapshot = self.read_snapshot(now_ms).await?;
        if !self.config.advance_on_read || !snapshot.state.needs_advance() {
            return Ok(snapshot);
        }

        match self.tick(now_ms).await? {
            // No replacement can be picked, whatever the anchor still names
            AdvanceOutcome::EmptyCatalog => Ok(Snapshot {
                state: PlaybackState::waiting(WaitReason::EmptyCatalog),
                upcoming: Vec::new(),
            }),
            // Whether this instance or a concurrent one committed, the
            // anchor now reflects the advance.
            _ => self.read_snapshot(now_ms).await,
        }
    }

    /// What is playing at `now_ms`
    pub async fn now_playing(&self, now_ms: i64) -> Result<PlaybackState> {
        Ok(self.snapshot(now_ms).await?.state)
    }

    /// The next `limit` committed tracks
    pub async fn upcoming(&self, limit: usize, now_ms: i64) -> Result<Vec<Track>> {
        let mut upcoming = self.snapshot(now_ms).await?.upcoming;
        upcoming.truncate(limit);
        Ok(upcoming)
    }
}

/// Tick the scheduler every `advance_interval_ms` until shutdown is signalled
pub async fn run_advancement_loop(scheduler: Arc<Scheduler>, mut shutdown: watch::Receiver<bool>) {
    let period = millis_to_duration(scheduler.config().advance_interval_ms);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Advancement loop started for channel '{}' (every {:?})",
        scheduler.channel(),
        period
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match scheduler.tick(now_ms()).await {
                    Ok(AdvanceOutcome::Idle) | Ok(AdvanceOutcome::EmptyCatalog) => {}
                    Ok(outcome) => debug!("Tick: {:?}", outcome),
                    Err(e) => error!("Advancement tick failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Advancement loop stopped for channel '{}'", scheduler.channel());
}
