//! Track selection policy
//!
//! Picks the next track to append to the committed queue. Each candidate gets
//! a weight that favors under-played, well-tipped and recently created
//! tracks; tracks played within the anti-repeat window are excluded while any
//! other candidate remains. The pick itself is weighted-random, so repeated
//! calls with the same inputs may differ. Only the long-run distribution is
//! meant to be fair.

use crate::error::{Error, Result};
use onair_common::Track;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

/// Relative importance of each selection signal
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionWeights {
    /// Weight of the inverted, normalized play count
    pub play_count: f64,
    /// Weight of the normalized tip weight
    pub tips: f64,
    /// Weight of the creation-recency bonus
    pub freshness: f64,
    /// Time constant of the freshness decay: a track this old keeps ~37% of
    /// its freshness bonus
    pub freshness_decay_ms: i64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            play_count: 1.0,
            tips: 1.0,
            freshness: 1.0,
            freshness_decay_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

/// Weighted, repeat-avoiding track picker
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    weights: SelectionWeights,
    anti_repeat_window: usize,
}

impl SelectionPolicy {
    pub fn new(weights: SelectionWeights, anti_repeat_window: usize) -> Self {
        Self {
            weights,
            anti_repeat_window,
        }
    }

    pub fn anti_repeat_window(&self) -> usize {
        self.anti_repeat_window
    }

    /// Pick the next track id using the thread-local RNG
    ///
    /// `recently_played` is ordered oldest first.
    pub fn select_next(
        &self,
        candidates: &[Track],
        recently_played: &[Uuid],
        now_ms: i64,
    ) -> Result<Uuid> {
        self.select_next_with_rng(candidates, recently_played, now_ms, &mut rand::thread_rng())
    }

    /// Pick the next track id with a caller-supplied RNG
    pub fn select_next_with_rng<R: Rng + ?Sized>(
        &self,
        candidates: &[Track],
        recently_played: &[Uuid],
        now_ms: i64,
        rng: &mut R,
    ) -> Result<Uuid> {
        if candidates.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        let eligible = self.eligible(candidates, recently_played);
        let weights = self.weights_for(&eligible, now_ms);

        let index = if is_degenerate(&weights) {
            rng.gen_range(0..eligible.len())
        } else {
            match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(rng),
                Err(_) => rng.gen_range(0..eligible.len()),
            }
        };

        Ok(eligible[index].id)
    }

    /// Extend `queue` with fresh picks until it holds `target_len` entries
    ///
    /// `history` is the play history before the queue (oldest first, ending
    /// with the active track). Every pick is treated as played for the
    /// following ones, so the queue avoids repeats the same way the broadcast
    /// does. Returns the number of ids appended.
    pub fn fill_queue<R: Rng + ?Sized>(
        &self,
        candidates: &[Track],
        history: &[Uuid],
        queue: &mut Vec<Uuid>,
        target_len: usize,
        now_ms: i64,
        rng: &mut R,
    ) -> Result<usize> {
        let mut recent: Vec<Uuid> = history.to_vec();
        recent.extend(queue.iter().copied());

        let mut added = 0;
        while queue.len() < target_len {
            let pick = self.select_next_with_rng(candidates, &recent, now_ms, rng)?;
            queue.push(pick);
            recent.push(pick);
            added += 1;
        }
        Ok(added)
    }

    /// Candidates allowed by the anti-repeat window
    ///
    /// The immediately preceding track is always excluded, even with a
    /// window of 0. When the window covers every candidate the exclusion is
    /// relaxed in two steps: first only the preceding track is avoided, and
    /// only a single-track catalog falls back to the full set.
    fn eligible<'a>(&self, candidates: &'a [Track], recently_played: &[Uuid]) -> Vec<&'a Track> {
        let start = recently_played
            .len()
            .saturating_sub(self.anti_repeat_window.max(1));
        let window: HashSet<Uuid> = recently_played[start..].iter().copied().collect();

        let eligible: Vec<&Track> = candidates
            .iter()
            .filter(|t| !window.contains(&t.id))
            .collect();
        if !eligible.is_empty() {
            return eligible;
        }

        if let Some(last) = recently_played.last() {
            let eligible: Vec<&Track> = candidates.iter().filter(|t| t.id != *last).collect();
            if !eligible.is_empty() {
                return eligible;
            }
        }

        candidates.iter().collect()
    }

    /// Selection weight of each track, in input order
    ///
    /// Play count and tips are normalized against the maximum in the set, so
    /// each signal contributes at most its configured weight.
    pub fn weights_for(&self, tracks: &[&Track], now_ms: i64) -> Vec<f64> {
        let max_plays = tracks.iter().map(|t| t.play_count.max(0)).max().unwrap_or(0);
        let max_tips = tracks
            .iter()
            .map(|t| t.tip_weight.max(0.0))
            .fold(0.0_f64, f64::max);
        let decay_ms = self.weights.freshness_decay_ms.max(1) as f64;

        tracks
            .iter()
            .map(|t| {
                let play_term = if max_plays > 0 {
                    1.0 - t.play_count.max(0) as f64 / max_plays as f64
                } else {
                    1.0
                };
                let tip_term = if max_tips > 0.0 {
                    t.tip_weight.max(0.0) / max_tips
                } else {
                    0.0
                };
                let age_ms = (now_ms - t.created_at_ms).max(0) as f64;
                let fresh_term = (-age_ms / decay_ms).exp();

                let weight = self.weights.play_count * play_term
                    + self.weights.tips * tip_term
                    + self.weights.freshness * fresh_term;

                if weight.is_finite() && weight > 0.0 {
                    weight
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// All weights zero, or all equal: fall back to a uniform pick
fn is_degenerate(weights: &[f64]) -> bool {
    match weights.first() {
        None => true,
        Some(first) => {
            weights.iter().all(|w| *w <= 0.0)
                || weights.iter().all(|w| (w - first).abs() < f64::EPSILON)
        }
    }
}
