//! Bounded input history and the metrics derived from it
//!
//! Every buffer keeps the newest entry first and is cut back to its cap after each
//! tick. Metrics are computed on demand and never stored.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::key_state::{KeyRelease, KEY_COUNT};
use super::sampler::ControllerSnapshot;

pub const MAX_RELEASE_LATENCIES: usize = 2000;
pub const MAX_KEY_RELEASE_LATENCIES: usize = 2000;
pub const MAX_PRESS_TIMESTAMPS: usize = 500;
pub const MAX_SCRATCH_TIMESTAMPS: usize = 500;
pub const MAX_SCRATCH_STROKE_DISTANCES: usize = 1;

/// Window used for input density
pub const DENSITY_WINDOW_MS: i64 = 1000;

/// Historical record of one controller
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    #[serde(rename = "releaseTimes")]
    pub release_latencies: VecDeque<i64>,
    #[serde(rename = "keyReleaseTimes", default)]
    pub per_key_release_latencies: [VecDeque<i64>; KEY_COUNT],
    #[serde(rename = "pressedTimes")]
    pub press_timestamps: VecDeque<i64>,
    #[serde(rename = "scratchTimes", default)]
    pub scratch_event_timestamps: VecDeque<i64>,
    #[serde(rename = "scratchRotationDistances", default)]
    pub last_scratch_stroke_distances: VecDeque<f32>,
}

/// Events observed during one tick, ready to be folded into a record
#[derive(Clone, Debug, Default)]
pub struct TickEvents<'a> {
    pub now: i64,
    pub presses: usize,
    pub releases: &'a [KeyRelease],
    pub scratch_stroke: bool,
    pub completed_stroke_distance: Option<f32>,
}

impl TickEvents<'_> {
    /// True when the tick adds nothing to any buffer
    pub fn is_empty(&self) -> bool {
        self.presses == 0
            && self.releases.iter().all(|release| !release.is_countable())
            && !self.scratch_stroke
            && self.completed_stroke_distance.is_none()
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, value: T, cap: usize) {
    buffer.push_front(value);
    buffer.truncate(cap);
}

impl StatisticsRecord {
    /// Produces the record for the next tick; `self` stays untouched.
    pub fn record(&self, events: &TickEvents<'_>) -> StatisticsRecord {
        let mut next = self.clone();

        for release in events.releases.iter().filter(|release| release.is_countable()) {
            push_capped(
                &mut next.release_latencies,
                release.latency_ms,
                MAX_RELEASE_LATENCIES,
            );
            if let Some(per_key) = next.per_key_release_latencies.get_mut(release.key) {
                push_capped(per_key, release.latency_ms, MAX_KEY_RELEASE_LATENCIES);
            }
        }

        for _ in 0..events.presses {
            push_capped(&mut next.press_timestamps, events.now, MAX_PRESS_TIMESTAMPS);
        }

        if events.scratch_stroke {
            push_capped(
                &mut next.scratch_event_timestamps,
                events.now,
                MAX_SCRATCH_TIMESTAMPS,
            );
        }

        if let Some(distance) = events.completed_stroke_distance {
            push_capped(
                &mut next.last_scratch_stroke_distances,
                distance,
                MAX_SCRATCH_STROKE_DISTANCES,
            );
        }

        next
    }

    /// Presses and scratch strokes within the last second
    pub fn input_density(&self, now: i64) -> usize {
        let since = now - DENSITY_WINDOW_MS;
        let presses = self.press_timestamps.iter().filter(|t| **t > since).count();
        let scratches = self
            .scratch_event_timestamps
            .iter()
            .filter(|t| **t > since)
            .count();
        presses + scratches
    }

    /// Mean release latency rounded up, 0 without samples
    pub fn average_release_latency(&self) -> i64 {
        ceil_mean(&self.release_latencies)
    }

    pub fn key_average_release_latency(&self, key: usize) -> i64 {
        self.per_key_release_latencies
            .get(key)
            .map_or(0, ceil_mean)
    }

    /// The rotation-speed readout
    pub fn last_scratch_stroke_distance(&self) -> Option<f32> {
        self.last_scratch_stroke_distances.front().copied()
    }
}

fn ceil_mean(values: &VecDeque<i64>) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let sum: i64 = values.iter().sum();
    let len = values.len() as i64;
    // ceiling division for non-negative and negative sums alike
    sum.div_euclid(len) + i64::from(sum.rem_euclid(len) != 0)
}

/// Display-ready numbers for one or both players
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub total_strokes: u64,
    pub density: usize,
    pub average_release_ms: i64,
}

impl StatsSummary {
    pub fn of(snapshot: &ControllerSnapshot, now: i64) -> Self {
        let key_strokes: u64 = snapshot
            .keys
            .iter()
            .map(|key| u64::from(key.stroke_count))
            .sum();
        Self {
            total_strokes: key_strokes + u64::from(snapshot.scratch.stroke_count),
            density: snapshot.stats.input_density(now),
            average_release_ms: snapshot.stats.average_release_latency(),
        }
    }

    /// Merges both sides of a DP session.
    ///
    /// The release average is weighted by each side's stroke total when both have one.
    pub fn combine(self, other: Self) -> Self {
        let total_strokes = self.total_strokes + other.total_strokes;
        let average_release_ms = match (self.average_release_ms > 0, other.average_release_ms > 0)
        {
            (true, true) if total_strokes > 0 => {
                let weighted = (self.average_release_ms as f64 * self.total_strokes as f64
                    + other.average_release_ms as f64 * other.total_strokes as f64)
                    / total_strokes as f64;
                weighted.ceil() as i64
            }
            (true, _) => self.average_release_ms,
            (_, true) => other.average_release_ms,
            _ => 0,
        };

        Self {
            total_strokes,
            density: self.density + other.density,
            average_release_ms,
        }
    }
}
