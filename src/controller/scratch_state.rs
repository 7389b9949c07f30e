//! Scratch (turntable) state tracking
//!
//! The turntable reports one circular axis in [-1, 1]. Direction is classified per
//! tick and then debounced with a hold timer so jittery readings don't flicker.
//!
//! ```text
//! axis changed ──► hold = 200 ──► classification trusted
//!                    │ -5 per still tick
//!                    ▼
//!                hold = 10  ──► classification trusted again
//!                    │
//!                    ▼
//!                hold = 0   ──► direction frozen
//! ```

use serde::{Deserialize, Serialize};

use super::input_source::Device;

/// Hold window restarted whenever the axis moves
pub const SCRATCH_HOLD_MS: u32 = 200;

/// Remaining hold time at which the classification is trusted a second time
pub const SCRATCH_RECHECK_MS: u32 = 10;

/// Scale applied to a finished stroke's distance so one full rotation reads ≈ 100.
///
/// Calibrated on hardware: one rotation accumulates about 2.31 axis units.
pub const STROKE_DISTANCE_SCALE: f32 = 43.3;

/// Completed strokes older than this are not recorded
pub const STROKE_RECORD_WINDOW_MS: i64 = 200;

// Readings beyond this magnitude sit next to the wraparound point
const WRAP_EDGE: f32 = 0.9;

/// Rotation direction of the turntable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum ScratchDirection {
    Down,
    #[default]
    Neutral,
    Up,
}

impl From<ScratchDirection> for i8 {
    fn from(direction: ScratchDirection) -> Self {
        match direction {
            ScratchDirection::Down => -1,
            ScratchDirection::Neutral => 0,
            ScratchDirection::Up => 1,
        }
    }
}

impl TryFrom<i8> for ScratchDirection {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(ScratchDirection::Down),
            0 => Ok(ScratchDirection::Neutral),
            1 => Ok(ScratchDirection::Up),
            other => Err(format!("invalid scratch direction: {}", other)),
        }
    }
}

impl ScratchDirection {
    pub fn is_neutral(self) -> bool {
        self == ScratchDirection::Neutral
    }
}

/// State of the turntable after a tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScratchState {
    #[serde(rename = "currentAxes")]
    pub current_axis: f32,
    #[serde(rename = "previousAxes")]
    pub previous_axis: Option<f32>,
    #[serde(rename = "fixedStateTime")]
    pub hold_timer: u32,
    #[serde(rename = "state")]
    pub direction: ScratchDirection,
    #[serde(rename = "count")]
    pub stroke_count: u32,
    #[serde(rename = "rotationDistance", default)]
    pub rotation_delta: f32,
    #[serde(rename = "rotationTime", default)]
    pub rotation_timestamp: i64,
    #[serde(rename = "strokeDistance", default)]
    pub cumulative_stroke_distance: f32,
}

/// Result of tracking one tick
#[derive(Clone, Debug, PartialEq)]
pub struct ScratchUpdate {
    pub state: ScratchState,
    /// A new stroke was counted this tick
    pub stroke_started: bool,
    /// Normalised distance of the stroke that just finished, if it qualifies
    pub completed_stroke_distance: Option<f32>,
}

/// Classifies the movement from `previous` to `current`.
///
/// Crossing the wraparound point from the positive edge counts as `Down`; the mirror
/// crossing counts as `Up`.
pub fn classify(current: f32, previous: f32) -> ScratchDirection {
    if current == previous {
        return ScratchDirection::Neutral;
    }
    if previous > WRAP_EDGE && current < -WRAP_EDGE {
        return ScratchDirection::Down;
    }
    if current > previous || (previous < -WRAP_EDGE && current > WRAP_EDGE) {
        return ScratchDirection::Up;
    }
    ScratchDirection::Down
}

/// Distance travelled between two readings on the circular axis
pub fn rotation_delta(current: f32, previous: f32) -> f32 {
    let mut diff = current - previous;
    if diff.abs() > 1.0 {
        if diff > 0.0 {
            diff -= 2.0;
        } else {
            diff += 2.0;
        }
    }
    diff.abs()
}

/// Computes the next scratch state from a device reading.
pub fn track_scratch(
    device: &Device,
    axis_index: usize,
    prior: Option<&ScratchState>,
    now: i64,
    tick_period_ms: u32,
) -> ScratchUpdate {
    let axis = device.axis(axis_index);

    let hold_timer = match prior {
        Some(before) if before.current_axis == axis => {
            before.hold_timer.saturating_sub(tick_period_ms)
        }
        _ => SCRATCH_HOLD_MS,
    };

    let fresh = classify(axis, prior.map_or(axis, |before| before.current_axis));
    let held = prior.map_or(ScratchDirection::Neutral, |before| before.direction);
    let direction = if hold_timer == 0 {
        held
    } else if hold_timer == SCRATCH_HOLD_MS || hold_timer == SCRATCH_RECHECK_MS {
        fresh
    } else {
        held
    };

    let stroke_started = !direction.is_neutral() && direction != held;
    let direction_changed = prior.is_some_and(|before| before.direction != direction);

    let delta = match prior {
        Some(before) if before.current_axis != axis => rotation_delta(axis, before.current_axis),
        _ => 0.0,
    };

    let previous_distance = prior.map_or(0.0, |before| before.cumulative_stroke_distance);
    let cumulative_stroke_distance = if direction.is_neutral() {
        0.0
    } else if !direction_changed && previous_distance != 0.0 {
        previous_distance + delta
    } else {
        delta
    };

    let completed_stroke_distance = prior.and_then(|before| {
        let finished = direction_changed
            && before.cumulative_stroke_distance > 0.0
            && now - before.rotation_timestamp < STROKE_RECORD_WINDOW_MS;
        finished.then(|| before.cumulative_stroke_distance * STROKE_DISTANCE_SCALE)
    });

    ScratchUpdate {
        state: ScratchState {
            current_axis: axis,
            previous_axis: prior.map(|before| before.current_axis),
            hold_timer,
            direction,
            stroke_count: prior.map_or(0, |before| before.stroke_count)
                + u32::from(stroke_started),
            rotation_delta: delta,
            rotation_timestamp: now,
            cumulative_stroke_distance,
        },
        stroke_started,
        completed_stroke_distance,
    }
}
