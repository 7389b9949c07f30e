//! Decides whether a snapshot is worth transmitting
//!
//! Only changes a remote display can observe count: new presses or releases, scratch
//! strokes, direction flips and pressed flags. Timer decay alone never triggers a send.

use crate::controller::{ControllerSnapshot, DualSnapshot, MonitorSnapshot};

pub fn has_single_changed(previous: Option<&ControllerSnapshot>, current: &ControllerSnapshot) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    previous.stats.press_timestamps.len() != current.stats.press_timestamps.len()
        || previous.stats.release_latencies.len() != current.stats.release_latencies.len()
        || previous.scratch.stroke_count != current.scratch.stroke_count
        || previous.scratch.direction != current.scratch.direction
        || previous
            .keys
            .iter()
            .zip(current.keys.iter())
            .any(|(before, now)| before.is_pressed != now.is_pressed)
}

pub fn has_dual_changed(previous: Option<&DualSnapshot>, current: &DualSnapshot) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    let side_changed = |before: Option<&ControllerSnapshot>, now: Option<&ControllerSnapshot>| {
        match (before, now) {
            (None, None) => false,
            (Some(_), None) | (None, Some(_)) => true,
            (Some(before), Some(now)) => has_single_changed(Some(before), now),
        }
    };

    side_changed(previous.player1.as_deref(), current.player1.as_deref())
        || side_changed(previous.player2.as_deref(), current.player2.as_deref())
}

/// Switching between SP and DP shapes always counts as a change.
pub fn has_changed(previous: Option<&MonitorSnapshot>, current: &MonitorSnapshot) -> bool {
    match (previous, current) {
        (None, _) => true,
        (Some(MonitorSnapshot::Single(before)), MonitorSnapshot::Single(now)) => {
            has_single_changed(Some(before.as_ref()), now)
        }
        (Some(MonitorSnapshot::Dual(before)), MonitorSnapshot::Dual(now)) => {
            has_dual_changed(Some(before), now)
        }
        _ => true,
    }
}

/// Remembers the last transmitted snapshot of one connection
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_sent: Option<MonitorSnapshot>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_send(&self, current: &MonitorSnapshot) -> bool {
        has_changed(self.last_sent.as_ref(), current)
    }

    pub fn mark_sent(&mut self, sent: &MonitorSnapshot) {
        self.last_sent = Some(sent.clone());
    }

    /// Forget the last frame, so the next snapshot goes out unconditionally.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}
