//! Per-player controller sampling
//!
//! A sampler owns the current snapshot of one player slot and replaces it wholesale
//! on every tick:
//!
//! ```text
//! Device reading ──► keys ──► scratch ──► statistics ──► ControllerSnapshot
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::input_source::Device;
use super::key_state::{track_keys, KeyState, KEY_COUNT};
use super::scratch_state::{track_scratch, ScratchState};
use super::statistics::{StatisticsRecord, TickEvents};

/// Fully computed controller state for one tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub keys: [KeyState; KEY_COUNT],
    pub scratch: ScratchState,
    /// Shared with the prior snapshot while a tick adds no events
    #[serde(rename = "record")]
    pub stats: Arc<StatisticsRecord>,
}

impl ControllerSnapshot {
    /// Builds the next snapshot from a reading and the prior one.
    pub fn next(
        device: &Device,
        prior: Option<&ControllerSnapshot>,
        now: i64,
        settings: &SamplerSettings,
    ) -> ControllerSnapshot {
        let keys = track_keys(device, prior.map(|snapshot| &snapshot.keys), now);
        let scratch = track_scratch(
            device,
            settings.scratch_axis_index,
            prior.map(|snapshot| &snapshot.scratch),
            now,
            settings.tick_period_ms,
        );

        let events = TickEvents {
            now,
            presses: keys.presses,
            releases: &keys.releases,
            scratch_stroke: scratch.stroke_started,
            completed_stroke_distance: scratch.completed_stroke_distance,
        };
        let stats = match prior {
            Some(snapshot) if events.is_empty() => Arc::clone(&snapshot.stats),
            Some(snapshot) => Arc::new(snapshot.stats.record(&events)),
            None => Arc::new(StatisticsRecord::default().record(&events)),
        };

        ControllerSnapshot {
            keys: keys.keys,
            scratch: scratch.state,
            stats,
        }
    }
}

/// Settings shared by every sampler
///
/// Fixed for the lifetime of the sampling thread; changing them needs a restart.
///
/// # Performance Impact
///
/// - `tick_period_ms`: the hold timer of the scratch tracker decays by this amount per
///   tick, so anything other than 5 ms shifts the debounce points off their 200/10 ms
///   marks. Lower values also cost more CPU on the sampling thread
/// - `scratch_axis_index`: must point at the turntable axis; a missing axis reads as 0
///   and the scratch never moves
///
/// # Examples
///
/// ```rust
/// use iidx_monitor::controller::SamplerSettings;
///
/// // Stock controller layout
/// let settings = SamplerSettings::default();
/// assert_eq!(settings.tick_period_ms, 5);
/// assert_eq!(settings.scratch_axis_index, 1);
///
/// // Adapter that reports the turntable on the first axis
/// let adapter = SamplerSettings {
///     scratch_axis_index: 0,
///     ..Default::default()
/// };
/// assert_ne!(adapter, settings);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerSettings {
    pub tick_period_ms: u32,
    pub scratch_axis_index: usize,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            tick_period_ms: 5,
            scratch_axis_index: 1,
        }
    }
}

/// Which player a sampler serves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerSlot {
    Player1,
    Player2,
}

/// Lifecycle of a slot
#[derive(Clone, Debug, Default)]
pub enum SlotState {
    #[default]
    Unassigned,
    Active {
        device: usize,
        snapshot: Option<Arc<ControllerSnapshot>>,
    },
}

/// Sampler for one player slot
#[derive(Debug)]
pub struct ControllerSampler {
    slot: PlayerSlot,
    state: SlotState,
}

impl ControllerSampler {
    pub fn new(slot: PlayerSlot) -> Self {
        Self {
            slot,
            state: SlotState::Unassigned,
        }
    }

    pub fn device(&self) -> Option<usize> {
        match self.state {
            SlotState::Active { device, .. } => Some(device),
            SlotState::Unassigned => None,
        }
    }

    pub fn snapshot(&self) -> Option<Arc<ControllerSnapshot>> {
        match &self.state {
            SlotState::Active { snapshot, .. } => snapshot.clone(),
            SlotState::Unassigned => None,
        }
    }

    /// Points the slot at a device; any change discards the prior state.
    pub fn assign(&mut self, device: Option<usize>) {
        if self.device() == device {
            return;
        }
        self.state = match device {
            Some(device) => {
                info!("{:?} assigned to device {}", self.slot, device);
                SlotState::Active {
                    device,
                    snapshot: None,
                }
            }
            None => {
                info!("{:?} unassigned", self.slot);
                SlotState::Unassigned
            }
        };
    }

    /// Clears tracker and statistics state, keeping the assignment.
    pub fn reset(&mut self) {
        if let SlotState::Active { snapshot, device } = &mut self.state {
            debug!("Resetting {:?} (device {})", self.slot, device);
            *snapshot = None;
        }
    }

    /// Runs one tick against the devices read this tick.
    ///
    /// An absent device discards the slot's snapshot instead of carrying it forward.
    pub fn tick(
        &mut self,
        devices: &[Device],
        now: i64,
        settings: &SamplerSettings,
    ) -> Option<Arc<ControllerSnapshot>> {
        let SlotState::Active { device, snapshot } = &mut self.state else {
            return None;
        };

        let Some(reading) = devices.iter().find(|candidate| candidate.index == *device) else {
            if snapshot.take().is_some() {
                debug!("{:?} device {} absent, snapshot dropped", self.slot, device);
            }
            return None;
        };

        let next = Arc::new(ControllerSnapshot::next(
            reading,
            snapshot.as_deref(),
            now,
            settings,
        ));
        *snapshot = Some(next.clone());
        Some(next)
    }
}
