//! Dual-player coordination
//!
//! The coordinator owns both player samplers, applies play settings at the start
//! of every tick and decides which snapshot shape leaves the controller subsystem.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::input_source::Device;
use super::sampler::{ControllerSampler, ControllerSnapshot, PlayerSlot, SamplerSettings};

/// Single play uses one controller, double play two
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum PlayMode {
    #[default]
    #[serde(rename = "SP")]
    #[value(name = "sp", alias = "SP")]
    Single,
    #[serde(rename = "DP")]
    #[value(name = "dp", alias = "DP")]
    Double,
}

/// Which devices feed which player
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaySettings {
    pub mode: PlayMode,
    pub sp_device: Option<usize>,
    pub dp_devices: [Option<usize>; 2],
}

impl PlaySettings {
    pub fn player_device(&self, slot: PlayerSlot) -> Option<usize> {
        match (self.mode, slot) {
            (PlayMode::Single, PlayerSlot::Player1) => self.sp_device,
            (PlayMode::Single, PlayerSlot::Player2) => None,
            (PlayMode::Double, PlayerSlot::Player1) => self.dp_devices[0],
            (PlayMode::Double, PlayerSlot::Player2) => self.dp_devices[1],
        }
    }
}

/// Both players of a DP session at one tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DualSnapshot {
    pub player1: Option<Arc<ControllerSnapshot>>,
    pub player2: Option<Arc<ControllerSnapshot>>,
    pub timestamp: i64,
}

/// What the controller subsystem publishes each tick
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorSnapshot {
    Single(Arc<ControllerSnapshot>),
    Dual(DualSnapshot),
}

impl MonitorSnapshot {
    pub fn mode(&self) -> PlayMode {
        match self {
            MonitorSnapshot::Single(_) => PlayMode::Single,
            MonitorSnapshot::Dual(_) => PlayMode::Double,
        }
    }
}

/// Selector for [`Coordinator::reset`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetScope {
    Player1,
    Player2,
    Both,
}

pub struct Coordinator {
    settings: PlaySettings,
    sampler_settings: SamplerSettings,
    player1: ControllerSampler,
    player2: ControllerSampler,
}

impl Coordinator {
    pub fn new(settings: PlaySettings, sampler_settings: SamplerSettings) -> Self {
        let mut coordinator = Self {
            settings: PlaySettings::default(),
            sampler_settings,
            player1: ControllerSampler::new(PlayerSlot::Player1),
            player2: ControllerSampler::new(PlayerSlot::Player2),
        };
        coordinator.apply_settings(&settings);
        coordinator
    }

    pub fn sampler(&self, slot: PlayerSlot) -> &ControllerSampler {
        match slot {
            PlayerSlot::Player1 => &self.player1,
            PlayerSlot::Player2 => &self.player2,
        }
    }

    /// Single entry point for settings changes.
    ///
    /// A mode switch resets both slots; a changed device index resets its slot.
    pub fn apply_settings(&mut self, settings: &PlaySettings) {
        if *settings == self.settings {
            return;
        }

        let mode_changed = settings.mode != self.settings.mode;
        if mode_changed {
            info!(
                "Play mode changed {:?} -> {:?}",
                self.settings.mode, settings.mode
            );
        }

        self.player1
            .assign(settings.player_device(PlayerSlot::Player1));
        self.player2
            .assign(settings.player_device(PlayerSlot::Player2));

        if mode_changed {
            self.reset(ResetScope::Both);
        }

        debug!("Applied play settings: {:?}", settings);
        self.settings = settings.clone();
    }

    pub fn reset(&mut self, scope: ResetScope) {
        info!("Resetting statistics for {:?}", scope);
        match scope {
            ResetScope::Player1 => self.player1.reset(),
            ResetScope::Player2 => self.player2.reset(),
            ResetScope::Both => {
                self.player1.reset();
                self.player2.reset();
            }
        }
    }

    /// Runs one tick for every active slot.
    ///
    /// In SP mode nothing is emitted while the slot has no snapshot. DP always emits,
    /// with absent players left empty.
    pub fn tick(&mut self, devices: &[Device], now: i64) -> Option<MonitorSnapshot> {
        match self.settings.mode {
            PlayMode::Single => self
                .player1
                .tick(devices, now, &self.sampler_settings)
                .map(MonitorSnapshot::Single),
            PlayMode::Double => {
                let player1 = self.player1.tick(devices, now, &self.sampler_settings);
                let player2 = self.player2.tick(devices, now, &self.sampler_settings);
                Some(MonitorSnapshot::Dual(DualSnapshot {
                    player1,
                    player2,
                    timestamp: now,
                }))
            }
        }
    }
}

/// Shared writer for play settings
///
/// Every settings mutation goes through here; the sampler picks the new value up at the
/// start of its next tick.
#[derive(Clone, Debug)]
pub struct SettingsHandle {
    sender: watch::Sender<PlaySettings>,
}

impl SettingsHandle {
    pub fn new(initial: PlaySettings) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Applies `change` and notifies subscribers only when something differs.
    pub fn update<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut PlaySettings),
    {
        self.sender.send_if_modified(|settings| {
            let before = settings.clone();
            change(settings);
            if *settings != before {
                debug!("Play settings updated: {:?}", settings);
                true
            } else {
                false
            }
        })
    }

    pub fn current(&self) -> PlaySettings {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaySettings> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(index: usize, pressed_physical: &[usize]) -> Device {
        let mut buttons = vec![false; 17];
        for physical in pressed_physical {
            buttons[*physical] = true;
        }
        Device {
            index,
            name: format!("pad {}", index),
            buttons,
            axes: vec![0.0, 0.0],
        }
    }

    fn single(device: Option<usize>) -> PlaySettings {
        PlaySettings {
            mode: PlayMode::Single,
            sp_device: device,
            ..Default::default()
        }
    }

    fn double(p1: Option<usize>, p2: Option<usize>) -> PlaySettings {
        PlaySettings {
            mode: PlayMode::Double,
            dp_devices: [p1, p2],
            ..Default::default()
        }
    }

    #[test]
    fn single_mode_without_device_emits_nothing() {
        let mut coordinator = Coordinator::new(single(None), SamplerSettings::default());

        assert!(coordinator.tick(&[pad(0, &[5])], 0).is_none());
    }

    #[test]
    fn single_mode_emits_player_snapshot() {
        let mut coordinator = Coordinator::new(single(Some(0)), SamplerSettings::default());

        match coordinator.tick(&[pad(0, &[5])], 0) {
            Some(MonitorSnapshot::Single(snapshot)) => assert!(snapshot.keys[0].is_pressed),
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn double_mode_emits_even_when_players_are_missing() {
        let mut coordinator = Coordinator::new(double(Some(0), None), SamplerSettings::default());

        match coordinator.tick(&[pad(0, &[])], 42) {
            Some(MonitorSnapshot::Dual(dual)) => {
                assert!(dual.player1.is_some());
                assert!(dual.player2.is_none());
                assert_eq!(dual.timestamp, 42);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn mode_switch_resets_both_slots() {
        let mut coordinator = Coordinator::new(single(Some(0)), SamplerSettings::default());
        coordinator.tick(&[pad(0, &[5])], 0);

        coordinator.apply_settings(&double(Some(0), None));
        match coordinator.tick(&[pad(0, &[5])], 5) {
            // first observation again: the held key is a fresh press
            Some(MonitorSnapshot::Dual(dual)) => {
                let player1 = dual.player1.unwrap_or_default();
                assert_eq!(player1.keys[0].stroke_count, 1);
                assert_eq!(player1.keys[0].last_change_timestamp, 5);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn device_change_resets_only_that_slot() {
        let mut coordinator =
            Coordinator::new(double(Some(0), Some(1)), SamplerSettings::default());
        coordinator.tick(&[pad(0, &[1]), pad(1, &[1]), pad(2, &[])], 0);

        coordinator.apply_settings(&double(Some(0), Some(2)));
        assert_eq!(coordinator.sampler(PlayerSlot::Player2).device(), Some(2));
        assert!(coordinator.sampler(PlayerSlot::Player2).snapshot().is_none());
        assert!(coordinator.sampler(PlayerSlot::Player1).snapshot().is_some());
    }

    #[test]
    fn reset_scope_targets_one_side() {
        let mut coordinator =
            Coordinator::new(double(Some(0), Some(1)), SamplerSettings::default());
        coordinator.tick(&[pad(0, &[]), pad(1, &[])], 0);

        coordinator.reset(ResetScope::Player2);
        assert!(coordinator.sampler(PlayerSlot::Player1).snapshot().is_some());
        assert!(coordinator.sampler(PlayerSlot::Player2).snapshot().is_none());
    }

    #[test]
    fn settings_handle_reports_real_changes_only() {
        let handle = SettingsHandle::new(single(None));
        let mut receiver = handle.subscribe();

        assert!(!handle.update(|settings| settings.sp_device = None));
        assert!(!receiver.has_changed().unwrap_or(true));

        assert!(handle.update(|settings| settings.sp_device = Some(3)));
        assert!(receiver.has_changed().unwrap_or(false));
        assert_eq!(receiver.borrow_and_update().sp_device, Some(3));
        assert_eq!(handle.current().sp_device, Some(3));
    }
}
