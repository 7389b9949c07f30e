//! Device auto-detection
//!
//! Watches the device list the sampler publishes and claims the first device that
//! shows a pressed button for whichever player still has no controller.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::coordinator::{PlayMode, PlaySettings, SettingsHandle};
use super::input_source::Device;

/// Assignment produced by one detection scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    Single(usize),
    Player1(usize),
    Player2(usize),
}

impl Assignment {
    pub fn apply(self, settings: &mut PlaySettings) {
        match self {
            Assignment::Single(index) => settings.sp_device = Some(index),
            Assignment::Player1(index) => settings.dp_devices[0] = Some(index),
            Assignment::Player2(index) => settings.dp_devices[1] = Some(index),
        }
    }
}

/// Looks at one device list and decides whether a player should be claimed.
///
/// Only the first device with a pressed button is considered per scan, so holding a
/// button on an already-assigned controller blocks detection for that scan.
pub fn scan(settings: &PlaySettings, devices: &[Device]) -> Option<Assignment> {
    let pressed = devices.iter().find(|device| device.any_pressed())?;

    match settings.mode {
        PlayMode::Single => match settings.sp_device {
            None => Some(Assignment::Single(pressed.index)),
            Some(_) => None,
        },
        PlayMode::Double => {
            let [player1, player2] = settings.dp_devices;
            if player1 == Some(pressed.index) || player2 == Some(pressed.index) {
                return None;
            }
            match (player1, player2) {
                (None, _) => Some(Assignment::Player1(pressed.index)),
                (Some(_), None) => Some(Assignment::Player2(pressed.index)),
                (Some(_), Some(_)) => None,
            }
        }
    }
}

/// Periodic detection task.
///
/// Writes only device assignments, through the settings handle.
pub async fn run_detection_loop(
    settings: SettingsHandle,
    mut devices: watch::Receiver<Vec<Device>>,
    interval_ms: u64,
    cancel: CancellationToken,
) {
    // tokio rejects a zero period
    let interval_ms = interval_ms.max(1);
    info!("Starting device auto-detection every {}ms", interval_ms);
    let mut interval_timer = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms));
    interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Device auto-detection stopped");
                return;
            }
            _ = interval_timer.tick() => {}
        }

        let assignment = {
            let current = devices.borrow_and_update();
            scan(&settings.current(), &current)
        };

        if let Some(assignment) = assignment {
            info!("Auto-detected {:?}", assignment);
            settings.update(|play| assignment.apply(play));
        } else {
            debug!("Detection scan found nothing to assign");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(index: usize, pressed: bool) -> Device {
        Device {
            index,
            name: format!("pad {}", index),
            buttons: vec![pressed; 10],
            axes: vec![0.0, 0.0],
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
    fn single_mode_claims_first_pressed_device() {
        let settings = PlaySettings::default();
        let devices = [pad(0, false), pad(3, true), pad(4, true)];

        assert_eq!(scan(&settings, &devices), Some(Assignment::Single(3)));
    }

    #[test]
    fn nothing_pressed_means_nothing_assigned() {
        assert_eq!(scan(&PlaySettings::default(), &[pad(0, false)]), None);
        assert_eq!(scan(&PlaySettings::default(), &[]), None);
    }

    #[test]
    fn assigned_single_player_is_left_alone() {
        let settings = PlaySettings {
            sp_device: Some(1),
            ..Default::default()
        };

        assert_eq!(scan(&settings, &[pad(2, true)]), None);
    }

    #[test]
    fn double_mode_fills_player1_then_player2() {
        let first = scan(&double(None, None), &[pad(2, true)]);
        assert_eq!(first, Some(Assignment::Player1(2)));

        let mut settings = double(None, None);
        if let Some(assignment) = first {
            assignment.apply(&mut settings);
        }

        assert_eq!(scan(&settings, &[pad(2, true)]), None);
        assert_eq!(
            scan(&settings, &[pad(2, false), pad(5, true)]),
            Some(Assignment::Player2(5))
        );
    }

    #[test]
    fn held_assigned_device_blocks_the_scan() {
        let settings = double(Some(0), None);

        assert_eq!(scan(&settings, &[pad(0, true), pad(1, true)]), None);
    }

    #[tokio::test]
    async fn detection_loop_writes_through_settings_handle() {
        let handle = SettingsHandle::new(PlaySettings::default());
        let (device_tx, device_rx) = watch::channel(vec![pad(7, true)]);
        let cancel = CancellationToken::new();
        let mut settings_rx = handle.subscribe();

        let task = tokio::spawn(run_detection_loop(
            handle.clone(),
            device_rx,
            10,
            cancel.clone(),
        ));

        let changed = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            settings_rx.changed(),
        )
        .await;
        assert!(matches!(changed, Ok(Ok(()))));
        assert_eq!(handle.current().sp_device, Some(7));

        cancel.cancel();
        let _ = task.await;
        drop(device_tx);
    }

    #[tokio::test]
    async fn zero_interval_from_config_still_scans() {
        let config = crate::config::AppConfig::parse("[sampler]\ndetection_interval_ms = 0")
            .unwrap_or_default();
        assert_eq!(config.sampler.detection_interval_ms, 0);

        let handle = SettingsHandle::new(PlaySettings::default());
        let (_device_tx, device_rx) = watch::channel(vec![pad(3, true)]);
        let cancel = CancellationToken::new();
        let mut settings_rx = handle.subscribe();

        let task = tokio::spawn(run_detection_loop(
            handle.clone(),
            device_rx,
            config.sampler.detection_interval_ms,
            cancel.clone(),
        ));

        let changed = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            settings_rx.changed(),
        )
        .await;
        assert!(matches!(changed, Ok(Ok(()))));
        assert_eq!(handle.current().sp_device, Some(3));

        cancel.cancel();
        let joined = task.await;
        assert!(joined.is_ok());
    }
}
