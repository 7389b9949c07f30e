//! Key state tracking for the seven keyboard keys
//!
//! Turns raw button booleans into per-key press/release bookkeeping. The tracker
//! is a pure function of the reading, the prior key array and the tick time.

use serde::{Deserialize, Serialize};

use super::input_source::Device;

/// Number of logical keys on the controller
pub const KEY_COUNT: usize = 7;

/// Physical button number for each logical key, in output order.
///
/// Key 1 sits on physical button 5, so it is placed first.
pub const KEY_MAPPING: [usize; KEY_COUNT] = [5, 1, 2, 4, 7, 8, 9];

/// Holds at or above this length count as long notes and stay out of release statistics
pub const LONG_NOTE_THRESHOLD_MS: i64 = 200;

/// State of one logical key after a tick
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    #[serde(rename = "isPressed")]
    pub is_pressed: bool,
    #[serde(rename = "isChangedState")]
    pub changed_this_tick: bool,
    #[serde(rename = "beforeState")]
    pub previous_pressed: bool,
    #[serde(rename = "beforeStateTime")]
    pub last_change_timestamp: i64,
    #[serde(rename = "releaseTime")]
    pub last_release_latency: i64,
    #[serde(rename = "strokeCount")]
    pub stroke_count: u32,
}

/// Release observed during a tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRelease {
    pub key: usize,
    pub latency_ms: i64,
}

impl KeyRelease {
    /// Whether the release is short enough to count towards release speed
    pub fn is_countable(&self) -> bool {
        self.latency_ms < LONG_NOTE_THRESHOLD_MS
    }
}

/// Result of tracking one tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyUpdate {
    pub keys: [KeyState; KEY_COUNT],
    /// Number of press edges this tick
    pub presses: usize,
    pub releases: Vec<KeyRelease>,
}

/// Computes the next key array from a device reading.
///
/// Without a prior array every key counts as changed, so a key already held on the
/// first observed tick registers as a press.
pub fn track_keys(device: &Device, prior: Option<&[KeyState; KEY_COUNT]>, now: i64) -> KeyUpdate {
    let mut update = KeyUpdate::default();

    for (key, physical) in KEY_MAPPING.iter().enumerate() {
        let pressed = device.button(*physical);
        let before = prior.map(|keys| &keys[key]);

        let changed = before.map_or(true, |state| state.is_pressed != pressed);
        let press_edge = changed && pressed;

        let mut last_release_latency = before.map_or(0, |state| state.last_release_latency);
        if let Some(state) = before {
            if changed && !pressed {
                last_release_latency = now - state.last_change_timestamp;
                update.releases.push(KeyRelease {
                    key,
                    latency_ms: last_release_latency,
                });
            }
        }

        if press_edge {
            update.presses += 1;
        }

        update.keys[key] = KeyState {
            is_pressed: pressed,
            changed_this_tick: changed,
            previous_pressed: before.map_or(false, |state| state.is_pressed),
            last_change_timestamp: if changed {
                now
            } else {
                before.map_or(0, |state| state.last_change_timestamp)
            },
            last_release_latency,
            stroke_count: before.map_or(0, |state| state.stroke_count) + u32::from(press_edge),
        };
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(pressed_physical: &[usize]) -> Device {
        let mut buttons = vec![false; 17];
        for physical in pressed_physical {
            buttons[*physical] = true;
        }
        Device {
            index: 0,
            name: "test".into(),
            buttons,
            axes: vec![0.0, 0.0],
        }
    }

    #[test]
    fn physical_button_five_is_first_key() {
        let update = track_keys(&reading(&[5]), None, 1_000);

        assert!(update.keys[0].is_pressed);
        assert!(update.keys[1..].iter().all(|key| !key.is_pressed));
    }

    #[test]
    fn press_then_release_fifty_ms_later() {
        let first = track_keys(&reading(&[5]), None, 1_000);
        assert_eq!(first.keys[0].stroke_count, 1);
        assert_eq!(first.presses, 1);

        let second = track_keys(&reading(&[]), Some(&first.keys), 1_050);
        assert_eq!(second.keys[0].stroke_count, 1);
        assert_eq!(second.keys[0].last_release_latency, 50);
        assert_eq!(
            second.releases,
            vec![KeyRelease {
                key: 0,
                latency_ms: 50
            }]
        );
        assert!(second.releases[0].is_countable());
    }

    #[test]
    fn stroke_count_moves_only_on_rising_edges() {
        let pattern: [&[usize]; 8] = [&[], &[1], &[1], &[], &[], &[1], &[], &[1]];
        let mut keys: Option<[KeyState; KEY_COUNT]> = None;
        let mut rising_edges = 0;
        let mut was_pressed = false;

        for (tick, pressed) in pattern.iter().enumerate() {
            let update = track_keys(&reading(pressed), keys.as_ref(), tick as i64 * 5);
            let is_pressed = !pressed.is_empty();
            if is_pressed && !was_pressed {
                rising_edges += 1;
            }
            was_pressed = is_pressed;

            assert_eq!(update.keys[1].stroke_count, rising_edges);
            keys = Some(update.keys);
        }

        assert_eq!(rising_edges, 3);
    }

    #[test]
    fn steady_state_carries_timestamps() {
        let first = track_keys(&reading(&[2]), None, 100);
        let second = track_keys(&reading(&[2]), Some(&first.keys), 105);

        assert!(!second.keys[2].changed_this_tick);
        assert!(second.keys[2].previous_pressed);
        assert_eq!(second.keys[2].last_change_timestamp, 100);
        assert_eq!(second.presses, 0);
        assert!(second.releases.is_empty());
    }

    #[test]
    fn long_hold_is_reported_but_not_countable() {
        let first = track_keys(&reading(&[9]), None, 0);
        let second = track_keys(&reading(&[]), Some(&first.keys), 200);

        assert_eq!(second.keys[6].last_release_latency, 200);
        assert_eq!(second.releases.len(), 1);
        assert!(!second.releases[0].is_countable());
    }

    #[test]
    fn first_observation_records_no_release() {
        let update = track_keys(&reading(&[]), None, 10);

        assert!(update.releases.is_empty());
        assert!(update.keys.iter().all(|key| key.stroke_count == 0));
        assert!(update.keys.iter().all(|key| key.last_release_latency == 0));
    }

    #[test]
    fn short_button_array_reads_as_released() {
        let device = Device {
            index: 0,
            name: "tiny".into(),
            buttons: vec![true, true, true],
            axes: vec![],
        };
        let update = track_keys(&device, None, 0);

        assert!(!update.keys[0].is_pressed);
        assert!(update.keys[1].is_pressed);
        assert!(update.keys[2].is_pressed);
        assert!(!update.keys[6].is_pressed);
    }
}
