//! Human-readable statistics for logs and display consumers

use chrono::Local;
use std::fmt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::key_state::KEY_COUNT;
use crate::controller::{ControllerSnapshot, MonitorSnapshot, PlayMode, StatsSummary};

/// Numbers shown for one snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub mode: PlayMode,
    pub player1: Option<StatsSummary>,
    pub player2: Option<StatsSummary>,
    pub combined: StatsSummary,
    /// Last completed scratch stroke, per side
    pub scratch_speed: [Option<f32>; 2],
    /// Average release per key in display order, per side
    pub key_release_ms: [Option<[i64; KEY_COUNT]>; 2],
}

fn key_release(snapshot: &ControllerSnapshot) -> [i64; KEY_COUNT] {
    std::array::from_fn(|key| snapshot.stats.key_average_release_latency(key))
}

pub fn summarize(snapshot: &MonitorSnapshot, now: i64) -> Summary {
    match snapshot {
        MonitorSnapshot::Single(single) => {
            let stats = StatsSummary::of(single, now);
            Summary {
                mode: PlayMode::Single,
                player1: Some(stats),
                player2: None,
                combined: stats,
                scratch_speed: [single.stats.last_scratch_stroke_distance(), None],
                key_release_ms: [Some(key_release(single)), None],
            }
        }
        MonitorSnapshot::Dual(dual) => {
            let player1 = dual.player1.as_deref().map(|side| StatsSummary::of(side, now));
            let player2 = dual.player2.as_deref().map(|side| StatsSummary::of(side, now));
            let combined = player1
                .unwrap_or_default()
                .combine(player2.unwrap_or_default());
            Summary {
                mode: PlayMode::Double,
                player1,
                player2,
                combined,
                scratch_speed: [
                    dual.player1
                        .as_deref()
                        .and_then(|side| side.stats.last_scratch_stroke_distance()),
                    dual.player2
                        .as_deref()
                        .and_then(|side| side.stats.last_scratch_stroke_distance()),
                ],
                key_release_ms: [
                    dual.player1.as_deref().map(key_release),
                    dual.player2.as_deref().map(key_release),
                ],
            }
        }
    }
}

impl Summary {
    /// Per-key release averages, e.g. `1P 41/0/38/0/0/0/55`
    pub fn key_release_line(&self) -> String {
        let labels = match self.mode {
            PlayMode::Single => ["SP", "-"],
            PlayMode::Double => ["1P", "2P"],
        };
        labels
            .iter()
            .zip(self.key_release_ms.iter())
            .filter_map(|(label, keys)| {
                keys.map(|keys| {
                    let values: Vec<String> = keys.iter().map(i64::to_string).collect();
                    format!("{} {}", label, values.join("/"))
                })
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            PlayMode::Single => "SP",
            PlayMode::Double => "DP",
        };
        write!(
            f,
            "[{}] total {} | density {}/s | release {}ms",
            mode,
            self.combined.total_strokes,
            self.combined.density,
            self.combined.average_release_ms
        )?;
        if self.mode == PlayMode::Double {
            for (label, side) in [("1P", self.player1), ("2P", self.player2)] {
                match side {
                    Some(stats) => write!(
                        f,
                        " | {} {} / {}ms",
                        label, stats.total_strokes, stats.average_release_ms
                    )?,
                    None => write!(f, " | {} -", label)?,
                }
            }
        }
        for speed in self.scratch_speed.iter().flatten() {
            write!(f, " | scratch {:.0}", speed)?;
        }
        Ok(())
    }
}

/// Logs a summary whenever the watched snapshot changes, at most once per `min_interval_ms`.
pub async fn run_reporter(
    mut snapshots: watch::Receiver<Option<MonitorSnapshot>>,
    label: &'static str,
    min_interval_ms: i64,
    cancel: CancellationToken,
) {
    info!("Starting {} reporter", label);
    let mut last_report: Option<i64> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("{} snapshot source closed", label);
                    break;
                }
            }
        }

        let now = Local::now().timestamp_millis();
        if last_report.is_some_and(|at| now - at < min_interval_ms) {
            continue;
        }

        let summary = snapshots
            .borrow_and_update()
            .as_ref()
            .map(|snapshot| summarize(snapshot, now));
        if let Some(summary) = summary {
            info!("{}: {}", label, summary);
            debug!("{} key release: {}", label, summary.key_release_line());
            last_report = Some(now);
        }
    }

    info!("{} reporter stopped", label);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DualSnapshot;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn side(strokes: u32, release: Vec<i64>, presses: Vec<i64>) -> Arc<ControllerSnapshot> {
        let mut snapshot = ControllerSnapshot::default();
        snapshot.keys[0].stroke_count = strokes;
        let stats = Arc::make_mut(&mut snapshot.stats);
        stats.release_latencies = VecDeque::from(release);
        stats.press_timestamps = VecDeque::from(presses);
        Arc::new(snapshot)
    }

    #[test]
    fn single_summary_uses_one_side() {
        let snapshot = MonitorSnapshot::Single(side(12, vec![40, 50], vec![950, 990]));
        let summary = summarize(&snapshot, 1_000);

        assert_eq!(summary.combined.total_strokes, 12);
        assert_eq!(summary.combined.density, 2);
        assert_eq!(summary.combined.average_release_ms, 45);
        assert!(summary.player2.is_none());
        assert!(summary.to_string().starts_with("[SP] total 12"));
    }

    #[test]
    fn dual_summary_combines_both_sides() {
        let snapshot = MonitorSnapshot::Dual(DualSnapshot {
            player1: Some(side(30, vec![50], vec![900])),
            player2: Some(side(10, vec![70], vec![])),
            timestamp: 1_000,
        });
        let summary = summarize(&snapshot, 1_000);

        assert_eq!(summary.combined.total_strokes, 40);
        assert_eq!(summary.combined.average_release_ms, 55);
        assert_eq!(summary.combined.density, 1);
        assert!(summary.to_string().contains("1P 30 / 50ms"));
    }

    #[test]
    fn dual_summary_marks_missing_player() {
        let snapshot = MonitorSnapshot::Dual(DualSnapshot {
            player1: None,
            player2: Some(side(3, vec![], vec![])),
            timestamp: 0,
        });
        let summary = summarize(&snapshot, 0);

        assert_eq!(summary.combined.total_strokes, 3);
        assert!(summary.to_string().contains("1P -"));
        assert_eq!(summary.key_release_ms[0], None);
    }

    #[test]
    fn per_key_release_is_reported_per_side() {
        let mut player1 = ControllerSnapshot::default();
        let stats = Arc::make_mut(&mut player1.stats);
        stats.per_key_release_latencies[0] = VecDeque::from(vec![40, 43]);
        stats.per_key_release_latencies[6] = VecDeque::from(vec![55]);

        let snapshot = MonitorSnapshot::Dual(DualSnapshot {
            player1: Some(Arc::new(player1)),
            player2: Some(side(1, vec![], vec![])),
            timestamp: 0,
        });
        let summary = summarize(&snapshot, 0);

        assert_eq!(summary.key_release_ms[0], Some([42, 0, 0, 0, 0, 0, 55]));
        assert_eq!(summary.key_release_ms[1], Some([0; KEY_COUNT]));
        assert_eq!(
            summary.key_release_line(),
            "1P 42/0/0/0/0/0/55 | 2P 0/0/0/0/0/0/0"
        );
    }
}
